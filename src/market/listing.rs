use serde::{Deserialize, Serialize};

/// One observed offer on the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Want-currency received per unit of have-currency paid.
    pub rate: f64,
    pub have_currency: String,
    pub have_amount: f64,
    pub want_currency: String,
    pub want_amount: f64,
    #[serde(default)]
    pub stock: Option<i64>,
    #[serde(default)]
    pub seller: Option<String>,
    #[serde(default)]
    pub whisper: Option<String>,
    #[serde(default)]
    pub indexed: Option<String>,
}

pub fn best_rate(listings: &[Listing]) -> Option<f64> {
    listings
        .iter()
        .map(|listing| listing.rate)
        .min_by(|a, b| a.total_cmp(b))
}

pub fn mean_rate(listings: &[Listing]) -> Option<f64> {
    if listings.is_empty() {
        return None;
    }
    let total: f64 = listings.iter().map(|listing| listing.rate).sum();
    Some(total / listings.len() as f64)
}

pub fn median_rate(listings: &[Listing]) -> Option<f64> {
    let rates: Vec<f64> = listings.iter().map(|listing| listing.rate).collect();
    median(&rates)
}

/// Median of an unsorted slice; the mean of the two middle values for even lengths.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

#[cfg(test)]
pub(crate) fn listing_with_rate(rate: f64) -> Listing {
    Listing {
        rate,
        have_currency: "chaos".to_string(),
        have_amount: rate,
        want_currency: "divine".to_string(),
        want_amount: 1.0,
        stock: Some(10),
        seller: Some("seller".to_string()),
        whisper: None,
        indexed: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarises_rates() {
        let listings: Vec<Listing> = [3.0, 1.0, 2.0, 10.0]
            .into_iter()
            .map(listing_with_rate)
            .collect();

        assert_eq!(best_rate(&listings), Some(1.0));
        assert!((mean_rate(&listings).unwrap() - 4.0).abs() < 1e-9);
        assert!((median_rate(&listings).unwrap() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn empty_listing_set_has_no_summary() {
        assert_eq!(best_rate(&[]), None);
        assert_eq!(mean_rate(&[]), None);
        assert_eq!(median_rate(&[]), None);
    }
}
