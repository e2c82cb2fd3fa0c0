use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::history::TrendSummary;
use crate::market::{best_rate, median_rate, Listing, TradePair};

use super::AppContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairStatus {
    Ok,
    Error,
    RateLimited,
}

impl PairStatus {
    pub fn label(self) -> &'static str {
        match self {
            PairStatus::Ok => "ok",
            PairStatus::Error => "error",
            PairStatus::RateLimited => "rate_limited",
        }
    }
}

/// Per-pair outcome handed to the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct PairSummary {
    pub index: usize,
    pub have: String,
    pub want: String,
    pub hot: bool,
    pub status: PairStatus,
    pub listings: Vec<Listing>,
    pub best_rate: Option<f64>,
    pub median_rate: Option<f64>,
    pub count_returned: usize,
    pub was_cached: bool,
    pub fetched_at: Option<DateTime<Utc>>,
    pub trend: Option<TrendSummary>,
    /// Seconds until the governor lets requests through again.
    pub rate_limit_remaining: Option<f64>,
    pub linked_pair_index: Option<usize>,
    pub profit_margin_raw: Option<f64>,
    pub profit_margin_pct: Option<f64>,
}

impl PairSummary {
    pub fn failed(index: usize, trade: &TradePair, status: PairStatus) -> Self {
        Self {
            index,
            have: trade.have.clone(),
            want: trade.want.clone(),
            hot: trade.hot,
            status,
            listings: Vec::new(),
            best_rate: None,
            median_rate: None,
            count_returned: 0,
            was_cached: false,
            fetched_at: None,
            trend: None,
            rate_limit_remaining: None,
            linked_pair_index: None,
            profit_margin_raw: None,
            profit_margin_pct: None,
        }
    }

    pub fn rate_limited(index: usize, trade: &TradePair, remaining_secs: f64) -> Self {
        Self {
            rate_limit_remaining: Some((remaining_secs * 10.0).round() / 10.0),
            ..Self::failed(index, trade, PairStatus::RateLimited)
        }
    }

    /// A summary over `listings`. An empty set counts as an error wherever it came from.
    pub fn with_listings(
        index: usize,
        trade: &TradePair,
        listings: Vec<Listing>,
        was_cached: bool,
        fetched_at: DateTime<Utc>,
        trend: TrendSummary,
    ) -> Self {
        let status = if listings.is_empty() {
            PairStatus::Error
        } else {
            PairStatus::Ok
        };
        Self {
            best_rate: best_rate(&listings),
            median_rate: median_rate(&listings),
            count_returned: listings.len(),
            listings,
            was_cached,
            fetched_at: Some(fetched_at),
            trend: Some(trend),
            ..Self::failed(index, trade, status)
        }
    }
}

/// Summaries served purely from the cache, stale entries included. Never calls upstream.
pub fn latest_cached(ctx: &AppContext, top_n: usize) -> Vec<PairSummary> {
    let mut summaries: Vec<PairSummary> = ctx
        .config()
        .pairs
        .iter()
        .enumerate()
        .map(|(index, trade)| {
            let key = ctx.config().pair_key(trade);
            match ctx.cache().peek(&key) {
                Some(entry) => PairSummary::with_listings(
                    index,
                    trade,
                    entry.listings.iter().take(top_n.max(1)).cloned().collect(),
                    true,
                    entry.fetched_at,
                    ctx.history().get_trend(&key),
                ),
                None => PairSummary::failed(index, trade, PairStatus::Error),
            }
        })
        .collect();

    link_reverse_pairs(&mut summaries);
    summaries
}

/// Link pairs that trade the same two currencies in opposite directions and compute the
/// round-trip margin from their median rates.
///
/// Receiving `a.median` per cycle while buying back at `1 / b.median` gives a raw margin of
/// `a.median - 1 / b.median`; the percentage is relative to the buy-back cost. Each pair is
/// linked at most once.
pub fn link_reverse_pairs(summaries: &mut [PairSummary]) {
    for i in 0..summaries.len() {
        if summaries[i].linked_pair_index.is_some() {
            continue;
        }
        let Some(receive) = summaries[i].median_rate else {
            continue;
        };

        let partner = (0..summaries.len()).find(|&j| {
            j != i
                && summaries[j].have == summaries[i].want
                && summaries[j].want == summaries[i].have
        });
        let Some(j) = partner else {
            continue;
        };
        let Some(reverse) = summaries[j].median_rate.filter(|rate| *rate > 0.0) else {
            continue;
        };

        let spend_to_get_back = 1.0 / reverse;
        let raw = receive - spend_to_get_back;
        let pct = raw / spend_to_get_back * 100.0;
        let raw = (raw * 10_000.0).round() / 10_000.0;
        let pct = (pct * 100.0).round() / 100.0;

        for (this, other) in [(i, j), (j, i)] {
            summaries[this].linked_pair_index = Some(other);
            summaries[this].profit_margin_raw = Some(raw);
            summaries[this].profit_margin_pct = Some(pct);
        }
    }
}

/// A configured pair whose cache entry is missing or expired.
#[derive(Debug, Clone, Serialize)]
pub struct ExpiringPair {
    pub index: usize,
    pub have: String,
    pub want: String,
    pub cached: bool,
}

pub fn expiring_pairs(ctx: &AppContext) -> Vec<ExpiringPair> {
    expiring_pairs_at(ctx, Utc::now())
}

pub fn expiring_pairs_at(ctx: &AppContext, now: DateTime<Utc>) -> Vec<ExpiringPair> {
    ctx.config()
        .pairs
        .iter()
        .enumerate()
        .filter_map(|(index, trade)| {
            let entry = ctx.cache().peek(&ctx.config().pair_key(trade));
            let live = entry.as_ref().is_some_and(|entry| !entry.is_expired_at(now));
            (!live).then(|| ExpiringPair {
                index,
                have: trade.have.clone(),
                want: trade.want.clone(),
                cached: entry.is_some(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::context;
    use crate::fetch::tests::ok_ten;
    use crate::market::listing::listing_with_rate;
    use chrono::Duration;

    fn summary(index: usize, have: &str, want: &str, median: Option<f64>) -> PairSummary {
        PairSummary {
            median_rate: median,
            ..PairSummary::failed(index, &TradePair::new(have, want), PairStatus::Ok)
        }
    }

    #[test]
    fn links_reverse_pairs_with_margin() {
        let mut summaries = vec![
            summary(0, "divine", "chaos", Some(160.0)),
            summary(1, "chaos", "exalted", Some(2.0)),
            summary(2, "chaos", "divine", Some(1.0 / 150.0)),
        ];

        link_reverse_pairs(&mut summaries);

        assert_eq!(summaries[0].linked_pair_index, Some(2));
        assert_eq!(summaries[2].linked_pair_index, Some(0));
        assert_eq!(summaries[0].profit_margin_raw, Some(10.0));
        assert_eq!(summaries[2].profit_margin_pct, Some(6.67));
        assert!(summaries[1].linked_pair_index.is_none());
    }

    #[test]
    fn skips_pairs_without_medians() {
        let mut summaries = vec![
            summary(0, "divine", "chaos", Some(160.0)),
            summary(1, "chaos", "divine", None),
        ];

        link_reverse_pairs(&mut summaries);

        assert!(summaries.iter().all(|s| s.linked_pair_index.is_none()));
    }

    #[test]
    fn rate_limited_summary_rounds_remaining() {
        let summary = PairSummary::rate_limited(3, &TradePair::new("a", "b"), 12.345);

        assert_eq!(summary.status, PairStatus::RateLimited);
        assert_eq!(summary.rate_limit_remaining, Some(12.3));
        assert!(summary.listings.is_empty());
    }

    #[tokio::test]
    async fn latest_cached_serves_stale_entries_without_fetching() {
        let (ctx, transport) = context(ok_ten);
        let first = ctx.config().pair_key(&ctx.config().pairs[0]);
        let t0 = Utc::now();
        ctx.cache().set_at(
            &first,
            vec![listing_with_rate(1.0), listing_with_rate(2.0), listing_with_rate(3.0)],
            t0 - Duration::hours(1),
            t0 - Duration::hours(1),
        );

        let summaries = latest_cached(&ctx, 2);

        assert_eq!(summaries.len(), ctx.config().pairs.len());
        assert_eq!(summaries[0].status, PairStatus::Ok);
        assert!(summaries[0].was_cached);
        assert_eq!(summaries[0].count_returned, 2);
        assert_eq!(summaries[0].median_rate, Some(1.5));
        assert!(summaries[0].trend.is_some());
        assert_eq!(summaries[1].status, PairStatus::Error);
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn expiring_lists_missing_and_expired_pairs() {
        let (ctx, _transport) = context(ok_ten);
        let now = Utc::now();
        let keys = ctx.config().pair_keys();
        ctx.cache().set_at(&keys[0], vec![listing_with_rate(1.0)], now, now);
        ctx.cache()
            .set_at(&keys[1], vec![listing_with_rate(1.0)], now, now - Duration::hours(1));

        let expiring = expiring_pairs_at(&ctx, now);

        let indices: Vec<usize> = expiring.iter().map(|pair| pair.index).collect();
        assert_eq!(indices, vec![1, 2]);
        assert!(expiring[0].cached);
        assert!(!expiring[1].cached);
    }
}
