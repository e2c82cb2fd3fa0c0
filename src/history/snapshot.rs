use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::market::{best_rate, mean_rate, median_rate, Listing};

/// Summary of one observation of a pair's listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub timestamp: DateTime<Utc>,
    pub best_rate: f64,
    pub avg_rate: f64,
    pub median_rate: f64,
    pub listing_count: usize,
}

impl PriceSnapshot {
    /// Summarise a listing set; `None` when there is nothing to summarise.
    pub fn from_listings(listings: &[Listing], timestamp: DateTime<Utc>) -> Option<Self> {
        Some(Self {
            timestamp,
            best_rate: best_rate(listings)?,
            avg_rate: mean_rate(listings)?,
            median_rate: median_rate(listings)?,
            listing_count: listings.len(),
        })
    }
}
