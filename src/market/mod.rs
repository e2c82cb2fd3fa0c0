pub mod listing;
pub mod pair;

pub use listing::{best_rate, mean_rate, median, median_rate, Listing};
pub use pair::{PairKey, TradePair};
