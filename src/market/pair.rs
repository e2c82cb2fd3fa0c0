use std::fmt;

use serde::{Deserialize, Serialize};

/// A configured trade direction: what we pay with and what we want back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradePair {
    pub have: String,
    pub want: String,
    /// Marked for closer watching; carried through to summaries.
    #[serde(default)]
    pub hot: bool,
}

impl TradePair {
    pub fn new(have: impl Into<String>, want: impl Into<String>) -> Self {
        Self {
            have: have.into(),
            want: want.into(),
            hot: false,
        }
    }

    pub fn is_reverse_of(&self, other: &TradePair) -> bool {
        self.have == other.want && self.want == other.have
    }
}

/// Identity of a pair inside a market; shared key of the cache, the history and the durable store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    pub market: String,
    pub have: String,
    pub want: String,
}

impl PairKey {
    pub fn new(
        market: impl Into<String>,
        have: impl Into<String>,
        want: impl Into<String>,
    ) -> Self {
        Self {
            market: market.into(),
            have: have.into(),
            want: want.into(),
        }
    }

    pub fn for_trade(market: &str, trade: &TradePair) -> Self {
        Self::new(market, trade.have.as_str(), trade.want.as_str())
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}->{}", self.market, self.have, self.want)
    }
}
