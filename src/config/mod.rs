use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::market::{PairKey, TradePair};

pub mod loader;
pub mod validator;

pub use loader::{apply_env_overrides, load_config};
pub use validator::validate_config;

const EXCHANGE_ENDPOINT: &str = "https://www.pathofexile.com/api/trade/exchange";

/// Where and how the upstream exchange API is called.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub base_url: String,
    /// Header values may contain `${VAR}` placeholders resolved from the environment.
    pub headers: HashMap<String, String>,
    /// Cookie name to value template, joined into a single `Cookie` header.
    pub cookies: HashMap<String, String>,
    pub timeout_secs: u64,
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Usage ratio at which soft throttling starts.
    pub soft_ratio: f64,
    /// Fraction of a rule's reset window slept when soft throttling.
    pub soft_sleep_factor: f64,
    pub soft_min_secs: f64,
    pub soft_max_secs: f64,
    /// Longest single sleep while waiting, so shorter unblocks are noticed.
    pub poll_cap_secs: f64,
    /// Rules probed even when the upstream does not list them.
    pub default_rules: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub retention_hours: i64,
    pub dedup_window_secs: i64,
    pub dedup_epsilon: f64,
    pub sparkline_points: usize,
    pub trend_threshold_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub retries: u32,
    pub backoff_secs: f64,
    /// Listings requested from upstream regardless of the caller's slice.
    pub upstream_depth: usize,
    pub default_top_n: usize,
    pub stream_delay_secs: f64,
    pub concurrency: usize,
}

impl FetchConfig {
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        Duration::from_secs_f64(self.backoff_secs * 2_f64.powi(attempt as i32))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub market: String,
    pub pairs: Vec<TradePair>,
    pub upstream: UpstreamConfig,
    pub governor: GovernorConfig,
    pub cache: CacheConfig,
    pub history: HistoryConfig,
    pub fetch: FetchConfig,
    pub storage: StorageConfig,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        let headers = HashMap::from([
            ("Accept".to_string(), "*/*".to_string()),
            ("Accept-Language".to_string(), "en-US,en;q=0.8".to_string()),
            (
                "Origin".to_string(),
                "https://www.pathofexile.com".to_string(),
            ),
            (
                "User-Agent".to_string(),
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/141.0.0.0 Safari/537.36".to_string(),
            ),
            ("X-Requested-With".to_string(), "XMLHttpRequest".to_string()),
        ]);

        let cookies = HashMap::from([
            ("POESESSID".to_string(), "${POESESSID}".to_string()),
            ("cf_clearance".to_string(), "${CF_CLEARANCE}".to_string()),
        ]);

        Self {
            base_url: EXCHANGE_ENDPOINT.to_string(),
            headers,
            cookies,
            timeout_secs: 20,
        }
    }
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            soft_ratio: 0.8,
            soft_sleep_factor: 0.05,
            soft_min_secs: 0.2,
            soft_max_secs: 3.0,
            poll_cap_secs: 2.0,
            default_rules: vec!["Ip".to_string(), "Account".to_string()],
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 120 }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            retention_hours: 168,
            dedup_window_secs: 60,
            dedup_epsilon: 1e-6,
            sparkline_points: 30,
            trend_threshold_pct: 2.0,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            retries: 2,
            backoff_secs: 0.8,
            upstream_depth: 20,
            default_top_n: 5,
            stream_delay_secs: 2.0,
            concurrency: 3,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "exchange_cache.db".to_string(),
        }
    }
}

impl Config {
    pub fn builtin() -> Self {
        Self {
            market: "Standard".to_string(),
            pairs: vec![
                TradePair::new("chaos", "divine"),
                TradePair::new("divine", "chaos"),
                TradePair::new("divine", "exalted"),
            ],
            upstream: UpstreamConfig::default(),
            governor: GovernorConfig::default(),
            cache: CacheConfig::default(),
            history: HistoryConfig::default(),
            fetch: FetchConfig::default(),
            storage: StorageConfig::default(),
        }
    }

    pub fn pair_key(&self, trade: &TradePair) -> PairKey {
        PairKey::for_trade(&self.market, trade)
    }

    pub fn pair_keys(&self) -> Vec<PairKey> {
        self.pairs.iter().map(|trade| self.pair_key(trade)).collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::builtin()
    }
}
