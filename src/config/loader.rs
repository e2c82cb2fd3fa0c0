use std::{collections::HashMap, fs, path::Path, str::FromStr};

use serde::Deserialize;

use crate::error::{AppError, Context, Result};
use crate::market::TradePair;

use super::{
    validator, CacheConfig, Config, FetchConfig, GovernorConfig, HistoryConfig, StorageConfig,
    UpstreamConfig,
};

/// Load a JSON configuration file, fill omitted sections with defaults, apply environment
/// overrides and validate the result.
pub fn load_config(path: &Path) -> Result<Config> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read config JSON at {}", path.display()))?;

    let raw: RawConfig = serde_json::from_str(&json)
        .with_context(|| format!("failed to parse config JSON at {}", path.display()))?;

    let mut config = raw.into_config();
    apply_env_overrides(&mut config)?;
    validator::validate_config(&config)?;
    Ok(config)
}

/// Apply `EXCHANGE_*` environment overrides on top of a loaded or builtin configuration.
pub fn apply_env_overrides(config: &mut Config) -> Result<()> {
    if let Some(ratio) = env_value::<f64>("EXCHANGE_SOFT_RATIO")? {
        config.governor.soft_ratio = ratio;
    }
    if let Some(factor) = env_value::<f64>("EXCHANGE_SOFT_SLEEP_FACTOR")? {
        config.governor.soft_sleep_factor = factor;
    }
    if let Some(ttl) = env_value::<i64>("EXCHANGE_CACHE_TTL")? {
        config.cache.ttl_secs = ttl;
    }
    if let Some(path) = env_value::<String>("EXCHANGE_DB_PATH")? {
        config.storage.database_path = path;
    }
    if let Some(market) = env_value::<String>("EXCHANGE_MARKET")? {
        config.market = market;
    }
    Ok(())
}

fn env_value<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| AppError::config(format!("{name} has an unparseable value `{raw}`"))),
        Err(_) => Ok(None),
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default = "default_market", alias = "league")]
    market: String,
    #[serde(default, alias = "trades")]
    pairs: Vec<RawTradePair>,
    #[serde(default)]
    upstream: Option<RawUpstreamConfig>,
    #[serde(default)]
    governor: Option<GovernorConfig>,
    #[serde(default)]
    cache: Option<CacheConfig>,
    #[serde(default)]
    history: Option<HistoryConfig>,
    #[serde(default)]
    fetch: Option<FetchConfig>,
    #[serde(default)]
    storage: Option<StorageConfig>,
}

fn default_market() -> String {
    "Standard".to_string()
}

impl RawConfig {
    fn into_config(self) -> Config {
        let builtin = Config::builtin();
        let pairs = if self.pairs.is_empty() {
            builtin.pairs
        } else {
            self.pairs.into_iter().map(RawTradePair::into_pair).collect()
        };

        Config {
            market: self.market,
            pairs,
            upstream: self
                .upstream
                .map(RawUpstreamConfig::into_upstream)
                .unwrap_or_default(),
            governor: self.governor.unwrap_or_default(),
            cache: self.cache.unwrap_or_default(),
            history: self.history.unwrap_or_default(),
            fetch: self.fetch.unwrap_or_default(),
            storage: self.storage.unwrap_or_default(),
        }
    }
}

/// Accepts both `{have, want}` and the older `{pay, get}` spelling.
#[derive(Debug, Deserialize)]
struct RawTradePair {
    #[serde(alias = "pay")]
    have: String,
    #[serde(alias = "get")]
    want: String,
    #[serde(default)]
    hot: bool,
}

impl RawTradePair {
    fn into_pair(self) -> TradePair {
        TradePair {
            hot: self.hot,
            ..TradePair::new(self.have.trim(), self.want.trim())
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawUpstreamConfig {
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    cookies: HashMap<String, String>,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

impl RawUpstreamConfig {
    /// Configured headers and cookies extend the defaults rather than replace them.
    fn into_upstream(self) -> UpstreamConfig {
        let mut upstream = UpstreamConfig::default();
        if let Some(base_url) = self.base_url {
            upstream.base_url = base_url.trim_end_matches('/').to_string();
        }
        upstream.headers.extend(self.headers);
        upstream.cookies.extend(self.cookies);
        if let Some(timeout) = self.timeout_secs {
            upstream.timeout_secs = timeout;
        }
        upstream
    }
}
