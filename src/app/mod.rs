//! Application context and the operations built on the fetch core.

use std::sync::Arc;

use log::info;

use crate::cache::ListingCache;
use crate::config::Config;
use crate::error::Result;
use crate::fetch::{ExchangeFetcher, Transport};
use crate::governor::RateGovernor;
use crate::history::HistoryStore;
use crate::store::Store;

pub mod refresh;
pub mod status;
pub mod stream;
pub mod summary;

pub use refresh::{refresh_all, refresh_pair};
pub use stream::{stream_pairs, StreamOptions};
pub use summary::{expiring_pairs, latest_cached, link_reverse_pairs, PairStatus, PairSummary};

/// Everything a running process shares: configuration, the durable store, the governor, the
/// cache, the history and the fetcher over them.
pub struct AppContext {
    config: Config,
    store: Arc<Store>,
    governor: Arc<RateGovernor>,
    cache: Arc<ListingCache>,
    history: Arc<HistoryStore>,
    fetcher: ExchangeFetcher,
}

impl AppContext {
    /// Open the configured database and rehydrate cache and history from it.
    pub fn init(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        let store = Arc::new(Store::open(&config.storage.database_path)?);
        Self::with_store(config, transport, store)
    }

    pub fn with_store(
        config: Config,
        transport: Arc<dyn Transport>,
        store: Arc<Store>,
    ) -> Result<Self> {
        let cache = Arc::new(ListingCache::load(store.clone(), &config.cache)?);
        let history = Arc::new(HistoryStore::load(store.clone(), config.history.clone())?);
        let governor = Arc::new(RateGovernor::new(config.governor.clone()));
        let fetcher = ExchangeFetcher::new(
            transport,
            governor.clone(),
            cache.clone(),
            config.fetch.clone(),
        );

        info!(
            "Context ready for market {} with {} pairs",
            config.market,
            config.pairs.len()
        );

        Ok(Self {
            config,
            store,
            governor,
            cache,
            history,
            fetcher,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn governor(&self) -> &RateGovernor {
        &self.governor
    }

    pub fn cache(&self) -> &ListingCache {
        &self.cache
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn fetcher(&self) -> &ExchangeFetcher {
        &self.fetcher
    }

    /// Close the durable store. In-memory state stays readable.
    pub fn close(&self) -> Result<()> {
        self.store.close()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Result;
    use crate::fetch::tests::{quick_fetch_config, ScriptedTransport};
    use crate::fetch::UpstreamResponse;

    pub(crate) fn context(
        fallback: fn() -> Result<UpstreamResponse>,
    ) -> (AppContext, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::always(fallback));
        let config = Config {
            fetch: quick_fetch_config(),
            ..Config::builtin()
        };
        let store = Arc::new(Store::open_in_memory().expect("store opens"));
        let ctx = AppContext::with_store(config, transport.clone(), store).expect("context");
        (ctx, transport)
    }

    #[test]
    fn init_creates_database_and_close_releases_it() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut config = Config::builtin();
        config.storage.database_path = dir.path().join("ctx.db").display().to_string();
        let transport = Arc::new(ScriptedTransport::always(crate::fetch::tests::ok_ten));

        let ctx = AppContext::init(config, transport).expect("init");

        assert!(dir.path().join("ctx.db").exists());
        assert_eq!(ctx.history().stats().total_snapshots, 0);
        ctx.close().expect("close");
        assert!(ctx.store().stats().is_err());
    }
}
