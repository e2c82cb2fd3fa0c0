//! Upstream fetching behind the listing cache and the rate governor.
//!
//! [`ExchangeFetcher`] never records history itself: only the calling layer knows whether a
//! result is a fresh observation worth a snapshot.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use reqwest::StatusCode;
use serde_json::Value;

use crate::cache::ListingCache;
use crate::config::FetchConfig;
use crate::governor::RateGovernor;
use crate::market::{Listing, PairKey};

pub mod decode;
pub mod request;
pub mod transport;

pub use transport::{ExchangeQuery, HttpTransport, Transport, UpstreamResponse};

/// Listings served to a caller, already sliced to the requested count.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub listings: Vec<Listing>,
    pub was_cached: bool,
    pub fetched_at: DateTime<Utc>,
}

pub struct ExchangeFetcher {
    transport: Arc<dyn Transport>,
    governor: Arc<RateGovernor>,
    cache: Arc<ListingCache>,
    config: FetchConfig,
}

impl ExchangeFetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        governor: Arc<RateGovernor>,
        cache: Arc<ListingCache>,
        config: FetchConfig,
    ) -> Self {
        Self {
            transport,
            governor,
            cache,
            config,
        }
    }

    pub fn governor(&self) -> &RateGovernor {
        &self.governor
    }

    pub fn cache(&self) -> &ListingCache {
        &self.cache
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Serve from the cache when possible, otherwise fetch upstream and cache the full set.
    ///
    /// A cache hit does not touch the governor. `None` means the upstream stayed unavailable
    /// through every retry.
    pub async fn fetch_with_cache(&self, key: &PairKey, top_n: usize) -> Option<FetchOutcome> {
        if let Some(entry) = self.cache.get(key) {
            return Some(FetchOutcome {
                listings: slice(&entry.listings, top_n),
                was_cached: true,
                fetched_at: entry.fetched_at,
            });
        }
        self.fetch_and_store(key, top_n).await
    }

    /// Drop any cached entry and fetch upstream.
    pub async fn fetch_forced(&self, key: &PairKey, top_n: usize) -> Option<FetchOutcome> {
        self.cache.invalidate(key);
        self.fetch_and_store(key, top_n).await
    }

    async fn fetch_and_store(&self, key: &PairKey, top_n: usize) -> Option<FetchOutcome> {
        let listings = self.fetch_upstream(key).await?;
        let fetched_at = Utc::now();
        let served = slice(&listings, top_n);

        // The write-through hits SQLite, so keep it off the async workers.
        let cache = Arc::clone(&self.cache);
        let owned_key = key.clone();
        let write = tokio::task::spawn_blocking(move || cache.set(&owned_key, listings, fetched_at));
        if let Err(err) = write.await {
            error!("Cache write for {key} did not complete: {err}");
        }

        Some(FetchOutcome {
            listings: served,
            was_cached: false,
            fetched_at,
        })
    }

    async fn fetch_upstream(&self, key: &PairKey) -> Option<Vec<Listing>> {
        let query = ExchangeQuery::from(key);
        let attempts = self.config.retries + 1;

        for attempt in 0..attempts {
            self.governor.wait_before_request().await;

            match self.transport.send(&query).await {
                Ok(response) => {
                    self.governor.on_response(&response.headers);
                    if response.status == StatusCode::OK {
                        match serde_json::from_str::<Value>(&response.body) {
                            Ok(data) => {
                                let listings =
                                    decode::summarize_exchange(&data, self.config.upstream_depth);
                                debug!("Fetched {} listings for {key}", listings.len());
                                return Some(listings);
                            }
                            Err(err) => {
                                warn!("Unreadable exchange body for {key}: {err}");
                            }
                        }
                    } else {
                        warn!(
                            "Upstream returned {} for {key} (attempt {}/{})",
                            response.status,
                            attempt + 1,
                            attempts
                        );
                    }
                }
                Err(err) => {
                    warn!(
                        "Exchange request for {key} failed (attempt {}/{}): {err}",
                        attempt + 1,
                        attempts
                    );
                }
            }

            if attempt + 1 < attempts {
                tokio::time::sleep(self.config.backoff_for(attempt)).await;
            }
        }

        warn!("Upstream unavailable for {key} after {attempts} attempts");
        None
    }
}

fn slice(listings: &[Listing], top_n: usize) -> Vec<Listing> {
    listings.iter().take(top_n.max(1)).cloned().collect()
}
