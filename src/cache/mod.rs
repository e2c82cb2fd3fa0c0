//! TTL cache of upstream listing sets, written through to the durable store.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::config::CacheConfig;
use crate::error::Result;
use crate::market::{Listing, PairKey};
use crate::store::Store;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Sorted ascending by rate.
    pub listings: Vec<Listing>,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheEntryStatus {
    pub market: String,
    pub have: String,
    pub want: String,
    pub seconds_remaining: i64,
    pub expired: bool,
    pub listing_count: usize,
}

pub struct ListingCache {
    ttl: Duration,
    store: Option<Arc<Store>>,
    entries: RwLock<HashMap<PairKey, Arc<CacheEntry>>>,
}

impl ListingCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            ttl: Duration::seconds(config.ttl_secs),
            store: None,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Rehydrate live entries from `store` and sweep expired rows out of it.
    pub fn load(store: Arc<Store>, config: &CacheConfig) -> Result<Self> {
        Self::load_at(store, config, Utc::now())
    }

    pub fn load_at(store: Arc<Store>, config: &CacheConfig, now: DateTime<Utc>) -> Result<Self> {
        let entries: HashMap<PairKey, Arc<CacheEntry>> = store
            .load_cache_entries(now)?
            .into_iter()
            .map(|row| {
                let entry = CacheEntry {
                    listings: row.listings,
                    fetched_at: row.created_at,
                    expires_at: row.expires_at,
                };
                (row.key, Arc::new(entry))
            })
            .collect();

        let purged = store.purge_expired_cache(now)?;
        info!(
            "Loaded {} cache entries from database, purged {} expired",
            entries.len(),
            purged
        );

        Ok(Self {
            ttl: Duration::seconds(config.ttl_secs),
            store: Some(store),
            entries: RwLock::new(entries),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<PairKey, Arc<CacheEntry>>> {
        self.entries.read().unwrap_or_else(|poisoned| {
            warn!("Cache lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<PairKey, Arc<CacheEntry>>> {
        self.entries.write().unwrap_or_else(|poisoned| {
            warn!("Cache lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The live entry for `key`, or `None` when missing or expired.
    pub fn get(&self, key: &PairKey) -> Option<Arc<CacheEntry>> {
        self.get_at(key, Utc::now())
    }

    pub fn get_at(&self, key: &PairKey, now: DateTime<Utc>) -> Option<Arc<CacheEntry>> {
        let entry = self.read().get(key).cloned();
        match entry {
            Some(entry) if !entry.is_expired_at(now) => {
                debug!("Cache hit for {key}");
                Some(entry)
            }
            _ => {
                debug!("Cache miss for {key}");
                None
            }
        }
    }

    /// The entry for `key` regardless of expiry.
    pub fn peek(&self, key: &PairKey) -> Option<Arc<CacheEntry>> {
        self.read().get(key).cloned()
    }

    /// Replace the entry for `key`. Persistence failures are logged, never returned.
    pub fn set(&self, key: &PairKey, listings: Vec<Listing>, fetched_at: DateTime<Utc>) {
        self.set_at(key, listings, fetched_at, Utc::now())
    }

    pub fn set_at(
        &self,
        key: &PairKey,
        listings: Vec<Listing>,
        fetched_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        let entry = Arc::new(CacheEntry {
            listings,
            fetched_at,
            expires_at: now + self.ttl,
        });
        self.write().insert(key.clone(), entry.clone());

        if let Some(store) = &self.store {
            if let Err(err) =
                store.save_cache_entry(key, &entry.listings, entry.expires_at, entry.fetched_at)
            {
                error!("Failed to persist cache entry for {key}: {err}");
            }
        }
    }

    pub fn invalidate(&self, key: &PairKey) {
        self.write().remove(key);
        if let Some(store) = &self.store {
            if let Err(err) = store.delete_cache_entry(key) {
                warn!("Failed to delete persisted cache entry for {key}: {err}");
            }
        }
    }

    pub fn stats(&self) -> Vec<CacheEntryStatus> {
        self.stats_at(Utc::now())
    }

    pub fn stats_at(&self, now: DateTime<Utc>) -> Vec<CacheEntryStatus> {
        let mut stats: Vec<CacheEntryStatus> = self
            .read()
            .iter()
            .map(|(key, entry)| CacheEntryStatus {
                market: key.market.clone(),
                have: key.have.clone(),
                want: key.want.clone(),
                seconds_remaining: (entry.expires_at - now).num_seconds().max(0),
                expired: entry.is_expired_at(now),
                listing_count: entry.listings.len(),
            })
            .collect();
        stats.sort_by(|a, b| (&a.have, &a.want).cmp(&(&b.have, &b.want)));
        stats
    }
}
