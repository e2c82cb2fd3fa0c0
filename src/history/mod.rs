//! Rolling per-pair price history.
//!
//! Snapshots live in memory keyed by [`PairKey`] and are written through to the durable
//! [`Store`] when one is attached. Reads never mutate the stored series.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::config::HistoryConfig;
use crate::error::Result;
use crate::market::{Listing, PairKey};
use crate::store::Store;

pub mod export;
pub mod snapshot;
pub mod trend;

pub use snapshot::PriceSnapshot;
pub use trend::{TrendDirection, TrendSummary};

#[derive(Debug, Clone, Serialize)]
pub struct HistoryStats {
    pub tracked_pairs: usize,
    pub total_snapshots: usize,
    pub oldest_snapshot: Option<DateTime<Utc>>,
    pub newest_snapshot: Option<DateTime<Utc>>,
}

pub struct HistoryStore {
    config: HistoryConfig,
    store: Option<Arc<Store>>,
    series: RwLock<HashMap<PairKey, Vec<PriceSnapshot>>>,
}

impl HistoryStore {
    /// An empty, memory-only history.
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            config,
            store: None,
            series: RwLock::new(HashMap::new()),
        }
    }

    /// Rehydrate from `store` within the retention window, then drop older rows from it.
    pub fn load(store: Arc<Store>, config: HistoryConfig) -> Result<Self> {
        Self::load_at(store, config, Utc::now())
    }

    pub fn load_at(store: Arc<Store>, config: HistoryConfig, now: DateTime<Utc>) -> Result<Self> {
        let cutoff = now - Duration::hours(config.retention_hours);

        let mut series: HashMap<PairKey, Vec<PriceSnapshot>> = HashMap::new();
        let rows = store.load_snapshots_since(cutoff)?;
        let loaded = rows.len();
        for (key, snapshot) in rows {
            series.entry(key).or_default().push(snapshot);
        }

        let purged = store.purge_snapshots_before(cutoff)?;
        info!(
            "Loaded {} price snapshots for {} pairs, purged {} past retention",
            loaded,
            series.len(),
            purged
        );

        Ok(Self {
            config,
            store: Some(store),
            series: RwLock::new(series),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<PairKey, Vec<PriceSnapshot>>> {
        self.series.read().unwrap_or_else(|poisoned| {
            warn!("History lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<PairKey, Vec<PriceSnapshot>>> {
        self.series.write().unwrap_or_else(|poisoned| {
            warn!("History lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Record a summary of `listings`; returns whether a snapshot was appended.
    pub fn add_snapshot(&self, key: &PairKey, listings: &[Listing]) -> bool {
        self.add_snapshot_at(key, listings, Utc::now())
    }

    pub fn add_snapshot_at(&self, key: &PairKey, listings: &[Listing], now: DateTime<Utc>) -> bool {
        let Some(mut snapshot) = PriceSnapshot::from_listings(listings, now) else {
            return false;
        };

        {
            let mut series = self.write();
            let entries = series.entry(key.clone()).or_default();
            if let Some(last) = entries.last() {
                if self.is_near_duplicate(last, &snapshot) {
                    debug!("Skipping near-duplicate snapshot for {key}");
                    return false;
                }
                if snapshot.timestamp < last.timestamp {
                    snapshot.timestamp = last.timestamp;
                }
            }
            entries.push(snapshot.clone());

            let cutoff = self.cutoff(now);
            let expired = entries.partition_point(|snap| snap.timestamp < cutoff);
            if expired > 0 {
                entries.drain(..expired);
                debug!("Dropped {expired} snapshots past retention for {key}");
            }
        }

        if let Some(store) = &self.store {
            if let Err(err) = store.save_snapshot(key, &snapshot) {
                error!("Failed to persist snapshot for {key}: {err}");
            }
        }
        true
    }

    fn is_near_duplicate(&self, last: &PriceSnapshot, next: &PriceSnapshot) -> bool {
        let close = (last.median_rate - next.median_rate).abs() < self.config.dedup_epsilon;
        let recent = next.timestamp - last.timestamp
            < Duration::seconds(self.config.dedup_window_secs);
        close && recent
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::hours(self.config.retention_hours)
    }

    fn retained(&self, key: &PairKey, now: DateTime<Utc>) -> Vec<PriceSnapshot> {
        let cutoff = self.cutoff(now);
        self.read()
            .get(key)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|snap| snap.timestamp >= cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshots inside the retention window, optionally thinned to `max_points`.
    pub fn get_history(&self, key: &PairKey, max_points: Option<usize>) -> Vec<PriceSnapshot> {
        self.get_history_at(key, max_points, Utc::now())
    }

    pub fn get_history_at(
        &self,
        key: &PairKey,
        max_points: Option<usize>,
        now: DateTime<Utc>,
    ) -> Vec<PriceSnapshot> {
        let retained = self.retained(key, now);
        match max_points {
            Some(max) => trend::stride_indices(retained.len(), max)
                .into_iter()
                .map(|index| retained[index].clone())
                .collect(),
            None => retained,
        }
    }

    pub fn get_trend(&self, key: &PairKey) -> TrendSummary {
        self.get_trend_at(key, Utc::now())
    }

    pub fn get_trend_at(&self, key: &PairKey, now: DateTime<Utc>) -> TrendSummary {
        trend::summarize(
            &self.retained(key, now),
            self.config.trend_threshold_pct,
            self.config.sparkline_points,
        )
    }

    /// Drop all in-memory history. The durable store is left alone.
    pub fn clear_all(&self) {
        self.write().clear();
        info!("Cleared in-memory price history");
    }

    /// Counts over the retention window, matching what [`get_history`](Self::get_history) serves.
    pub fn stats(&self) -> HistoryStats {
        self.stats_at(Utc::now())
    }

    pub fn stats_at(&self, now: DateTime<Utc>) -> HistoryStats {
        let cutoff = self.cutoff(now);
        let series = self.read();
        let retained: Vec<&[PriceSnapshot]> = series
            .values()
            .map(|entries| {
                let start = entries.partition_point(|snap| snap.timestamp < cutoff);
                &entries[start..]
            })
            .filter(|entries| !entries.is_empty())
            .collect();

        HistoryStats {
            tracked_pairs: retained.len(),
            total_snapshots: retained.iter().map(|entries| entries.len()).sum(),
            oldest_snapshot: retained.iter().filter_map(|e| e.first()).map(|s| s.timestamp).min(),
            newest_snapshot: retained.iter().filter_map(|e| e.last()).map(|s| s.timestamp).max(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::listing::listing_with_rate;

    fn key() -> PairKey {
        PairKey::new("Standard", "chaos", "divine")
    }

    fn listings(median: f64) -> Vec<Listing> {
        vec![
            listing_with_rate(median - 1.0),
            listing_with_rate(median),
            listing_with_rate(median + 1.0),
        ]
    }

    #[test]
    fn suppresses_near_duplicates_within_window() {
        let history = HistoryStore::new(HistoryConfig::default());
        let t0 = Utc::now();

        assert!(history.add_snapshot_at(&key(), &listings(10.0), t0));
        assert!(!history.add_snapshot_at(&key(), &listings(10.0), t0 + Duration::seconds(30)));
        assert_eq!(history.get_history_at(&key(), None, t0).len(), 1);

        assert!(history.add_snapshot_at(&key(), &listings(10.0), t0 + Duration::seconds(61)));
        assert!(history.add_snapshot_at(&key(), &listings(10.5), t0 + Duration::seconds(62)));
        assert_eq!(history.get_history_at(&key(), None, t0).len(), 3);
    }

    #[test]
    fn dedup_window_is_configurable() {
        let config = HistoryConfig {
            dedup_window_secs: 5,
            ..HistoryConfig::default()
        };
        let history = HistoryStore::new(config);
        let t0 = Utc::now();

        history.add_snapshot_at(&key(), &listings(10.0), t0);

        assert!(history.add_snapshot_at(&key(), &listings(10.0), t0 + Duration::seconds(10)));
    }

    #[test]
    fn empty_listing_set_is_ignored() {
        let history = HistoryStore::new(HistoryConfig::default());

        assert!(!history.add_snapshot(&key(), &[]));
        assert_eq!(history.stats().total_snapshots, 0);
    }

    #[test]
    fn timestamps_never_go_backwards() {
        let history = HistoryStore::new(HistoryConfig::default());
        let t0 = Utc::now();

        history.add_snapshot_at(&key(), &listings(10.0), t0);
        history.add_snapshot_at(&key(), &listings(12.0), t0 - Duration::seconds(5));

        let series = history.get_history_at(&key(), None, t0);
        assert_eq!(series[1].timestamp, t0);
    }

    #[test]
    fn history_respects_max_points_and_order() {
        let history = HistoryStore::new(HistoryConfig::default());
        let t0 = Utc::now() - Duration::hours(2);
        for i in 0..97 {
            history.add_snapshot_at(
                &key(),
                &listings(10.0 + i as f64),
                t0 + Duration::minutes(i),
            );
        }
        let now = t0 + Duration::hours(2);

        for max in [1, 7, 30, 96, 97, 500] {
            let sampled = history.get_history_at(&key(), Some(max), now);
            assert!(sampled.len() <= max);
            assert!(sampled.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        }
        assert!(history.get_history_at(&key(), Some(0), now).is_empty());
        assert_eq!(history.get_history_at(&key(), Some(500), now).len(), 97);
    }

    #[test]
    fn retention_hides_old_snapshots() {
        let history = HistoryStore::new(HistoryConfig::default());
        let now = Utc::now();

        history.add_snapshot_at(&key(), &listings(5.0), now - Duration::hours(200));
        history.add_snapshot_at(&key(), &listings(6.0), now - Duration::hours(1));

        let retained = history.get_history_at(&key(), None, now);
        assert_eq!(retained.len(), 1);
        assert_eq!(retained[0].median_rate, 6.0);
        assert_eq!(history.get_trend_at(&key(), now).data_points, 1);
    }

    #[test]
    fn aged_out_snapshots_leave_memory_and_stats() {
        let history = HistoryStore::new(HistoryConfig::default());
        let now = Utc::now();
        let start = now - Duration::days(30);
        for hour in 0..100 {
            history.add_snapshot_at(
                &key(),
                &listings(10.0 + hour as f64),
                start + Duration::hours(hour),
            );
        }

        history.add_snapshot_at(&key(), &listings(500.0), now);

        let visible = history.get_history_at(&key(), None, now);
        let stats = history.stats_at(now);
        assert_eq!(visible.len(), 1);
        assert_eq!(stats.total_snapshots, visible.len());
        assert_eq!(stats.oldest_snapshot, Some(now));
        assert_eq!(history.read()[&key()].len(), 1);
    }

    #[test]
    fn stats_skip_pairs_with_only_expired_snapshots() {
        let history = HistoryStore::new(HistoryConfig::default());
        let now = Utc::now();
        let other = PairKey::new("Standard", "divine", "chaos");

        history.add_snapshot_at(&key(), &listings(5.0), now - Duration::hours(200));
        history.add_snapshot_at(&other, &listings(6.0), now - Duration::hours(1));

        let stats = history.stats_at(now);
        assert_eq!(stats.tracked_pairs, 1);
        assert_eq!(stats.total_snapshots, 1);
    }

    #[test]
    fn trend_for_unknown_pair_is_neutral() {
        let history = HistoryStore::new(HistoryConfig::default());

        let trend = history.get_trend(&key());

        assert_eq!(trend.direction, TrendDirection::Neutral);
        assert_eq!(trend.change_percent, 0.0);
    }

    #[test]
    fn clear_all_empties_memory_only() {
        let store = Arc::new(Store::open_in_memory().expect("store opens"));
        let history = HistoryStore::load(store.clone(), HistoryConfig::default()).expect("load");
        history.add_snapshot(&key(), &listings(3.0));

        history.clear_all();

        assert_eq!(history.stats().tracked_pairs, 0);
        assert_eq!(store.stats().expect("stats").price_snapshots, 1);
    }

    #[test]
    fn survives_restart_within_retention() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("history.db");
        let now = Utc::now();
        let other = PairKey::new("Standard", "divine", "chaos");

        {
            let store = Arc::new(Store::open(&path).expect("store opens"));
            let history = HistoryStore::load(store.clone(), HistoryConfig::default()).expect("load");
            history.add_snapshot_at(&key(), &listings(5.0), now - Duration::hours(300));
            history.add_snapshot_at(&key(), &listings(6.0), now - Duration::minutes(10));
            history.add_snapshot_at(&other, &listings(150.0), now - Duration::minutes(5));
            store.close().expect("close");
        }

        let store = Arc::new(Store::open(&path).expect("store reopens"));
        let history = HistoryStore::load_at(store.clone(), HistoryConfig::default(), now)
            .expect("reload");

        let stats = history.stats();
        assert_eq!(stats.tracked_pairs, 2);
        assert_eq!(stats.total_snapshots, 2);
        assert_eq!(history.get_history_at(&key(), None, now)[0].median_rate, 6.0);
        assert_eq!(store.stats().expect("stats").price_snapshots, 2);
    }
}
