use chrono::{DateTime, Utc};
use log::warn;
use rusqlite::params;

use crate::error::Result;
use crate::history::PriceSnapshot;
use crate::market::PairKey;

use super::{from_millis, to_millis, Store};

impl Store {
    pub fn save_snapshot(&self, key: &PairKey, snapshot: &PriceSnapshot) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO price_snapshots
                 (market, have, want, timestamp, best_rate, avg_rate, median_rate, listing_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    key.market,
                    key.have,
                    key.want,
                    to_millis(snapshot.timestamp),
                    snapshot.best_rate,
                    snapshot.avg_rate,
                    snapshot.median_rate,
                    snapshot.listing_count as i64,
                ],
            )?;
            tx.commit()
        })
    }

    /// Snapshots at or after `cutoff`, ordered by pair and then timestamp.
    pub fn load_snapshots_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<(PairKey, PriceSnapshot)>> {
        let raw = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT market, have, want, timestamp, best_rate, avg_rate, median_rate, listing_count
                 FROM price_snapshots
                 WHERE timestamp >= ?1
                 ORDER BY market, have, want, timestamp, id",
            )?;
            let rows = stmt.query_map(params![to_millis(cutoff)], |row| {
                Ok((
                    PairKey::new(
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ),
                    row.get::<_, i64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, f64>(5)?,
                    row.get::<_, f64>(6)?,
                    row.get::<_, i64>(7)?,
                ))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })?;

        let mut snapshots = Vec::with_capacity(raw.len());
        for (key, millis, best_rate, avg_rate, median_rate, listing_count) in raw {
            let Some(timestamp) = from_millis(millis) else {
                warn!("Skipping snapshot for {key} with out-of-range timestamp {millis}");
                continue;
            };
            snapshots.push((
                key,
                PriceSnapshot {
                    timestamp,
                    best_rate,
                    avg_rate,
                    median_rate,
                    listing_count: listing_count.max(0) as usize,
                },
            ));
        }
        Ok(snapshots)
    }

    pub fn purge_snapshots_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM price_snapshots WHERE timestamp < ?1",
                params![to_millis(cutoff)],
            )?;
            tx.commit()?;
            Ok(removed)
        })
    }

    pub fn clear_snapshots(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute("DELETE FROM price_snapshots", [])?;
            tx.commit()?;
            Ok(removed)
        })
    }
}
