use chrono::{DateTime, Utc};
use log::warn;
use rusqlite::params;

use crate::error::Result;
use crate::market::{Listing, PairKey};

use super::{from_millis, to_millis, Store};

/// A persisted listing-cache entry.
#[derive(Debug, Clone)]
pub struct CacheRow {
    pub key: PairKey,
    pub listings: Vec<Listing>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Store {
    /// Insert or replace the cache row for `key`.
    pub fn save_cache_entry(
        &self,
        key: &PairKey,
        listings: &[Listing],
        expires_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        let listings_json = serde_json::to_string(listings)?;
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR REPLACE INTO cache_entries
                 (market, have, want, listings_json, expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    key.market,
                    key.have,
                    key.want,
                    listings_json,
                    to_millis(expires_at),
                    to_millis(created_at),
                ],
            )?;
            tx.commit()
        })
    }

    pub fn delete_cache_entry(&self, key: &PairKey) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM cache_entries WHERE market = ?1 AND have = ?2 AND want = ?3",
                params![key.market, key.have, key.want],
            )?;
            tx.commit()
        })
    }

    /// Rows that have not expired at `now`. Rows whose listings no longer decode are skipped.
    pub fn load_cache_entries(&self, now: DateTime<Utc>) -> Result<Vec<CacheRow>> {
        let raw = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT market, have, want, listings_json, expires_at, created_at
                 FROM cache_entries WHERE expires_at > ?1",
            )?;
            let rows = stmt.query_map(params![to_millis(now)], |row| {
                Ok((
                    PairKey::new(
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ),
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })?;

        let mut entries = Vec::with_capacity(raw.len());
        for (key, listings_json, expires_at, created_at) in raw {
            let listings: Vec<Listing> = match serde_json::from_str(&listings_json) {
                Ok(listings) => listings,
                Err(err) => {
                    warn!("Skipping unreadable cache entry for {key}: {err}");
                    continue;
                }
            };
            let (Some(expires_at), Some(created_at)) =
                (from_millis(expires_at), from_millis(created_at))
            else {
                warn!("Skipping cache entry for {key} with out-of-range timestamps");
                continue;
            };
            entries.push(CacheRow {
                key,
                listings,
                expires_at,
                created_at,
            });
        }
        Ok(entries)
    }

    /// Delete rows already expired at `now`, returning how many were removed.
    pub fn purge_expired_cache(&self, now: DateTime<Utc>) -> Result<usize> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM cache_entries WHERE expires_at <= ?1",
                params![to_millis(now)],
            )?;
            tx.commit()?;
            Ok(removed)
        })
    }
}
