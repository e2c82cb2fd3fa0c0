use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::CacheEntryStatus;
use crate::error::Result;
use crate::governor::GovernorStatus;
use crate::history::HistoryStats;
use crate::store::DatabaseStats;

use super::AppContext;

/// Cache state of one configured pair.
#[derive(Debug, Clone, Serialize)]
pub struct PairCacheStatus {
    pub index: usize,
    pub have: String,
    pub want: String,
    pub cached: bool,
    pub expired: bool,
    pub seconds_remaining: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheSummary {
    pub market: String,
    pub ttl_secs: i64,
    pub pairs: Vec<PairCacheStatus>,
    /// Entries for configured pairs only.
    pub entries: Vec<CacheEntryStatus>,
    pub history: HistoryStats,
}

pub fn governor_status(ctx: &AppContext) -> GovernorStatus {
    ctx.governor().status()
}

pub fn cache_status(ctx: &AppContext) -> CacheSummary {
    cache_status_at(ctx, Utc::now())
}

pub fn cache_status_at(ctx: &AppContext, now: DateTime<Utc>) -> CacheSummary {
    let config = ctx.config();

    let pairs = config
        .pairs
        .iter()
        .enumerate()
        .map(|(index, trade)| {
            let entry = ctx.cache().peek(&config.pair_key(trade));
            let remaining = entry
                .as_ref()
                .map(|entry| (entry.expires_at - now).num_milliseconds().max(0) as f64 / 1000.0)
                .unwrap_or(0.0);
            PairCacheStatus {
                index,
                have: trade.have.clone(),
                want: trade.want.clone(),
                cached: entry.is_some(),
                expired: entry.as_ref().map_or(true, |entry| entry.is_expired_at(now)),
                seconds_remaining: (remaining * 10.0).round() / 10.0,
            }
        })
        .collect();

    let configured = config.pair_keys();
    let entries = ctx
        .cache()
        .stats_at(now)
        .into_iter()
        .filter(|entry| {
            configured.iter().any(|key| {
                key.market == entry.market && key.have == entry.have && key.want == entry.want
            })
        })
        .collect();

    CacheSummary {
        market: config.market.clone(),
        ttl_secs: ctx.cache().ttl().num_seconds(),
        pairs,
        entries,
        history: ctx.history().stats(),
    }
}

pub fn database_stats(ctx: &AppContext) -> Result<DatabaseStats> {
    ctx.store().stats()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::context;
    use crate::fetch::tests::ok_ten;
    use crate::market::listing::listing_with_rate;
    use crate::market::PairKey;
    use chrono::Duration;

    #[test]
    fn reports_configured_pairs_only() {
        let (ctx, _transport) = context(ok_ten);
        let now = Utc::now();
        let keys = ctx.config().pair_keys();
        ctx.cache().set_at(&keys[0], vec![listing_with_rate(1.0)], now, now);
        ctx.cache().set_at(
            &PairKey::new("Other", "chaos", "divine"),
            vec![listing_with_rate(1.0)],
            now,
            now,
        );

        let summary = cache_status_at(&ctx, now + Duration::seconds(30));

        assert_eq!(summary.ttl_secs, 120);
        assert_eq!(summary.pairs.len(), 3);
        assert!(summary.pairs[0].cached && !summary.pairs[0].expired);
        assert_eq!(summary.pairs[0].seconds_remaining, 90.0);
        assert!(!summary.pairs[1].cached && summary.pairs[1].expired);
        assert_eq!(summary.entries.len(), 1);
    }

    #[test]
    fn database_stats_count_rows() {
        let (ctx, _transport) = context(ok_ten);
        let key = ctx.config().pair_key(&ctx.config().pairs[0]);
        ctx.cache().set(&key, vec![listing_with_rate(2.0)], Utc::now());
        ctx.history().add_snapshot(&key, &[listing_with_rate(2.0)]);

        let stats = database_stats(&ctx).expect("stats");

        assert_eq!(stats.cache_entries, 1);
        assert_eq!(stats.price_snapshots, 1);
        assert!(!governor_status(&ctx).blocked);
    }
}
