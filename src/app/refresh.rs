use std::sync::Arc;

use futures::stream::{self, StreamExt};
use log::{debug, error, info};

use crate::error::{AppError, Result};
use crate::market::TradePair;

use super::summary::{link_reverse_pairs, PairStatus, PairSummary};
use super::AppContext;

/// Refresh the configured pair at `index`.
pub async fn refresh_pair(
    ctx: &AppContext,
    index: usize,
    top_n: usize,
    force: bool,
) -> Result<PairSummary> {
    let trade = ctx
        .config()
        .pairs
        .get(index)
        .ok_or_else(|| AppError::message(format!("trade pair {index} not found")))?;
    Ok(refresh_trade(ctx, index, trade, top_n, force).await)
}

/// Refresh every configured pair with at most `concurrency` in flight. Results come back in
/// configuration order with reverse pairs linked.
pub async fn refresh_all(ctx: &AppContext, top_n: usize, concurrency: usize) -> Vec<PairSummary> {
    let mut summaries: Vec<PairSummary> = stream::iter(ctx.config().pairs.iter().enumerate())
        .map(|(index, trade)| refresh_trade(ctx, index, trade, top_n, false))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    summaries.sort_by_key(|summary| summary.index);
    link_reverse_pairs(&mut summaries);

    let ok = summaries
        .iter()
        .filter(|summary| summary.status == PairStatus::Ok)
        .count();
    info!("Refreshed {ok}/{} pairs", summaries.len());
    summaries
}

/// One pair's outcome. Cache hits skip the governor entirely; only fresh upstream results
/// become history snapshots.
pub(crate) async fn refresh_trade(
    ctx: &AppContext,
    index: usize,
    trade: &TradePair,
    top_n: usize,
    force: bool,
) -> PairSummary {
    let key = ctx.config().pair_key(trade);
    let cached = !force && ctx.cache().get(&key).is_some();

    if !cached && ctx.governor().blocked() {
        let remaining = ctx.governor().block_remaining().as_secs_f64();
        debug!("Skipping {key}: rate limited for {remaining:.1}s");
        return PairSummary::rate_limited(index, trade, remaining);
    }

    let outcome = if force {
        ctx.fetcher().fetch_forced(&key, top_n).await
    } else {
        ctx.fetcher().fetch_with_cache(&key, top_n).await
    };

    let Some(outcome) = outcome else {
        return PairSummary::failed(index, trade, PairStatus::Error);
    };

    if !outcome.was_cached {
        let history = Arc::clone(&ctx.history);
        let snapshot_key = key.clone();
        let listings = outcome.listings.clone();
        let write = tokio::task::spawn_blocking(move || {
            history.add_snapshot(&snapshot_key, &listings);
        });
        if let Err(err) = write.await {
            error!("Snapshot write for {key} did not complete: {err}");
        }
    }

    PairSummary::with_listings(
        index,
        trade,
        outcome.listings,
        outcome.was_cached,
        outcome.fetched_at,
        ctx.history().get_trend(&key),
    )
}
