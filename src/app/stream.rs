use std::sync::Arc;
use std::time::Duration;

use log::info;
use tokio::sync::mpsc;

use super::refresh::refresh_trade;
use super::summary::PairSummary;
use super::AppContext;

#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub top_n: usize,
    /// Pause after each pair that needed an upstream call.
    pub delay: Duration,
    pub force: bool,
}

impl StreamOptions {
    pub fn from_context(ctx: &AppContext) -> Self {
        let fetch = &ctx.config().fetch;
        Self {
            top_n: fetch.default_top_n,
            delay: Duration::from_secs_f64(fetch.stream_delay_secs),
            force: false,
        }
    }
}

/// Refresh pairs one at a time, delivering each summary as soon as it is ready.
///
/// Dropping the receiver stops the stream before the next pair is fetched.
pub fn stream_pairs(ctx: Arc<AppContext>, options: StreamOptions) -> mpsc::Receiver<PairSummary> {
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        let total = ctx.config().pairs.len();
        for (index, trade) in ctx.config().pairs.iter().enumerate() {
            if tx.is_closed() {
                info!("Stream consumer went away after {index}/{total} pairs");
                return;
            }

            let summary =
                refresh_trade(&ctx, index, trade, options.top_n, options.force).await;
            let pause = !summary.was_cached && !options.delay.is_zero() && index + 1 < total;

            if tx.send(summary).await.is_err() {
                info!("Stream consumer went away after {}/{total} pairs", index + 1);
                return;
            }

            if pause {
                tokio::select! {
                    _ = tokio::time::sleep(options.delay) => {}
                    _ = tx.closed() => {
                        info!("Stream consumer went away after {}/{total} pairs", index + 1);
                        return;
                    }
                }
            }
        }
    });

    rx
}
