use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use env_logger::Env;
use log::info;
use serde::Serialize;

use exchange_pulse::app::{self, status, AppContext, PairSummary, StreamOptions};
use exchange_pulse::cli::output::{self, StatusReport};
use exchange_pulse::cli::{Cli, Commands};
use exchange_pulse::config::{self, Config};
use exchange_pulse::fetch::HttpTransport;
use exchange_pulse::history::export::write_history_csv;
use exchange_pulse::history::{PriceSnapshot, TrendSummary};
use exchange_pulse::market::PairKey;
use exchange_pulse::Result;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let transport = Arc::new(HttpTransport::new(&config.upstream)?);
    let ctx = Arc::new(AppContext::init(config, transport)?);

    let result = run(&cli, ctx.clone()).await;
    ctx.close()?;
    result
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => config::load_config(path),
        None => {
            let mut config = Config::builtin();
            config::apply_env_overrides(&mut config)?;
            config::validate_config(&config)?;
            Ok(config)
        }
    }
}

async fn run(cli: &Cli, ctx: Arc<AppContext>) -> Result<()> {
    let fetch = ctx.config().fetch.clone();

    match &cli.command {
        Commands::Stream {
            force,
            top_n,
            delay,
        } => {
            let mut options = StreamOptions::from_context(&ctx);
            options.force = *force;
            if let Some(top_n) = top_n {
                options.top_n = *top_n;
            }
            if let Some(delay) = delay {
                options.delay = Duration::from_secs_f64(delay.max(0.0));
            }
            stream(cli, ctx.clone(), options).await?;
        }
        Commands::Refresh { top_n, concurrency } => {
            let summaries = app::refresh_all(
                &ctx,
                top_n.unwrap_or(fetch.default_top_n),
                concurrency.unwrap_or(fetch.concurrency),
            )
            .await;
            print_summaries(cli, &summaries)?;
        }
        Commands::RefreshOne { index, top_n } => {
            let summary =
                app::refresh_pair(&ctx, *index, top_n.unwrap_or(fetch.default_top_n), true)
                    .await?;
            print_summaries(cli, std::slice::from_ref(&summary))?;
        }
        Commands::Cached { top_n } => {
            let summaries = app::latest_cached(&ctx, top_n.unwrap_or(fetch.default_top_n));
            print_summaries(cli, &summaries)?;
        }
        Commands::History {
            have,
            want,
            max_points,
            csv,
        } => {
            let key = PairKey::new(ctx.config().market.as_str(), have.as_str(), want.as_str());
            let history = ctx.history().get_history(&key, *max_points);
            let trend = ctx.history().get_trend(&key);

            if let Some(path) = csv {
                write_history_csv(path, &history)?;
                info!("Wrote {} snapshots to {}", history.len(), path.display());
            }

            if cli.json {
                output::print_json(&HistoryReport {
                    market: &key.market,
                    have,
                    want,
                    history: &history,
                    trend: &trend,
                })?;
            } else {
                println!("{}", output::history_table(&history));
                println!("{}", output::trend_report(&trend));
            }
        }
        Commands::Status => {
            let governor = status::governor_status(&ctx);
            let cache = status::cache_status(&ctx);
            let database = status::database_stats(&ctx)?;
            let report = StatusReport {
                governor: &governor,
                cache: &cache,
                database: &database,
            };
            if cli.json {
                output::print_json(&report)?;
            } else {
                println!("{}", output::status_report(&report));
            }
        }
        Commands::ClearHistory { durable } => {
            ctx.history().clear_all();
            if *durable {
                let removed = ctx.store().clear_snapshots()?;
                info!("Deleted {removed} persisted snapshots");
            }
        }
    }

    Ok(())
}

async fn stream(cli: &Cli, ctx: Arc<AppContext>, options: StreamOptions) -> Result<()> {
    let mut rx = app::stream_pairs(ctx, options);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            summary = rx.recv() => match summary {
                Some(summary) if cli.json => output::print_json(&summary)?,
                Some(summary) => println!("{}", output::summary_line(&summary, Utc::now())),
                None => break,
            },
            _ = &mut ctrl_c => {
                info!("Interrupted, stopping stream");
                break;
            }
        }
    }

    Ok(())
}

fn print_summaries(cli: &Cli, summaries: &[PairSummary]) -> Result<()> {
    if cli.json {
        for summary in summaries {
            output::print_json(summary)?;
        }
    } else {
        println!("{}", output::summaries_table(summaries, Utc::now()));
    }
    Ok(())
}

#[derive(Serialize)]
struct HistoryReport<'a> {
    market: &'a str,
    have: &'a str,
    want: &'a str,
    history: &'a [PriceSnapshot],
    trend: &'a TrendSummary,
}
