use std::io::{self, Write};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app::status::CacheSummary;
use crate::app::{PairStatus, PairSummary};
use crate::error::Result;
use crate::governor::GovernorStatus;
use crate::history::{PriceSnapshot, TrendDirection, TrendSummary};
use crate::store::DatabaseStats;
use crate::utils::{format_age, format_local, format_rate, render_table, sparkline_glyphs};

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut out = io::stdout().lock();
    serde_json::to_writer(&mut out, value)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

fn optional_rate(rate: Option<f64>) -> String {
    rate.map(format_rate).unwrap_or_else(|| "-".to_string())
}

fn trend_cell(trend: Option<&TrendSummary>) -> String {
    match trend {
        Some(trend) if trend.data_points > 1 => {
            let arrow = match trend.direction {
                TrendDirection::Up => "↑",
                TrendDirection::Down => "↓",
                TrendDirection::Neutral => "→",
            };
            format!("{arrow} {:+.2}%", trend.change_percent)
        }
        _ => "-".to_string(),
    }
}

fn source_cell(summary: &PairSummary, now: DateTime<Utc>) -> String {
    match (summary.status, summary.fetched_at) {
        (PairStatus::RateLimited, _) => format!(
            "wait {:.0}s",
            summary.rate_limit_remaining.unwrap_or_default()
        ),
        (PairStatus::Ok, Some(at)) if summary.was_cached => format!("cache {}", format_age(at, now)),
        (PairStatus::Ok, Some(_)) => "fresh".to_string(),
        _ => "-".to_string(),
    }
}

fn margin_cell(summary: &PairSummary) -> String {
    match (summary.linked_pair_index, summary.profit_margin_pct) {
        (Some(linked), Some(pct)) => format!("{pct:+.2}% ⇄ #{linked}"),
        _ => String::new(),
    }
}

pub fn summaries_table(summaries: &[PairSummary], now: DateTime<Utc>) -> String {
    let rows: Vec<Vec<String>> = summaries
        .iter()
        .map(|summary| {
            let hot = if summary.hot { "*" } else { "" };
            vec![
                format!("{}{}", summary.index, hot),
                format!("{} → {}", summary.have, summary.want),
                summary.status.label().to_string(),
                optional_rate(summary.best_rate),
                optional_rate(summary.median_rate),
                summary.count_returned.to_string(),
                trend_cell(summary.trend.as_ref()),
                summary
                    .trend
                    .as_ref()
                    .map(|trend| sparkline_glyphs(&trend.sparkline))
                    .unwrap_or_default(),
                source_cell(summary, now),
                margin_cell(summary),
            ]
        })
        .collect();

    render_table(
        &[
            "#", "Pair", "Status", "Best", "Median", "Count", "Trend", "Spark", "Source", "Margin",
        ],
        &rows,
    )
}

/// One line per streamed pair.
pub fn summary_line(summary: &PairSummary, now: DateTime<Utc>) -> String {
    let mut line = format!(
        "[{}] {} → {}  {}",
        summary.index,
        summary.have,
        summary.want,
        summary.status.label()
    );
    if summary.status == PairStatus::Ok {
        line.push_str(&format!(
            "  best {}  median {}  ({} listings, {})",
            optional_rate(summary.best_rate),
            optional_rate(summary.median_rate),
            summary.count_returned,
            source_cell(summary, now)
        ));
        let trend = trend_cell(summary.trend.as_ref());
        if trend != "-" {
            line.push_str(&format!("  {trend}"));
        }
    } else if summary.status == PairStatus::RateLimited {
        line.push_str(&format!("  ({})", source_cell(summary, now)));
    }
    line
}

pub fn history_table(snapshots: &[PriceSnapshot]) -> String {
    let rows: Vec<Vec<String>> = snapshots
        .iter()
        .map(|snap| {
            vec![
                format_local(snap.timestamp),
                format_rate(snap.best_rate),
                format_rate(snap.avg_rate),
                format_rate(snap.median_rate),
                snap.listing_count.to_string(),
            ]
        })
        .collect();
    render_table(&["Time", "Best", "Average", "Median", "Count"], &rows)
}

pub fn trend_report(trend: &TrendSummary) -> String {
    let direction = match trend.direction {
        TrendDirection::Up => "up",
        TrendDirection::Down => "down",
        TrendDirection::Neutral => "neutral",
    };
    format!(
        "trend {direction} {:+.2}% over {} points  low {}  high {}  latest {}\n{}",
        trend.change_percent,
        trend.data_points,
        optional_rate(trend.lowest_median),
        optional_rate(trend.highest_median),
        optional_rate(trend.latest_median),
        sparkline_glyphs(&trend.sparkline)
    )
}

#[derive(Serialize)]
pub struct StatusReport<'a> {
    pub governor: &'a GovernorStatus,
    pub cache: &'a CacheSummary,
    pub database: &'a DatabaseStats,
}

pub fn status_report(report: &StatusReport<'_>) -> String {
    let mut out = String::new();

    let governor = report.governor;
    out.push_str(&format!(
        "governor: {}  block {:.1}s  soft {:.1}s\n",
        if governor.blocked { "BLOCKED" } else { "open" },
        governor.block_remaining,
        governor.soft_remaining
    ));
    for (rule, states) in &governor.rules {
        let triples: Vec<String> = states
            .iter()
            .map(|state| format!("{}:{}:{}", state.current, state.limit, state.reset_secs))
            .collect();
        out.push_str(&format!("  {rule}: {}\n", triples.join(", ")));
    }

    let cache = report.cache;
    out.push_str(&format!("cache ({}, ttl {}s):\n", cache.market, cache.ttl_secs));
    let rows: Vec<Vec<String>> = cache
        .pairs
        .iter()
        .map(|pair| {
            vec![
                pair.index.to_string(),
                format!("{} → {}", pair.have, pair.want),
                if !pair.cached {
                    "missing".to_string()
                } else if pair.expired {
                    "expired".to_string()
                } else {
                    "live".to_string()
                },
                format!("{:.1}s", pair.seconds_remaining),
            ]
        })
        .collect();
    out.push_str(&render_table(&["#", "Pair", "State", "Remaining"], &rows));
    out.push('\n');

    let history = &cache.history;
    out.push_str(&format!(
        "history: {} snapshots across {} pairs\n",
        history.total_snapshots, history.tracked_pairs
    ));

    let database = report.database;
    out.push_str(&format!(
        "database: {} ({} bytes)  {} cache rows  {} snapshots",
        database.database_file.as_deref().unwrap_or("in-memory"),
        database.database_size_bytes,
        database.cache_entries,
        database.price_snapshots
    ));
    if let (Some(oldest), Some(newest)) = (database.oldest_snapshot, database.newest_snapshot) {
        out.push_str(&format!(
            "  from {} to {}",
            format_local(oldest),
            format_local(newest)
        ));
    }
    out
}
