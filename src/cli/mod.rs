use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod output;

#[derive(Parser)]
#[command(name = "exchange-pulse")]
#[command(about = "Rate-limit aware currency exchange watcher with cached listings and price history")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// JSON config file; builtin defaults are used when omitted
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit one JSON document per line instead of tables
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Refresh pairs one by one, printing each as it arrives
    Stream {
        /// Bypass the cache for every pair
        #[arg(short, long)]
        force: bool,

        #[arg(short = 'n', long)]
        top_n: Option<usize>,

        /// Seconds to pause after each upstream fetch
        #[arg(short, long)]
        delay: Option<f64>,
    },

    /// Refresh all pairs concurrently, serving cached pairs from the cache
    Refresh {
        #[arg(short = 'n', long)]
        top_n: Option<usize>,

        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Force a fresh fetch of one configured pair
    RefreshOne {
        /// Position of the pair in the config
        #[arg(short, long)]
        index: usize,

        #[arg(short = 'n', long)]
        top_n: Option<usize>,
    },

    /// Show what the cache holds without calling upstream
    Cached {
        #[arg(short = 'n', long)]
        top_n: Option<usize>,
    },

    /// Show recorded price history and trend for a pair
    History {
        #[arg(long)]
        have: String,

        #[arg(long)]
        want: String,

        #[arg(short, long)]
        max_points: Option<usize>,

        /// Also write the history to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Show governor, cache and database state
    Status,

    /// Drop recorded price history
    ClearHistory {
        /// Delete persisted snapshots as well
        #[arg(long)]
        durable: bool,
    },
}
