//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Cat scale event pipeline.
///
/// Turns raw scale readings into weighing events and labels each event with
/// the cat that most likely caused it.
#[derive(Debug, Parser)]
#[command(name = "catscale", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Store readings (JSONL on stdin) and run the pipeline on them.
    Ingest,

    /// Process a batch of change notifications (JSON on stdin).
    Process {
        /// Which table the notifications come from.
        #[arg(value_enum)]
        stage: Stage,
    },

    /// Classify the stored event at a timestamp.
    Classify {
        /// Event timestamp in milliseconds since the epoch.
        #[arg(long)]
        timestamp: i64,

        /// Print the label without storing it.
        #[arg(long)]
        dry_run: bool,
    },

    /// List stored events for a UTC date.
    Events {
        /// Date partition (YYYY.MM.DD); defaults to today (UTC).
        #[arg(long)]
        date: Option<String>,

        /// Output as JSONL.
        #[arg(long)]
        json: bool,
    },

    /// Manage cat definitions.
    #[command(subcommand)]
    Cats(CatsAction),

    /// Show database status.
    Status,
}

/// Notification source for `process`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Stage {
    /// Raw reading changes; zero readings produce events.
    Readings,
    /// Event changes; unlabeled events get classified.
    Events,
}

/// Cat definition subcommands.
#[derive(Debug, Subcommand)]
pub enum CatsAction {
    /// Define a cat's weight from a point in time onwards.
    SetWeight {
        /// Cat name.
        #[arg(long)]
        name: String,

        /// Weight in scale units.
        #[arg(long)]
        weight: String,

        /// When the weight takes effect: RFC 3339, epoch milliseconds, or
        /// relative (e.g. "2 days ago"). Defaults to now.
        #[arg(long)]
        at: Option<String>,
    },

    /// List defined cats and their weights.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}
