//! CLI argument definitions using clap derive macros.

use clap::{Parser, Subcommand};

/// Ingest and reconcile hockey game/player data across sources.
#[derive(Parser, Debug)]
#[command(name = "stat-recon")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start ingesting a source for a season.
    Ingest {
        /// Source name, e.g. `nhl_json_boxscore`.
        source: String,
        /// Season id, e.g. `20242025`.
        season: i64,
        /// Re-download items the tracker would otherwise skip as complete.
        #[arg(long)]
        force: bool,
    },
    /// Cancel a running batch.
    Cancel {
        /// Batch id returned by `ingest`.
        batch_id: i64,
    },
    /// List active and recently-finished batches.
    Status,
    /// Run reconciliation for a season, or a single game within it.
    Validate {
        season: i64,
        #[arg(long)]
        game: Option<i64>,
    },
    /// Move a source/season's failed items back to pending.
    ResetFailed { source: String, season: i64 },
}
