//! CLI definitions and entry point.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// Results tree builder for browser-test visual reports
#[derive(Parser, Debug)]
#[command(name = "rtree", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Report directory (default: html-report)
    #[arg(long, global = true)]
    pub report_dir: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the report tree from formatted results and persist it
    Build(BuildArgs),

    /// Merge shard report databases into one report
    Merge(MergeArgs),

    /// Print the report tree
    Show(ShowArgs),

    /// Print report statistics
    Stats(StatsArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// Formatted results, one JSON object per line ("-" for stdin)
    #[arg(long, short)]
    pub input: PathBuf,

    /// Start fresh instead of reusing the persisted tree
    #[arg(long)]
    pub no_reuse: bool,

    /// Keep the tree sorted after every insert
    #[arg(long)]
    pub sort_on_insert: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct MergeArgs {
    /// Destination report directory
    #[arg(long)]
    pub dest: PathBuf,

    /// Source databases, merged in the given order
    #[arg(required = true)]
    pub sources: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ShowArgs {
    /// Only print the suite chain and images of this result
    #[arg(long)]
    pub result: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct StatsArgs {
    /// Break counters down by browser and version
    #[arg(long)]
    pub by_browser: bool,
}
