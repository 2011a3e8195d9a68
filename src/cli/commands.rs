//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - batch: reconcile a jobs file end to end
//! - one: reconcile a single value interactively
//! - parse-date: show how a value resolves as a date

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use reconcilr::batch::BatchMode;

/// Reconcilr - match raw field values against a knowledge base
#[derive(Parser, Debug)]
#[command(name = "reconcilr")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Window sizing for a batch run
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    /// Whole dataset, 3 lookups per window
    Auto,
    /// Single column, 5 lookups per window
    Column,
}

impl From<ModeArg> for BatchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Auto => BatchMode::AutoAccept,
            ModeArg::Column => BatchMode::Column,
        }
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reconcile every job in a JSON jobs file
    Batch {
        /// JSON array of {item_id, property_id, value_index, raw_value}
        #[arg(short, long)]
        jobs: PathBuf,

        /// JSON property profiles (constraints and lookup hints)
        #[arg(short, long)]
        profiles: Option<PathBuf>,

        /// Window sizing
        #[arg(short, long, value_enum, default_value_t = ModeArg::Auto)]
        mode: ModeArg,

        /// Cell snapshot (JSONL); resumed from when it exists
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Reconcile one value and list its candidates
    One {
        /// Raw value to reconcile
        value: String,

        /// Property the value belongs to
        #[arg(short = 'P', long)]
        property: String,

        /// JSON property profiles (constraints and lookup hints)
        #[arg(short, long)]
        profiles: Option<PathBuf>,

        /// Give up after this many seconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Show how a value parses as a date
    ParseDate {
        /// Raw value, e.g. "1990s" or "17 May 2020"
        value: String,
    },
}
