//! CLI module for reconcilr - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for batch runs, single-value
//! reconciliation and date parsing.

pub mod commands;

pub use commands::Cli;
