//! CLI module for vidqueue - command-line interface and subcommands.
//!
//! `run` hosts the queue engine in the foreground; every other subcommand edits
//! the persisted queue and settings documents directly.

pub mod commands;

pub use commands::Cli;
