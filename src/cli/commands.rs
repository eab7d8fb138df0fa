//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: host the queue engine until Ctrl-C
//! - add / import: enqueue jobs
//! - list / retry / clear-done: inspect and manage jobs
//! - pause / concurrency / settings: admission and settings

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Vidqueue - a persistent queue for long-running video generation jobs
#[derive(Parser, Debug)]
#[command(name = "vidqueue")]
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

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the queue in the foreground until Ctrl-C
    Run {
        /// Import prompt files dropped into this directory
        #[arg(short, long)]
        watch: Option<PathBuf>,

        /// Don't call start; keep the persisted concurrency limit
        #[arg(long)]
        no_start: bool,

        /// Exit once nothing is queued or running
        #[arg(long)]
        until_idle: bool,
    },

    /// Add a single job
    Add {
        /// Text prompt for the video
        prompt: String,

        /// Things the video should avoid
        #[arg(short, long)]
        negative_prompt: Option<String>,

        /// Generation seed
        #[arg(short, long)]
        seed: Option<u32>,

        /// Person generation mode (e.g. allow_all, allow_adult, dont_allow)
        #[arg(short, long)]
        person_generation: Option<String>,
    },

    /// Import prompts from a .txt, .yml/.yaml, .json or .csv file
    Import {
        /// File to import
        file: PathBuf,
    },

    /// List jobs
    List {
        /// Filter by status (queued, running, done, error)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Move a failed job back to the queue
    Retry {
        /// Job ID to retry
        id: String,
    },

    /// Remove all finished jobs
    ClearDone,

    /// Stop dispatching new jobs (running jobs finish)
    Pause,

    /// Set the concurrency limit (0-8)
    Concurrency {
        /// New limit; 0 pauses the queue
        n: u32,
    },

    /// Show or update settings
    Settings {
        /// API key (empty string clears it)
        #[arg(long)]
        api_key: Option<String>,

        /// Where finished videos are saved
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Directory watched by `run` (empty string clears it)
        #[arg(long)]
        watch_dir: Option<String>,

        /// Default person generation mode for new jobs
        #[arg(long)]
        person_generation: Option<String>,

        /// Max dispatches per session
        #[arg(long)]
        cost_cap: Option<u32>,
    },
}
