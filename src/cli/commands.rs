//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: the generation loop (default)
//! - scan: catalog and metadata counts per type
//! - usage: ranked usage counts for a category

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use genloop::domain::Category;

/// Genloop - weighted checkpoint/lora selection for batch generation
#[derive(Parser, Debug)]
#[command(name = "genloop")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log to stderr instead of the log file
    #[arg(long, global = true)]
    pub log_stderr: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
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
    /// Run the generation loop
    Run {
        /// Stop after one batch
        #[arg(short, long)]
        test: bool,

        /// Seed the random source for a reproducible run
        #[arg(short, long)]
        seed: Option<u64>,
    },

    /// Scan assets and metadata and print counts per type
    Scan,

    /// Show usage counts, most used first
    Usage {
        /// Category: checkpoint, character (char) or etc (lora)
        category: Category,

        /// Show at most this many rows
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
}
