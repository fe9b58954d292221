//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Throttled, resumable bulk reingest of archived packages.
///
/// Each invocation is one pass: schedule it (e.g. from cron) until the
/// status command shows nothing left to do.
#[derive(Parser, Debug)]
#[command(name = "reingestor")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file
    #[arg(short, long, env = "REINGESTOR_CONFIG", default_value = "reingest.toml")]
    pub config: PathBuf,

    /// Log level, overriding `logging.level` (error, warn, info, debug, trace)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List compressed packages in storage (read-only)
    ListCompressed {
        /// Only packages that originated from this pipeline
        #[arg(long)]
        origin_pipeline: Option<String>,
    },

    /// Compare a package list with the compressed packages in storage
    Compare {
        /// JSON array of package UUIDs
        list_file: PathBuf,

        /// Only packages that originated from this pipeline
        #[arg(long)]
        origin_pipeline: Option<String>,
    },

    /// Run one reingest pass over the packages in a list file
    ProcessList {
        /// JSON array of package UUIDs
        list_file: PathBuf,
    },

    /// Run one reingest pass over the compressed packages in storage
    ProcessStorage {
        /// Only packages that originated from this pipeline
        #[arg(long)]
        origin_pipeline: Option<String>,
    },

    /// Print every reingest record without contacting any service
    Status {
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },
}
