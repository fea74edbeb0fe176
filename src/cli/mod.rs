//! CLI definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// cvstore - inspect and maintain saved CV Builder drafts
#[derive(Parser, Debug)]
#[command(name = "cvstore", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.cvstore/data/cvstore.db)
    #[arg(long, global = true, env = "CVSTORE_DB")]
    pub db: Option<PathBuf>,

    /// Storage namespace (overrides the config file)
    #[arg(long, global = true)]
    pub namespace: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Save a snapshot read from a JSON file (or stdin)
    Save {
        /// Snapshot file; reads stdin when omitted or `-`
        file: Option<PathBuf>,
    },

    /// Print the stored snapshot, migrating legacy records
    Load,

    /// Remove the stored snapshot
    Clear,

    /// Evict stale and transient entries from the namespace
    Cleanup {
        /// Maximum age of timestamped entries, in days
        #[arg(long)]
        max_age_days: Option<u32>,
    },

    /// Export the stored snapshot
    Export {
        /// Output format (json, txt)
        #[arg(long, short, default_value = "json")]
        format: String,

        /// Directory to write into (default: current directory)
        #[arg(long, short)]
        out: Option<PathBuf>,
    },

    /// Import a JSON or text export and save it
    Import {
        /// File to import
        file: PathBuf,

        /// Format (json, txt); guessed from the extension when omitted
        #[arg(long, short)]
        format: Option<String>,
    },

    /// Write a versioned backup of the stored snapshot
    Backup {
        /// Directory to write into (default: current directory)
        #[arg(long, short)]
        out: Option<PathBuf>,
    },

    /// Restore a backup file
    Restore {
        /// Backup file
        file: PathBuf,
    },

    /// Show storage usage
    Stats,

    /// Validate the stored snapshot
    Validate,

    /// Watch the store for external changes, optionally auto-saving a file
    Watch {
        /// Snapshot file to auto-save on every tick
        #[arg(long)]
        file: Option<PathBuf>,

        /// Tick interval in milliseconds (default: config autoSaveIntervalMs)
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Stop after this many ticks (default: run until interrupted)
        #[arg(long)]
        ticks: Option<u64>,
    },

    /// Print version information
    Version,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}
