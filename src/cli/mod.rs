//! CLI argument definitions for Cato.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::ConfigOverrides;
use crate::models::ViewMode;

/// Version string with the short git commit the binary was built from.
pub const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CATO_GIT_COMMIT"), ")");

/// `--version` output, adding the build time.
pub const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("CATO_GIT_COMMIT"),
    ", built ",
    env!("CATO_BUILD_TIMESTAMP"),
    ")"
);

/// Cato - denormalized snapshots of agent tasks, messages and events.
///
/// Reads a Marcus data root and prints one snapshot as JSON on stdout.
/// Logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "cato")]
#[command(author, version = VERSION, long_version = LONG_VERSION, about = "Build denormalized snapshots of agent task data", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Marcus data root. Can also be set via CATO_DATA_ROOT.
    #[arg(short = 'D', long = "data-root", global = true)]
    pub data_root: Option<PathBuf>,

    /// Config file, taking precedence over <data-root>/cato.kdl and the user config
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter (e.g. "info", "cato=debug"). Defaults to RUST_LOG, then "warn".
    #[arg(long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// Log line format on stderr
    #[arg(long = "log-format", global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Max numeric distance for fuzzy project matching
    #[arg(long, global = true)]
    pub fuzzy_tolerance: Option<i64>,

    /// Project-list cache lifetime in seconds (0 disables)
    #[arg(long, global = true)]
    pub project_cache_ttl: Option<u64>,

    /// Seconds within which repeated messages count as duplicates
    #[arg(long, global = true)]
    pub duplicate_window: Option<f64>,

    /// Dependents at which an unfinished task is reported as a bottleneck
    #[arg(long, global = true)]
    pub bottleneck_threshold: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Settings given on the command line.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            data_root: self.data_root.clone(),
            fuzzy_tolerance: self.fuzzy_tolerance,
            timeline_exponent: match self.command {
                Commands::Snapshot { exponent, .. } => exponent,
                Commands::Projects => None,
            },
            project_cache_ttl: self.project_cache_ttl,
            duplicate_window: self.duplicate_window,
            bottleneck_threshold: self.bottleneck_threshold,
            config_path: self.config.clone(),
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build one snapshot and print it
    Snapshot {
        /// Restrict to one project id
        #[arg(short, long)]
        project: Option<String>,

        /// Which tasks to show: subtasks, parents or all
        #[arg(long, default_value = "subtasks")]
        view: ViewMode,

        /// Timeline power-scale exponent (> 0)
        #[arg(long)]
        exponent: Option<f64>,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// List projects that own at least one task, most recent first
    Projects,
}
