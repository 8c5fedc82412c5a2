//! CLI argument parsing using clap derive API
//!
//! Purely declarative; no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Default configuration file; a missing default file falls back to defaults.
pub const DEFAULT_CONFIG_PATH: &str = "flowtest.toml";

/// flowtest -- end-to-end workflow scenario runner.
///
/// Use `flowtest <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "flowtest", version, about, long_about = None)]
pub struct Cli {
    /// Path to the flowtest.toml configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scenario suite against the current cluster.
    Run(RunArgs),

    /// List the scenarios that would run.
    List(ListArgs),
}

// ---- run ----

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Only run cases carrying this label (repeatable; all must match).
    #[arg(short, long = "label")]
    pub labels: Vec<String>,

    /// Only run cases whose name contains this text (case-insensitive).
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Maximum number of non-serialized cases in flight.
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    pub parallel: u16,

    /// Run even if a developer has reserved the system.
    #[arg(long)]
    pub ignore_reservation: bool,

    /// Expose a Prometheus endpoint while the suite runs.
    #[arg(long)]
    pub metrics: bool,
}

// ---- list ----

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only list cases carrying this label (repeatable; all must match).
    #[arg(short, long = "label")]
    pub labels: Vec<String>,
}
