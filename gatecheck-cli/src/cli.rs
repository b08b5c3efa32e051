//! Command-line interface definition

use clap::Parser;
use std::path::PathBuf;

/// Correctness-and-load benchmarker for a ticket-reservation service
#[derive(Debug, Parser)]
#[command(name = "gatecheck", version)]
pub struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Initial-state dataset (JSON); the built-in sample is used when omitted
    #[arg(short, long)]
    pub dataset: Option<PathBuf>,

    /// Base URL of the service under test (overrides the config)
    #[arg(long)]
    pub target: Option<String>,

    /// Benchmark duration in seconds (overrides the config)
    #[arg(long)]
    pub duration: Option<u64>,

    /// Number of concurrent scenario workers (overrides the config)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Seed for the randomness source, for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,
}
