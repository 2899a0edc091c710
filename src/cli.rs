use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "serp-rank-tracker",
    version,
    about = "Submit, poll and extract SERP ranking checks"
)]
pub struct Cli {
    /// Directory holding phase artifacts and the audit log (overrides DATA_DIR).
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Directory holding the input tables (overrides INPUT_DIR).
    #[arg(long, global = true)]
    pub input_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Join the input tables into the preflight artifact.
    Preflight,
    /// Submit one task per preflight keyword.
    Takeoff,
    /// Poll submitted tasks and extract rankings, resuming from any checkpoint.
    Landing,
    /// Preflight, takeoff, settle wait, then landing.
    Run,
    /// Export the landing artifact as CSV.
    Report {
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Store provider credentials in the OS keychain.
    Credentials {
        #[arg(long)]
        login: String,
        #[arg(long)]
        password: String,
    },
    /// Print the effective configuration with secrets redacted.
    Config,
}
