//! Command-line surface: `run`, `validate`, `snapshot`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "healthwatch")]
#[command(version = concat!("Ver:", env!("CARGO_PKG_VERSION")))]
#[command(about = "Periodic fan-out HTTP health-check engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the orchestrator: probe every configured service on its own
    /// schedule until SIGINT/SIGTERM is received.
    Run {
        /// Path to the YAML configuration file.
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,
    },
    /// Parse and validate a configuration file. Exits 0 on success,
    /// non-zero with violations printed to stderr otherwise.
    Validate {
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,
    },
    /// Run one probe cycle against every configured service and write the
    /// resulting snapshot, without starting the long-running scheduler.
    Snapshot {
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
