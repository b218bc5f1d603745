// SPDX-License-Identifier: GPL-3.0-only

use camrec::config::Settings;
use camrec::constants::defaults;
use clap::{Parser, Subcommand};
use std::path::Path;

mod cli;

#[derive(Parser)]
#[command(name = "camrec")]
#[command(about = "Camera preview and recording")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    #[command(flatten)]
    overrides: cli::Overrides,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Preview the camera until Ctrl+C
    Preview {
        /// Stop after this many seconds
        #[arg(short, long)]
        seconds: Option<u64>,
    },

    /// Record a video into the output directory
    Record {
        /// Recording duration in seconds
        #[arg(short, long, default_value = "10")]
        duration: u64,
    },

    /// Print the resolved configuration as JSON
    Config,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camrec=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let settings = cli
        .overrides
        .apply(Settings::from_env_with_file(Path::new(defaults::ENV_FILE)));

    match cli.command {
        Commands::Preview { seconds } => cli::preview(settings, seconds),
        Commands::Record { duration } => cli::record(settings, duration),
        Commands::Config => cli::print_config(&settings),
    }
}
