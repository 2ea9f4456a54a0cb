//! sigstore-conformance - Sigstore client conformance suite
//!
//! Drives a Sigstore client's command-line interface through the
//! conformance scenarios and reports which expectations it meets.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;
mod suite;

/// sigstore-conformance - Sigstore client conformance suite
#[derive(Parser, Debug)]
#[command(name = "sigstore-conformance")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the suite against a client
    Run(commands::run::RunArgs),

    /// List every case id
    #[command(alias = "ls")]
    List(commands::list::ListArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Run(args) => {
            // Failing cases are not errors: they map to exit code 1 after the
            // report is written.
            let exit_code = commands::run::run(cli.config.as_deref(), &args)?;
            std::process::exit(exit_code);
        },
        Commands::List(args) => commands::list::list(&args),
    }
}
