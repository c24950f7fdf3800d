//! Tillsync CLI
//!
//! Command-line tools for JSON snapshots of a till's local dataset.
//!
//! # Commands
//!
//! - `status` - Show pending, failed and exhausted records per entity type
//! - `sweep` - Sync a snapshot against the in-process reference backend

mod commands;
mod snapshot;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Tillsync snapshot tools.
#[derive(Parser)]
#[command(name = "tillsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the snapshot file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the sync state of every entity type
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run one sweep of the snapshot and write the results back
    Sweep {
        /// Seller the records belong to
        #[arg(short, long)]
        seller: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Status { format } => {
            let path = cli.path.ok_or("Snapshot path required for status")?;
            commands::status::run(&path, &format)?;
        }
        Commands::Sweep { seller, format } => {
            let path = cli.path.ok_or("Snapshot path required for sweep")?;
            commands::sweep::run(&path, &seller, &format)?;
        }
        Commands::Version => {
            println!("Tillsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
