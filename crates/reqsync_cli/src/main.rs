//! reqsync CLI
//!
//! Command-line tools for inspecting reqsync ids and backups.
//!
//! # Commands
//!
//! - `mint` - Mint a fresh id for an entity tag
//! - `type-of` - Print the entity type of an id
//! - `inspect` - Print the workspace tree stored in a backup
//! - `cascade` - List what deleting an entity would remove

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// reqsync command-line tools.
#[derive(Parser)]
#[command(name = "reqsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mint a fresh id for a two-letter entity tag (ws, pj, rq, ...)
    Mint {
        /// Entity tag
        tag: String,

        /// Number of ids to mint
        #[arg(short, long, default_value = "1")]
        count: usize,
    },

    /// Print the entity type encoded in an id
    TypeOf {
        /// Entity id
        id: String,
    },

    /// Print the workspace tree stored in a backup file
    Inspect {
        /// Backup file
        backup: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List the entities a delete of `id` would remove
    Cascade {
        /// Backup file
        backup: PathBuf,

        /// Root entity id
        id: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Mint { tag, count } => commands::ids::mint(&tag, count)?,
        Commands::TypeOf { id } => commands::ids::type_of(&id)?,
        Commands::Inspect { backup, format } => commands::inspect::run(&backup, &format)?,
        Commands::Cascade { backup, id } => commands::cascade::run(&backup, &id)?,
        Commands::Version => {
            println!("reqsync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("reqsync model v{}", reqsync_core::MODEL_VERSION);
        }
    }

    Ok(())
}
