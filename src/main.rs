pub mod types;
pub mod config;
pub mod error;
pub mod data;
pub mod processing;
pub mod output;
pub mod paths;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "config.toml";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge prison statistics into the world boundaries GeoJSON
    Merge {
        /// Config file; built-in defaults are used when the default file is absent
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Make asset paths in the built index.html relative
    FixPaths {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

fn load_config(config: Option<&Path>) -> anyhow::Result<config::AppConfig> {
    match config {
        Some(path) => config::AppConfig::load_or_default(path, true),
        None => config::AppConfig::load_or_default(Path::new(DEFAULT_CONFIG), false),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Merge { config } => {
            let app_config = load_config(config.as_deref())?;

            // 1. Load Data
            let (records, mut boundaries) = data::load_data(&app_config)?;

            // 2. Join, number and filter
            let stats = processing::process_data(&app_config, &records, &mut boundaries.collection);
            if stats.unused_records > 0 {
                tracing::warn!("{} prison records matched no territory", stats.unused_records);
            }

            // 3. Write
            output::write_collection(&app_config.output.geometry, &boundaries)
                .with_context(|| "Failed to write merged GeoJSON")?;

            info!("Merge complete!");
        }
        Commands::FixPaths { config } => {
            let app_config = load_config(config.as_deref())?;
            paths::fix_paths(&app_config.paths)?;
        }
    }

    Ok(())
}
