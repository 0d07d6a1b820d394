//! Terrastat command-line entry point
//!
//! Runs single pipeline tasks once (skip-check, then run) and administers
//! project schemas. Deciding which (project, date) pairs to run is left to
//! whatever schedules this binary.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use terrastat_logging::LogConfig;

mod cli;

#[derive(Parser, Debug)]
#[command(name = "terrastat", version, about = "Environmental raster pipeline tasks")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Configuration file (default: $TERRASTAT_HOME/config.toml)
    #[arg(short = 'c', long, global = true, env = "TERRASTAT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Composite and reproject the 8-day ETo window starting at a date
    Reproject {
        /// Project name as configured
        #[arg(short, long)]
        project: String,

        /// First day of the window (YYYY-DDD or YYYY-MM-DD)
        #[arg(short, long)]
        date: String,

        /// Run even if a completion marker exists
        #[arg(long)]
        force: bool,
    },

    /// Record zonal statistics of a reprojected raster
    Zonal {
        /// Project name as configured
        #[arg(short, long)]
        project: String,

        /// Date of the reprojected raster (YYYY-DDD or YYYY-MM-DD)
        #[arg(short, long)]
        date: String,

        /// Environmental index
        #[arg(short, long, default_value = "eto")]
        index: String,

        /// Run even if a completion marker exists
        #[arg(long)]
        force: bool,
    },

    /// Project schema administration
    Schema {
        #[command(subcommand)]
        action: cli::schema::SchemaAction,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: cli::config::ConfigAction,
    },
}

async fn run_command(cli: Cli) -> Result<()> {
    let config_path = cli.config.unwrap_or_else(cli::config::default_config_path);

    match cli.command {
        Commands::Reproject {
            project,
            date,
            force,
        } => {
            let config = cli::config::load(&config_path)?;
            cli::task::reproject(&config, &project, &date, force).await
        }
        Commands::Zonal {
            project,
            date,
            index,
            force,
        } => {
            let config = cli::config::load(&config_path)?;
            cli::task::zonal(&config, &project, &date, &index, force).await
        }
        Commands::Schema { action } => {
            let config = cli::config::load(&config_path)?;
            cli::schema::run(&config, action).await
        }
        Commands::Config { action } => cli::config::run(&config_path, action),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = terrastat_logging::init_logging(LogConfig {
        app_name: "terrastat",
        verbose: cli.verbose,
        log_dir: None,
    }) {
        eprintln!("Warning: logging disabled: {:?}", err);
    }

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
        .and_then(|runtime| runtime.block_on(run_command(cli)));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("Error: {:?}", err);
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_reproject() {
        let cli = Cli::try_parse_from([
            "terrastat", "-v", "reproject", "--project", "ga_aea", "--date", "2010-360",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Reproject {
                project,
                date,
                force,
            } => {
                assert_eq!(project, "ga_aea");
                assert_eq!(date, "2010-360");
                assert!(!force);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_schema_recreate_requires_project() {
        assert!(Cli::try_parse_from(["terrastat", "schema", "recreate"]).is_err());
    }
}
