//! Causal Trace CLI
//!
//! Imports per-process trace logs, reconstructs the causal event graph and
//! writes a summary of the stepped partitions.

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;

use causal_trace_engine::commands::{
    display_version, execute_import, validate_args, validate_summary_file, ImportArgs,
};

/// Causal Trace - causal stepping for parallel trace logs
#[derive(Parser, Debug)]
#[command(name = "causal-trace")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Import a trace and step its partitions
    Import {
        /// Path to the .sts metadata file; logs are read from <base>.<pe>.log beside it
        #[arg(short, long)]
        sts: PathBuf,

        /// Output path for the JSON summary
        #[arg(short, long, default_value = "summary.json")]
        output: PathBuf,

        /// Import options file (TOML)
        #[arg(long)]
        options: Option<PathBuf>,

        /// Exclude partitions separated by collectives from mergable sets
        #[arg(long)]
        consider_collectives: bool,

        /// Build cluster vectors for this event metric
        #[arg(long)]
        metric: Option<String>,

        /// Print text summary to stdout
        #[arg(long)]
        summary: bool,

        /// Disable parallel ingestion
        #[arg(long)]
        sequential: bool,
    },

    /// Validate a summary JSON file
    Validate {
        /// Path to summary JSON file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Display version information
    Version,
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    // Execute command
    match cli.command {
        Commands::Import {
            sts,
            output,
            options,
            consider_collectives,
            metric,
            summary,
            sequential,
        } => {
            let args = ImportArgs {
                sts,
                output: Some(output),
                options_file: options,
                consider_collectives,
                metric,
                print_summary: summary,
                sequential,
            };

            // Validate args first
            validate_args(&args)?;

            execute_import(args)?;
        }

        Commands::Validate { file } => {
            validate_summary_file(file)?;
        }

        Commands::Version => {
            display_version();
        }
    }

    Ok(())
}
