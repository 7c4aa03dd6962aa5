//! Tabula CLI - inspect model files and run predictions from the shell.
//!
//! Logs go to stderr so stdout carries only JSON.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "tabula")]
#[command(about = "Inspect tabula model files and run predictions", version)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a model's id, task, columns and feature count as JSON
    Info {
        /// Path to the model file
        model: PathBuf,
    },

    /// Predict JSON rows read from a file or stdin
    Predict {
        /// Path to the model file
        #[arg(short, long)]
        model: PathBuf,

        /// Input JSON object or array ("-" for stdin)
        #[arg(short, long, default_value = "-")]
        input: String,

        /// Write output here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Positive-class probability threshold for binary classifiers
        #[arg(long)]
        threshold: Option<f32>,

        /// Include per-feature contributions in the output
        #[arg(long)]
        contributions: bool,

        /// Pretty-print the output JSON
        #[arg(long)]
        pretty: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::WARN };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    debug!("Starting tabula {}", tabula::VERSION);

    match args.command {
        Command::Info { model } => {
            let info = commands::info(&model)?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Command::Predict {
            model,
            input,
            output,
            threshold,
            contributions,
            pretty,
        } => {
            let request = commands::PredictRequest {
                model,
                input: (input != "-").then(|| PathBuf::from(input)),
                output,
                threshold,
                contributions,
                pretty,
            };
            commands::predict(&request)?;
        }
    }

    Ok(())
}
