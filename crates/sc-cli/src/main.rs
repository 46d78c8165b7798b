//! shapecard CLI

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

mod batch;
mod build;
mod config;

#[derive(Parser)]
#[command(name = "shapecard")]
#[command(about = "shapecard - binned shape datacards from histogram catalogues")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build one datacard from a card config
    MakeCard {
        /// Card config (YAML)
        #[arg(short, long)]
        config: PathBuf,

        /// Output root; the card lands in `cards-{name}/`.
        #[arg(long)]
        out_dir: PathBuf,

        /// Recreate a non-empty output root.
        #[arg(long)]
        force: bool,
    },

    /// Build many independent cards in parallel
    Batch {
        /// Job list (YAML): `out_dir` and `cards`.
        #[arg(long)]
        jobs: PathBuf,

        /// Threads (0 = auto).
        #[arg(long, default_value = "0")]
        threads: usize,

        /// Recreate a non-empty output root.
        #[arg(long)]
        force: bool,
    },

    /// Print the rate table of a datacard as JSON
    Inspect {
        /// Datacard transcript (`shapes-*.dat`)
        #[arg(long)]
        card: PathBuf,
    },

    /// Print version
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::MakeCard { config, out_dir, force } => cmd_make_card(&config, &out_dir, force),
        Commands::Batch { jobs, threads, force } => cmd_batch(&jobs, threads, force),
        Commands::Inspect { card } => cmd_inspect(&card),
        Commands::Version => {
            println!("shapecard {}", sc_core::VERSION);
            Ok(())
        }
    }
}

fn cmd_make_card(config_path: &Path, out_dir: &Path, force: bool) -> Result<()> {
    let card = config::read_card_config(config_path)?;
    sc_card::prepare_output_dir(out_dir, force)?;
    let summary = build::build_card(&card, out_dir)?;
    write_json(serde_json::to_value(&summary)?)
}

fn cmd_batch(jobs: &Path, threads: usize, force: bool) -> Result<()> {
    let outcome = batch::run_batch(jobs, threads, force)?;
    let total = outcome.built.len() + outcome.failed.len();
    write_json(serde_json::json!({
        "built": outcome.built,
        "failed": outcome
            .failed
            .iter()
            .map(|(config, error)| serde_json::json!({ "config": config, "error": error }))
            .collect::<Vec<_>>(),
    }))?;
    if !outcome.failed.is_empty() {
        anyhow::bail!("{} of {total} cards failed", outcome.failed.len());
    }
    Ok(())
}

fn cmd_inspect(card: &Path) -> Result<()> {
    let text = std::fs::read_to_string(card)?;
    let table = sc_card::RateTable::parse(&text)?;
    write_json(serde_json::to_value(&table)?)
}

fn write_json(value: serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
