use anyhow::Context;
use clap::{Parser, Subcommand};
use popguard_config::SnapshotSummary;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod sim;

pub const DEFAULT_CONFIG_PATH: &str = "popguard/config.yml";

#[derive(Parser)]
#[command(name = "popguard", about = "Entity population limiter for a simulated server")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Load a config file and print the snapshot it produces
    Check {
        /// Path to config.yml
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Print as JSON instead of text
        #[arg(long)]
        json: bool,
        /// Exit with an error if the file produced any warnings
        #[arg(long)]
        strict: bool,
    },
    /// Run a simulated server with the limiter attached
    Simulate(sim::SimArgs),
}

#[derive(Serialize)]
struct CheckOutput<'a> {
    path: &'a Path,
    config: SnapshotSummary,
    warnings: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Info => {
            println!("popguard v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", popguard_common::crate_info());
            println!("config: {}", popguard_config::crate_info());
            println!("kernel: {}", popguard_kernel::crate_info());
            println!("limiter: {}", popguard_limiter::crate_info());
        }
        Commands::Check {
            config,
            json,
            strict,
        } => {
            let (snapshot, report) = popguard_config::load_file(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            let warnings: Vec<String> = report.warnings.iter().map(ToString::to_string).collect();

            if json {
                let output = CheckOutput {
                    path: &config,
                    config: snapshot.summary(),
                    warnings: warnings.clone(),
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("{}", config.display());
                println!("{}", snapshot.summary());
                for warning in &warnings {
                    println!("warning: {warning}");
                }
            }

            if strict && !warnings.is_empty() {
                anyhow::bail!("{} warning(s) in {}", warnings.len(), config.display());
            }
        }
        Commands::Simulate(args) => sim::run(args)?,
    }

    Ok(())
}
