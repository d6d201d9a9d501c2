//! chainhawk: smart contract analysis orchestrator
//!
//! Drives third-party tools through Docker:
//!
//! - **fuzz**: throwaway Anvil chain, Foundry deploy, ITYfuzz against the deployed address
//! - **semgrep**: static analysis of a source tree
//! - **config**: print the effective configuration
//!
//! ## Example Usage
//!
//! ```bash
//! # Fuzz a Foundry project
//! chainhawk fuzz ./my-project --contract Vault
//!
//! # Fuzz a single contract file with a 5 minute budget
//! chainhawk fuzz ./Vault.sol --wall-clock-secs 300
//!
//! # Static analysis with local rules
//! chainhawk semgrep ./contracts --rules ./semgrep_rules
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

mod chainhawk_cli;

use chainhawk_cli::{config::ConfigCmd, fuzz::FuzzCmd, output, semgrep::SemgrepCmd};
use chainhawk_core::{AnalysisOutcome, ChainhawkConfig};

#[derive(Parser)]
#[command(
    name = "chainhawk",
    author,
    version,
    about = "Smart contract analysis orchestrator",
    long_about = "Runs Semgrep and ITYfuzz against smart contracts, managing a disposable \
                  Anvil chain and Foundry deployment for fuzzing."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (YAML or JSON). Falls back to $CHAINHAWK_CONFIG, then ~/.chainhawk/config.yaml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output as JSON instead of human-readable format
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a contract to a throwaway chain and fuzz it
    Fuzz(FuzzCmd),

    /// Run Semgrep static analysis
    Semgrep(SemgrepCmd),

    /// Print the effective configuration
    Config(ConfigCmd),
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = format!("chainhawk={0},chainhawk_core={0}", level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// `Some(outcome)` for analysis commands, `None` for commands that print directly.
async fn run(command: Commands, config_path: Option<&Path>, json: bool) -> Result<Option<AnalysisOutcome>> {
    let config = ChainhawkConfig::load(config_path)?;
    match command {
        Commands::Fuzz(cmd) => cmd.execute(&config).await.map(Some),
        Commands::Semgrep(cmd) => cmd.execute(&config).await.map(Some),
        Commands::Config(cmd) => cmd.execute(&config, json).map(|_| None),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let Cli {
        command,
        config,
        json,
        verbose,
    } = Cli::parse();
    init_tracing(verbose);

    match run(command, config.as_deref(), json).await {
        Ok(Some(outcome)) => {
            output::print_outcome(&outcome, json);
            if outcome.is_error() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Ok(None) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", output::format_error(&err, json));
            ExitCode::FAILURE
        }
    }
}
