use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use chainhawk_core::process::SystemRunner;
use chainhawk_core::rpc::HttpRpc;
use chainhawk_core::workflow::{run_analysis, FuzzRequest, LocalBackend};
use chainhawk_core::{AnalysisOutcome, ChainhawkConfig};

use super::ensure_target_exists;

#[derive(Parser, Debug)]
#[command(about = "Deploy a contract to a throwaway Anvil chain and fuzz it with ITYfuzz")]
pub struct FuzzCmd {
    /// Foundry project directory or a single .sol file
    pub target: PathBuf,

    /// Contract to deploy (required when the sources declare several)
    #[arg(long)]
    pub contract: Option<String>,

    /// Hard budget for the fuzz engine, in seconds
    #[arg(long)]
    pub wall_clock_secs: Option<u64>,

    /// Fuzzing iterations
    #[arg(long)]
    pub iterations: Option<u64>,

    /// Directory for engine work files (created if absent)
    #[arg(long)]
    pub results_dir: Option<PathBuf>,
}

impl FuzzCmd {
    /// Config with command-line overrides applied.
    pub fn effective_config(&self, base: &ChainhawkConfig) -> ChainhawkConfig {
        let mut config = base.clone();
        if let Some(secs) = self.wall_clock_secs {
            config.fuzz.wall_clock_secs = secs;
        }
        if let Some(iterations) = self.iterations {
            config.fuzz.iterations = iterations;
        }
        if let Some(dir) = &self.results_dir {
            config.fuzz.results_dir = dir.clone();
        }
        config
    }

    pub async fn execute(&self, base: &ChainhawkConfig) -> Result<AnalysisOutcome> {
        ensure_target_exists(&self.target)?;
        let config = self.effective_config(base);
        info!(
            path = %self.target.display(),
            contract = ?self.contract,
            rpc_url = %config.chain.rpc_url(),
            "starting fuzz workflow"
        );

        let runner = SystemRunner;
        let rpc = HttpRpc::new(config.chain.rpc_url());
        let backend = LocalBackend::new(
            &runner,
            &rpc,
            &config,
            FuzzRequest {
                target: self.target.clone(),
                contract_name: self.contract.clone(),
            },
        );
        Ok(run_analysis(&backend).await)
    }
}
