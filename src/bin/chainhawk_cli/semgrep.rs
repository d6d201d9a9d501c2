use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::debug;

use chainhawk_core::process::SystemRunner;
use chainhawk_core::static_analysis::StaticAnalyzer;
use chainhawk_core::{AnalysisOutcome, ChainhawkConfig};

use super::ensure_target_exists;

#[derive(Parser, Debug)]
#[command(about = "Run Semgrep over a contract file or directory")]
pub struct SemgrepCmd {
    /// Contract file or source directory
    pub target: PathBuf,

    /// Rules directory, rule file, or registry config (default from config: `auto`)
    #[arg(long, short)]
    pub rules: Option<String>,
}

impl SemgrepCmd {
    pub async fn execute(&self, config: &ChainhawkConfig) -> Result<AnalysisOutcome> {
        ensure_target_exists(&self.target)?;
        let rules = self.rules.as_deref().unwrap_or(&config.semgrep.rules);
        debug!(path = %self.target.display(), rules, "semgrep command");
        let runner = SystemRunner;
        Ok(StaticAnalyzer::new(&runner, &config.docker)
            .run(&self.target, rules)
            .await)
    }
}
