//! Contract deployment with Foundry.
//!
//! Steps: validate project, resolve contract, `forge build`, query nonce,
//! predict address, `forge create`, extract the deployed address, fall back to
//! the prediction, validate. Nonce and receipt lookups are best effort; the
//! final address shape check is the only hard gate on the output.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::accounts::Account;
use crate::address::{is_valid_address, predict_contract_address, same_address};
use crate::chain::ChainHandle;
use crate::config::DeployConfig;
use crate::json_extract::json_objects;
use crate::process::{CommandRunner, CommandSpec};
use crate::project::{resolve_contract, validate_project, ContractTarget, DeploymentRequest, FORGE};
use crate::rpc::{receipt_contract_address, transaction_count, ChainRpc};

/// Keys `forge create --json` (and friends) use for the deployed address.
pub const ADDRESS_KEYS: &[&str] = &[
    "deployedTo",
    "deployed_to",
    "contractAddress",
    "contract_address",
    "address",
];

pub const TX_HASH_KEYS: &[&str] = &["transactionHash", "transaction_hash", "txHash", "hash"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressSource {
    ToolOutput,
    Receipt,
    Predicted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionConfidence {
    /// Nonce came from the live chain.
    High,
    /// Nonce query failed and zero was assumed.
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentResult {
    pub contract_address: String,
    pub contract_name: String,
    pub address_source: AddressSource,
    pub predicted_address: String,
    pub prediction_confidence: PredictionConfidence,
    #[serde(skip)]
    pub target: ContractTarget,
    pub warnings: Vec<String>,
}

/// What could be read from the deploy tool's stdout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployToolReport {
    pub address: Option<String>,
    pub tx_hash: Option<String>,
}

fn first_string(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| value.get(*k))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Scan deploy tool output for an address and/or transaction hash.
///
/// Every embedded JSON object is considered; the last one that carries an
/// address wins, otherwise the last transaction hash seen is kept.
pub fn parse_deploy_output(stdout: &str) -> DeployToolReport {
    let mut report = DeployToolReport::default();
    for obj in json_objects(stdout).iter().rev() {
        if report.address.is_none() {
            report.address = first_string(obj, ADDRESS_KEYS);
        }
        if report.tx_hash.is_none() {
            report.tx_hash = first_string(obj, TX_HASH_KEYS);
        }
    }
    report
}

pub struct ContractDeployer<'a> {
    runner: &'a dyn CommandRunner,
    rpc: &'a dyn ChainRpc,
    config: &'a DeployConfig,
}

impl<'a> ContractDeployer<'a> {
    pub fn new(runner: &'a dyn CommandRunner, rpc: &'a dyn ChainRpc, config: &'a DeployConfig) -> Self {
        Self { runner, rpc, config }
    }

    fn deployer(&self) -> &Account {
        &self.config.deployer
    }

    pub async fn compile(&self, root: &Path) -> Result<()> {
        info!(project = %root.display(), "compiling");
        let output = self
            .runner
            .run(&CommandSpec::new(FORGE).arg("build").current_dir(root))
            .await
            .context("Failed to run 'forge build'. Is Foundry installed?")?;
        if !output.is_success() {
            return Err(anyhow!("Compilation failed:\n{}", output.failure_text()));
        }
        Ok(())
    }

    /// Current nonce, or zero with low confidence when the query fails.
    async fn nonce(&self, warnings: &mut Vec<String>) -> (u64, PredictionConfidence) {
        let address = &self.deployer().address;
        match transaction_count(self.rpc, address, self.config.rpc_timeout()).await {
            Ok(nonce) => (nonce, PredictionConfidence::High),
            Err(err) => {
                warn!(deployer = %address, error = %err, "nonce query failed, assuming 0");
                warnings.push(format!(
                    "nonce query failed ({}); predicted address assumes nonce 0 and may be wrong",
                    err
                ));
                (0, PredictionConfidence::Low)
            }
        }
    }

    async fn submit(&self, root: &Path, target: &ContractTarget, chain: &ChainHandle) -> Result<String> {
        let spec = CommandSpec::new(FORGE)
            .arg("create")
            .arg(target.forge_identifier())
            .args(["--rpc-url", chain.rpc_url.as_str()])
            .args(["--private-key", self.deployer().private_key.as_str()])
            .args(["--broadcast", "--json"])
            .current_dir(root);
        debug!(contract = %target.forge_identifier(), rpc_url = %chain.rpc_url, "forge create");
        let output = self
            .runner
            .run(&spec)
            .await
            .context("Failed to run 'forge create'. Is Foundry installed?")?;
        if !output.is_success() {
            return Err(anyhow!("Contract deployment failed: {}", output.failure_text()));
        }
        Ok(output.stdout)
    }

    async fn receipt_address(&self, tx_hash: &str) -> Option<String> {
        tokio::time::sleep(self.config.receipt_delay()).await;
        match receipt_contract_address(self.rpc, tx_hash, self.config.rpc_timeout()).await {
            Ok(Some(address)) => Some(address),
            Ok(None) => {
                debug!(tx_hash, "receipt has no contractAddress");
                None
            }
            Err(err) => {
                warn!(tx_hash, error = %err, "receipt lookup failed");
                None
            }
        }
    }

    pub async fn deploy(&self, request: &DeploymentRequest, chain: &ChainHandle) -> Result<DeploymentResult> {
        let root = request.project_root.as_path();
        validate_project(root)?;
        let target = resolve_contract(root, request.contract_name.as_deref())?;
        let mut warnings = target.warnings.clone();
        for w in &warnings {
            warn!("{}", w);
        }

        self.compile(root).await?;

        let (nonce, confidence) = self.nonce(&mut warnings).await;
        let predicted = predict_contract_address(&self.deployer().address, nonce)
            .context("predict contract address")?;
        debug!(nonce, predicted = %predicted, "predicted deployment address");

        let stdout = self.submit(root, &target, chain).await?;
        let report = parse_deploy_output(&stdout);

        let (address, source) = match (report.address, report.tx_hash) {
            (Some(address), _) => (address, AddressSource::ToolOutput),
            (None, Some(tx_hash)) => match self.receipt_address(&tx_hash).await {
                Some(address) => (address, AddressSource::Receipt),
                None => (predicted.clone(), AddressSource::Predicted),
            },
            (None, None) => (predicted.clone(), AddressSource::Predicted),
        };

        if source == AddressSource::Predicted {
            warn!(address = %address, "no address reported by deploy tool; using prediction");
            if confidence == PredictionConfidence::Low {
                warnings.push(format!(
                    "deployed address {} is a low-confidence prediction",
                    address
                ));
            }
        } else if confidence == PredictionConfidence::High && !same_address(&address, &predicted) {
            warn!(reported = %address, predicted = %predicted, "deployed address differs from prediction");
        }

        if !is_valid_address(&address) {
            return Err(anyhow!("deployment produced a malformed address: {:?}", address));
        }

        info!(contract = %target.name, address = %address, source = ?source, "deployed");
        Ok(DeploymentResult {
            contract_address: address,
            contract_name: target.name.clone(),
            address_source: source,
            predicted_address: predicted,
            prediction_confidence: confidence,
            target,
            warnings,
        })
    }
}
