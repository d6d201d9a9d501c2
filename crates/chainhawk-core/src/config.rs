//! Layered configuration.
//!
//! Resolution order: explicit `--config` path, then `CHAINHAWK_CONFIG`, then
//! `<chainhawk home>/config.yaml` if it exists, else built-in defaults. Files
//! may be YAML or JSON and only need to name the fields they override.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::accounts::{default_accounts, Account, DEFAULT_MNEMONIC};

pub const CONFIG_ENV: &str = "CHAINHAWK_CONFIG";
pub const HOME_ENV: &str = "CHAINHAWK_HOME";

pub fn chainhawk_home() -> PathBuf {
    std::env::var(HOME_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".chainhawk")
        })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecipe {
    pub tag: String,
    pub dockerfile: PathBuf,
    /// Build context passed to `docker build`.
    #[serde(default = "default_build_context")]
    pub context: PathBuf,
}

fn default_build_context() -> PathBuf {
    PathBuf::from(".")
}

impl ImageRecipe {
    fn local(tag: &str, dockerfile: &str) -> Self {
        Self {
            tag: tag.to_string(),
            dockerfile: PathBuf::from(dockerfile),
            context: default_build_context(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    pub semgrep: ImageRecipe,
    pub ityfuzz: ImageRecipe,
    /// Prebuilt image providing the `anvil` binary.
    pub anvil_image: String,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            semgrep: ImageRecipe::local("chainhawk-semgrep", "docker/semgrep.Dockerfile"),
            ityfuzz: ImageRecipe::local("chainhawk-ityfuzz", "docker/ityfuzz.Dockerfile"),
            anvil_image: "ghcr.io/foundry-rs/foundry:latest".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub container_name: String,
    pub host: String,
    pub port: u16,
    pub chain_id: u64,
    pub accounts: u32,
    /// Starting balance per account, in ether.
    pub balance: u64,
    pub gas_limit: u64,
    pub gas_price: u64,
    pub mnemonic: String,
    pub poll_interval_ms: u64,
    pub poll_attempts: u32,
    pub probe_timeout_ms: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            container_name: "chainhawk-anvil".to_string(),
            host: "localhost".to_string(),
            port: 8545,
            chain_id: 31337,
            accounts: 10,
            balance: 10_000,
            gas_limit: 30_000_000,
            gas_price: 1,
            mnemonic: DEFAULT_MNEMONIC.to_string(),
            poll_interval_ms: 2_000,
            poll_attempts: 30,
            probe_timeout_ms: 5_000,
        }
    }
}

impl ChainConfig {
    pub fn rpc_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    pub deployer: Account,
    /// Pause before the single receipt lookup.
    pub receipt_delay_ms: u64,
    pub rpc_timeout_ms: u64,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            deployer: default_accounts().remove(0),
            receipt_delay_ms: 2_000,
            rpc_timeout_ms: 10_000,
        }
    }
}

impl DeployConfig {
    pub fn receipt_delay(&self) -> Duration {
        Duration::from_millis(self.receipt_delay_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzSettings {
    pub iterations: u64,
    /// Timeout handed to the engine itself.
    pub engine_timeout_secs: u64,
    /// Hard budget for the whole engine process.
    pub wall_clock_secs: u64,
    pub results_dir: PathBuf,
    /// Transient descriptor file, relative to the project root.
    pub config_file_name: String,
}

impl Default for FuzzSettings {
    fn default() -> Self {
        Self {
            iterations: 10_000,
            engine_timeout_secs: 300,
            wall_clock_secs: 600,
            results_dir: PathBuf::from("ityfuzz_results"),
            config_file_name: ".chainhawk-fuzz.json".to_string(),
        }
    }
}

impl FuzzSettings {
    pub fn wall_clock(&self) -> Duration {
        Duration::from_secs(self.wall_clock_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemgrepSettings {
    /// Rules directory, rule file, or registry config (e.g. `auto`).
    pub rules: String,
}

impl Default for SemgrepSettings {
    fn default() -> Self {
        Self {
            rules: "auto".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainhawkConfig {
    pub docker: DockerConfig,
    pub chain: ChainConfig,
    pub deploy: DeployConfig,
    pub fuzz: FuzzSettings,
    pub semgrep: SemgrepSettings,
}

impl ChainhawkConfig {
    /// Parse a YAML or JSON config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&raw)
            .with_context(|| format!("parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the effective config for a CLI invocation.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            if !path.is_empty() {
                return Self::from_file(Path::new(&path));
            }
        }
        let home_config = chainhawk_home().join("config.yaml");
        if home_config.exists() {
            return Self::from_file(&home_config);
        }
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<()> {
        if self.chain.poll_attempts == 0 {
            return Err(anyhow!("chain.poll_attempts must be at least 1"));
        }
        if self.chain.container_name.trim().is_empty() {
            return Err(anyhow!("chain.container_name must not be empty"));
        }
        if !crate::address::is_valid_address(&self.deploy.deployer.address) {
            return Err(anyhow!(
                "deploy.deployer.address is not a 20-byte hex address: {}",
                self.deploy.deployer.address
            ));
        }
        // anvil only funds accounts derived from its mnemonic
        if self.chain.mnemonic != DEFAULT_MNEMONIC
            && default_accounts()
                .iter()
                .any(|a| crate::address::same_address(&a.address, &self.deploy.deployer.address))
        {
            return Err(anyhow!(
                "chain.mnemonic is overridden but deploy.deployer is still a default anvil account ({}); \
                 set deploy.deployer to an account derived from the new mnemonic",
                self.deploy.deployer.address
            ));
        }
        if self.fuzz.config_file_name.contains(['/', '\\']) {
            return Err(anyhow!(
                "fuzz.config_file_name must be a bare file name: {}",
                self.fuzz.config_file_name
            ));
        }
        Ok(())
    }
}
