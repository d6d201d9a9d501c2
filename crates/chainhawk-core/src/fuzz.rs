//! ITYfuzz runner.
//!
//! The engine sees the deployed target through a JSON descriptor written into
//! the project directory (mounted at `/project`) for the duration of the run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::accounts::Account;
use crate::chain::ChainHandle;
use crate::config::FuzzSettings;
use crate::deploy::DeploymentResult;
use crate::docker::{ContainerRuntime, DOCKER};
use crate::process::{CommandRunner, CommandSpec};

/// Descriptor handed to the engine via `--config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuzzConfig {
    pub target_address: String,
    pub contract_name: String,
    pub abi: Value,
    pub rpc_url: String,
    pub chain_id: u64,
    pub deployer: Account,
    pub iterations: u64,
    pub timeout: u64,
}

/// `abi` from a forge artifact, or an empty array on any failure.
pub fn load_abi(artifact: Option<&Path>) -> Value {
    let Some(path) = artifact else {
        debug!("no artifact path for contract, using empty ABI");
        return Value::Array(Vec::new());
    };
    let parsed = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
        .and_then(|artifact| artifact.get("abi").cloned())
        .filter(Value::is_array);
    match parsed {
        Some(abi) => abi,
        None => {
            warn!(artifact = %path.display(), "could not read ABI, using empty array");
            Value::Array(Vec::new())
        }
    }
}

/// A file removed when the guard is dropped.
#[derive(Debug)]
pub struct TransientFile {
    path: PathBuf,
}

impl TransientFile {
    pub fn write(path: PathBuf, contents: &[u8]) -> Result<Self> {
        // own the path before writing so a failed write still removes it
        let guard = Self { path };
        fs::write(&guard.path, contents).with_context(|| format!("write {}", guard.path.display()))?;
        Ok(guard)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TransientFile {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %err, "failed to remove transient file");
            }
        }
    }
}

/// Captured engine run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuzzRun {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    /// Wall-clock budget the run was held to.
    pub budget_secs: u64,
}

/// Everything the runner needs about the deployed target.
pub struct FuzzTarget<'a> {
    pub project_root: &'a Path,
    pub deployment: &'a DeploymentResult,
    pub chain: &'a ChainHandle,
    pub deployer: &'a Account,
}

pub struct FuzzRunner<'a> {
    runtime: ContainerRuntime<'a>,
    settings: &'a FuzzSettings,
    image: &'a str,
}

fn absolute(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).with_context(|| format!("resolve {}", path.display()))
}

impl<'a> FuzzRunner<'a> {
    pub fn new(runner: &'a dyn CommandRunner, settings: &'a FuzzSettings, image: &'a str) -> Self {
        Self {
            runtime: ContainerRuntime::new(runner),
            settings,
            image,
        }
    }

    pub fn build_config(&self, target: &FuzzTarget<'_>) -> FuzzConfig {
        let artifact = target.deployment.target.artifact_path(target.project_root);
        FuzzConfig {
            target_address: target.deployment.contract_address.clone(),
            contract_name: target.deployment.contract_name.clone(),
            abi: load_abi(artifact.as_deref()),
            rpc_url: target.chain.rpc_url.clone(),
            chain_id: target.chain.chain_id,
            deployer: target.deployer.clone(),
            iterations: self.settings.iterations,
            timeout: self.settings.engine_timeout_secs,
        }
    }

    /// Container name for one engine run.
    pub fn container_name(&self) -> String {
        format!("chainhawk-ityfuzz-{}", std::process::id())
    }

    pub fn engine_command(
        &self,
        config: &FuzzConfig,
        project_root: &Path,
        results_dir: &Path,
        container: &str,
    ) -> CommandSpec {
        CommandSpec::new(DOCKER)
            .args(["run", "--rm", "--name", container, "--network", "host"])
            .arg("-v")
            .arg(format!("{}:/results", results_dir.display()))
            .arg("-v")
            .arg(format!("{}:/project", project_root.display()))
            .arg(self.image)
            .args(["ityfuzz", "evm"])
            .args(["--target", config.target_address.as_str()])
            .args(["--rpc-url", config.rpc_url.as_str()])
            .arg("--chain-id")
            .arg(config.chain_id.to_string())
            .arg("--iterations")
            .arg(config.iterations.to_string())
            .arg("--timeout")
            .arg(config.timeout.to_string())
            .args(["--work-dir", "/results"])
            .arg("--config")
            .arg(format!("/project/{}", self.settings.config_file_name))
            .arg("--verbose")
            .timeout(self.settings.wall_clock())
    }

    /// Run the engine once against `target`.
    ///
    /// Exceeding the wall-clock budget is not an error: the container is removed
    /// and the partial output comes back with `timed_out` set.
    pub async fn run(&self, target: &FuzzTarget<'_>) -> Result<FuzzRun> {
        let config = self.build_config(target);
        let project_root = absolute(target.project_root)?;

        fs::create_dir_all(&self.settings.results_dir).with_context(|| {
            format!("create results dir {}", self.settings.results_dir.display())
        })?;
        let results_dir = absolute(&self.settings.results_dir)?;

        let body = serde_json::to_vec_pretty(&config).context("serialize fuzz config")?;
        let descriptor = TransientFile::write(project_root.join(&self.settings.config_file_name), &body)?;
        debug!(path = %descriptor.path().display(), "wrote fuzz config");

        let container = self.container_name();
        let spec = self.engine_command(&config, &project_root, &results_dir, &container);
        info!(
            address = %config.target_address,
            iterations = config.iterations,
            budget_secs = self.settings.wall_clock_secs,
            "running ityfuzz"
        );
        let output = self.runtime.run_once(spec).await.context("Failed to run ityfuzz container")?;

        if output.timed_out {
            warn!(container = %container, budget_secs = self.settings.wall_clock_secs, "fuzzing exceeded wall-clock budget");
            self.runtime.force_remove(&container).await;
        } else {
            debug!(exit_code = ?output.exit_code, "ityfuzz finished");
        }

        Ok(FuzzRun {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            timed_out: output.timed_out,
            budget_secs: self.settings.wall_clock_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_load_abi_from_artifact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Vault.json");
        fs::write(&path, r#"{"abi":[{"type":"function","name":"withdraw"}],"bytecode":{}}"#).unwrap();
        let abi = load_abi(Some(&path));
        assert_eq!(abi[0]["name"], "withdraw");
    }

    #[test]
    fn test_load_abi_degrades_to_empty() {
        let dir = tempdir().unwrap();
        assert_eq!(load_abi(None), json!([]));
        assert_eq!(load_abi(Some(&dir.path().join("missing.json"))), json!([]));

        let bad = dir.path().join("bad.json");
        fs::write(&bad, "not json").unwrap();
        assert_eq!(load_abi(Some(&bad)), json!([]));

        let no_abi = dir.path().join("noabi.json");
        fs::write(&no_abi, r#"{"abi":"oops"}"#).unwrap();
        assert_eq!(load_abi(Some(&no_abi)), json!([]));
    }

    #[test]
    fn test_transient_file_removed_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".chainhawk-fuzz.json");
        {
            let guard = TransientFile::write(path.clone(), b"{}").unwrap();
            assert!(guard.path().exists());
        }
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_transient_file_failed_write_leaves_nothing() {
        let dir = tempdir().unwrap();
        // a directory cannot be written as a file; the guard must not leak or panic
        let path = dir.path().join("occupied");
        fs::create_dir(&path).unwrap();
        assert!(TransientFile::write(path.clone(), b"{}").is_err());

        let missing_parent = dir.path().join("no-such-dir").join(".chainhawk-fuzz.json");
        assert!(TransientFile::write(missing_parent.clone(), b"{}").is_err());
        assert!(!missing_parent.exists());
    }

    #[test]
    fn test_transient_file_tolerates_early_removal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.json");
        let guard = TransientFile::write(path.clone(), b"{}").unwrap();
        fs::remove_file(&path).unwrap();
        drop(guard);
    }
}
