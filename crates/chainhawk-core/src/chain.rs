//! Ephemeral chain management.
//!
//! Lifecycle: `absent -> starting -> ready -> stopped`. Starting always
//! removes any container with the same name first, so at most one instance per
//! name is ever considered ready.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{ChainConfig, DockerConfig};
use crate::docker::ContainerRuntime;
use crate::process::CommandRunner;
use crate::rpc::{block_number, ChainRpc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainState {
    Absent,
    Starting,
    Ready,
    Stopped,
}

/// A running ephemeral node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainHandle {
    pub container_name: String,
    pub rpc_url: String,
    pub chain_id: u64,
}

/// Readiness polling budget.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
    pub probe_timeout: Duration,
}

impl From<&ChainConfig> for PollPolicy {
    fn from(config: &ChainConfig) -> Self {
        Self {
            attempts: config.poll_attempts,
            interval: config.poll_interval(),
            probe_timeout: config.probe_timeout(),
        }
    }
}

/// Poll the liveness probe until it succeeds or the attempt budget runs out.
///
/// Returns the 1-based attempt that succeeded.
pub async fn wait_until_ready(rpc: &dyn ChainRpc, policy: PollPolicy) -> Result<u32> {
    for attempt in 1..=policy.attempts {
        match tokio::time::timeout(policy.probe_timeout, block_number(rpc, policy.probe_timeout)).await {
            Ok(Ok(block)) => {
                debug!(attempt, block, "chain answered liveness probe");
                return Ok(attempt);
            }
            Ok(Err(err)) => debug!(attempt, error = %err, "liveness probe failed"),
            Err(_) => debug!(attempt, "liveness probe timed out"),
        }
        if attempt < policy.attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }
    Err(anyhow!(
        "chain did not become ready after {} attempts",
        policy.attempts
    ))
}

/// Start/stop seam for the ephemeral chain.
#[async_trait]
pub trait EphemeralChain: Send + Sync {
    async fn start(&self) -> Result<ChainHandle>;
    /// Halt and remove the instance. Must never fail.
    async fn stop(&self);
}

/// Anvil in a Docker container on the host network.
pub struct AnvilChain<'a> {
    runtime: ContainerRuntime<'a>,
    rpc: &'a dyn ChainRpc,
    chain: ChainConfig,
    image: String,
    state: Mutex<ChainState>,
}

impl<'a> AnvilChain<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        rpc: &'a dyn ChainRpc,
        chain: &ChainConfig,
        docker: &DockerConfig,
    ) -> Self {
        Self {
            runtime: ContainerRuntime::new(runner),
            rpc,
            chain: chain.clone(),
            image: docker.anvil_image.clone(),
            state: Mutex::new(ChainState::Absent),
        }
    }

    pub fn state(&self) -> ChainState {
        self.state.lock().map(|s| *s).unwrap_or(ChainState::Absent)
    }

    fn set_state(&self, next: ChainState) {
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }

    /// Arguments after `docker run -d`.
    pub fn launch_args(&self) -> Vec<String> {
        let c = &self.chain;
        vec![
            "--name".into(),
            c.container_name.clone(),
            "--network".into(),
            "host".into(),
            // the foundry image wraps its command in `sh -c`
            "--entrypoint".into(),
            "anvil".into(),
            self.image.clone(),
            "--host".into(),
            "0.0.0.0".into(),
            "--port".into(),
            c.port.to_string(),
            "--chain-id".into(),
            c.chain_id.to_string(),
            "--accounts".into(),
            c.accounts.to_string(),
            "--balance".into(),
            c.balance.to_string(),
            "--gas-limit".into(),
            c.gas_limit.to_string(),
            "--gas-price".into(),
            c.gas_price.to_string(),
            "--mnemonic".into(),
            c.mnemonic.clone(),
        ]
    }

    fn handle(&self) -> ChainHandle {
        ChainHandle {
            container_name: self.chain.container_name.clone(),
            rpc_url: self.chain.rpc_url(),
            chain_id: self.chain.chain_id,
        }
    }
}

#[async_trait]
impl EphemeralChain for AnvilChain<'_> {
    async fn start(&self) -> Result<ChainHandle> {
        let name = &self.chain.container_name;
        self.runtime.force_remove(name).await;
        self.set_state(ChainState::Starting);

        info!(container = %name, port = self.chain.port, chain_id = self.chain.chain_id, "starting anvil");
        self.runtime
            .run_detached(self.launch_args())
            .await
            .context("anvil launch failed")?;

        match wait_until_ready(self.rpc, PollPolicy::from(&self.chain)).await {
            Ok(attempt) => {
                self.set_state(ChainState::Ready);
                info!(rpc_url = %self.chain.rpc_url(), attempt, "anvil ready");
                Ok(self.handle())
            }
            Err(err) => {
                if let Some(logs) = self.runtime.logs(name).await {
                    debug!(stdout = %logs.stdout, stderr = %logs.stderr, "anvil container logs");
                }
                warn!(container = %name, "anvil start timed out");
                Err(err.context("anvil start timeout"))
            }
        }
    }

    async fn stop(&self) {
        self.runtime.force_remove(&self.chain.container_name).await;
        self.set_state(ChainState::Stopped);
        info!(container = %self.chain.container_name, "anvil stopped");
    }
}
