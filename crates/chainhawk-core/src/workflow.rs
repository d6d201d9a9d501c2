//! End-to-end fuzzing workflow.
//!
//! prepare -> chain start -> deploy -> fuzz -> classify, then chain stop.
//! Stop runs exactly once per run on every path, panics included, and
//! [`run_analysis`] never returns an error: failures become an
//! [`AnalysisOutcome`] with status `error`.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use tracing::{error, info, warn};

use crate::chain::{AnvilChain, ChainHandle, EphemeralChain};
use crate::config::ChainhawkConfig;
use crate::deploy::{ContractDeployer, DeploymentResult};
use crate::docker::ContainerRuntime;
use crate::fuzz::{FuzzRun, FuzzRunner, FuzzTarget};
use crate::process::CommandRunner;
use crate::project::{prepare_project, DeploymentRequest, PreparedProject};
use crate::rpc::ChainRpc;
use crate::verdict::{classify, classify_timeout, Classification, Verdict};

/// Workflow stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Prepare,
    ChainStart,
    Deploy,
    Fuzz,
    Classify,
}

impl Stage {
    pub fn short_name(&self) -> &'static str {
        match self {
            Stage::Prepare => "prepare",
            Stage::ChainStart => "chain_start",
            Stage::Deploy => "deploy",
            Stage::Fuzz => "fuzz",
            Stage::Classify => "classify",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

/// Structured result of a top-level run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisOutcome {
    pub status: Verdict,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<Stage>,
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Error message plus numbered cause chain.
pub fn error_chain(err: &anyhow::Error) -> String {
    let mut out = err.to_string();
    for (idx, cause) in err.chain().skip(1).enumerate() {
        out.push_str(&format!("\n  {}: {}", idx + 1, cause));
    }
    out
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl AnalysisOutcome {
    pub fn new(status: Verdict, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
            contract_address: None,
            contract_name: None,
            failed_stage: None,
            timed_out: false,
            warnings: Vec::new(),
        }
    }

    /// Top-level failure; `stage` is `None` for failures outside the workflow stages.
    pub fn failure(stage: Option<Stage>, err: &anyhow::Error) -> Self {
        let message = match stage {
            Some(stage) => format!("{} stage failed: {}", stage, err),
            None => err.to_string(),
        };
        let mut outcome = Self::new(Verdict::Error, message);
        outcome.details = Some(error_chain(err));
        outcome.failed_stage = stage;
        outcome
    }

    pub fn is_error(&self) -> bool {
        self.status == Verdict::Error
    }
}

/// The stages of a fuzzing run. [`LocalBackend`] drives the real tools; tests
/// substitute fakes to inject faults at any stage.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    async fn prepare(&self) -> Result<()>;
    async fn start_chain(&self) -> Result<ChainHandle>;
    async fn deploy(&self, chain: &ChainHandle) -> Result<DeploymentResult>;
    async fn fuzz(&self, chain: &ChainHandle, deployment: &DeploymentResult) -> Result<FuzzRun>;

    fn classify(&self, run: &FuzzRun) -> Result<Classification> {
        Ok(if run.timed_out {
            classify_timeout(&run.stdout, &run.stderr, run.budget_secs)
        } else {
            classify(&run.stdout, &run.stderr)
        })
    }

    /// Tear the chain down. Must not fail.
    async fn stop_chain(&self);
}

fn engine_output(run: &FuzzRun) -> Option<String> {
    let mut parts = Vec::new();
    if !run.stdout.trim().is_empty() {
        parts.push(run.stdout.trim_end().to_string());
    }
    if !run.stderr.trim().is_empty() {
        parts.push(format!("[stderr]\n{}", run.stderr.trim_end()));
    }
    (!parts.is_empty()).then(|| parts.join("\n"))
}

struct StageError {
    stage: Stage,
    error: anyhow::Error,
    deployment: Option<DeploymentResult>,
}

impl StageError {
    fn at(stage: Stage) -> impl FnOnce(anyhow::Error) -> StageError {
        move |error| StageError {
            stage,
            error,
            deployment: None,
        }
    }

    fn after_deploy(stage: Stage, deployment: &DeploymentResult) -> impl FnOnce(anyhow::Error) -> StageError + '_ {
        move |error| StageError {
            stage,
            error,
            deployment: Some(deployment.clone()),
        }
    }
}

/// Progress shared with [`run_analysis`] so a panic can still be reported
/// against the right stage and deployment.
#[derive(Default)]
struct Progress {
    stage: Mutex<Option<Stage>>,
    deployment: Mutex<Option<DeploymentResult>>,
}

impl Progress {
    fn stage(&self) -> Stage {
        self.stage
            .lock()
            .ok()
            .and_then(|s| *s)
            .unwrap_or(Stage::Prepare)
    }

    fn deployment(&self) -> Option<DeploymentResult> {
        self.deployment.lock().ok().and_then(|d| d.clone())
    }
}

async fn run_stages(
    backend: &dyn AnalysisBackend,
    progress: &Progress,
) -> std::result::Result<AnalysisOutcome, StageError> {
    let enter = |stage: Stage| {
        if let Ok(mut s) = progress.stage.lock() {
            *s = Some(stage);
        }
        info!(stage = %stage, "stage start");
    };

    enter(Stage::Prepare);
    backend.prepare().await.map_err(StageError::at(Stage::Prepare))?;

    enter(Stage::ChainStart);
    let chain = backend.start_chain().await.map_err(StageError::at(Stage::ChainStart))?;

    enter(Stage::Deploy);
    let deployment = backend.deploy(&chain).await.map_err(StageError::at(Stage::Deploy))?;
    if let Ok(mut d) = progress.deployment.lock() {
        *d = Some(deployment.clone());
    }

    enter(Stage::Fuzz);
    let run = backend
        .fuzz(&chain, &deployment)
        .await
        .map_err(StageError::after_deploy(Stage::Fuzz, &deployment))?;

    enter(Stage::Classify);
    let classification = backend
        .classify(&run)
        .map_err(StageError::after_deploy(Stage::Classify, &deployment))?;

    let mut outcome = AnalysisOutcome::new(classification.verdict, classification.message);
    outcome.details = engine_output(&run);
    outcome.contract_address = Some(deployment.contract_address.clone());
    outcome.contract_name = Some(deployment.contract_name.clone());
    outcome.timed_out = run.timed_out;
    outcome.warnings = deployment.warnings.clone();
    if run.timed_out {
        outcome
            .warnings
            .push(format!("fuzz engine stopped after {}s wall-clock budget", run.budget_secs));
    }
    Ok(outcome)
}

fn with_deployment(mut outcome: AnalysisOutcome, deployment: Option<DeploymentResult>) -> AnalysisOutcome {
    if let Some(d) = deployment {
        outcome.contract_address = Some(d.contract_address);
        outcome.contract_name = Some(d.contract_name);
        outcome.warnings = d.warnings;
    }
    outcome
}

/// Run every stage against `backend`. Never fails; always stops the chain once.
pub async fn run_analysis(backend: &dyn AnalysisBackend) -> AnalysisOutcome {
    let progress = Progress::default();
    let result = AssertUnwindSafe(run_stages(backend, &progress))
        .catch_unwind()
        .await;

    if AssertUnwindSafe(backend.stop_chain()).catch_unwind().await.is_err() {
        error!("chain teardown panicked");
    }

    match result {
        Ok(Ok(outcome)) => {
            info!(status = %outcome.status, "analysis finished");
            outcome
        }
        Ok(Err(StageError { stage, error, deployment })) => {
            warn!(stage = %stage, error = %error, "analysis failed");
            with_deployment(AnalysisOutcome::failure(Some(stage), &error), deployment)
        }
        Err(payload) => {
            let stage = progress.stage();
            let message = panic_message(payload.as_ref());
            error!(stage = %stage, panic = %message, "analysis panicked");
            with_deployment(
                AnalysisOutcome::failure(Some(stage), &anyhow!("panicked: {}", message)),
                progress.deployment(),
            )
        }
    }
}

/// What to fuzz.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuzzRequest {
    /// Foundry project directory or a single `.sol` file.
    pub target: PathBuf,
    pub contract_name: Option<String>,
}

/// Docker + Anvil + Foundry + ITYfuzz on the local machine.
pub struct LocalBackend<'a> {
    runner: &'a dyn CommandRunner,
    rpc: &'a dyn ChainRpc,
    config: &'a ChainhawkConfig,
    request: FuzzRequest,
    chain: AnvilChain<'a>,
    project: OnceLock<PreparedProject>,
}

impl<'a> LocalBackend<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        rpc: &'a dyn ChainRpc,
        config: &'a ChainhawkConfig,
        request: FuzzRequest,
    ) -> Self {
        Self {
            runner,
            rpc,
            config,
            request,
            chain: AnvilChain::new(runner, rpc, &config.chain, &config.docker),
            project: OnceLock::new(),
        }
    }

    fn project(&self) -> Result<&PreparedProject> {
        self.project
            .get()
            .ok_or_else(|| anyhow!("project was not prepared"))
    }
}

#[async_trait]
impl AnalysisBackend for LocalBackend<'_> {
    async fn prepare(&self) -> Result<()> {
        ContainerRuntime::new(self.runner)
            .ensure_image(&self.config.docker.ityfuzz)
            .await
            .context("ityfuzz image unavailable")?;
        let project = prepare_project(self.runner, &self.request.target).await?;
        info!(root = %project.root.display(), scratch = project.is_scratch(), "project ready");
        if self.project.set(project).is_err() {
            return Err(anyhow!("project prepared twice"));
        }
        Ok(())
    }

    async fn start_chain(&self) -> Result<ChainHandle> {
        self.chain.start().await
    }

    async fn deploy(&self, chain: &ChainHandle) -> Result<DeploymentResult> {
        let project = self.project()?;
        let contract_name = self
            .request
            .contract_name
            .clone()
            .or_else(|| project.implied_contract.clone());
        let request = DeploymentRequest::new(&project.root, contract_name);
        ContractDeployer::new(self.runner, self.rpc, &self.config.deploy)
            .deploy(&request, chain)
            .await
    }

    async fn fuzz(&self, chain: &ChainHandle, deployment: &DeploymentResult) -> Result<FuzzRun> {
        let project = self.project()?;
        let runner = FuzzRunner::new(self.runner, &self.config.fuzz, &self.config.docker.ityfuzz.tag);
        runner
            .run(&FuzzTarget {
                project_root: &project.root,
                deployment,
                chain,
                deployer: &self.config.deploy.deployer,
            })
            .await
    }

    async fn stop_chain(&self) {
        self.chain.stop().await;
    }
}
