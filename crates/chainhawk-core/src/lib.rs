//! chainhawk core
//!
//! Orchestration for smart contract analysis on top of third-party tools:
//!
//! - **Environment preparation**: build-on-demand Docker images ([`docker`])
//! - **Ephemeral chain**: a disposable Anvil node in a container ([`chain`])
//! - **Deployment**: compile + deploy with Foundry, address prediction and
//!   reconciliation ([`deploy`], [`address`], [`json_extract`])
//! - **Fuzzing**: ITYfuzz against the deployed target ([`fuzz`])
//! - **Classification**: map engine output to a verdict ([`verdict`])
//! - **Static analysis**: Semgrep over a source tree ([`static_analysis`])
//!
//! See [`workflow`] for the end-to-end run with guaranteed chain teardown.

pub mod accounts;
pub mod address;
pub mod chain;
pub mod config;
pub mod deploy;
pub mod docker;
pub mod fuzz;
pub mod json_extract;
pub mod process;
pub mod project;
pub mod rpc;
pub mod static_analysis;
pub mod verdict;
pub mod workflow;

pub use config::ChainhawkConfig;
pub use verdict::Verdict;
pub use workflow::{AnalysisOutcome, Stage};
