//! Semgrep static analysis in a container.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::DockerConfig;
use crate::docker::{ContainerRuntime, DOCKER};
use crate::process::{CommandRunner, CommandSpec};
use crate::verdict::Verdict;
use crate::workflow::AnalysisOutcome;

/// Where rules come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RulesSource {
    /// Local directory; `files` are the rule file names inside it.
    Directory { dir: PathBuf, files: Vec<String> },
    File(PathBuf),
    /// Passed to `--config` verbatim (e.g. `auto`, `p/solidity`).
    Registry(String),
}

fn is_rule_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yml") | Some("yaml")
    )
}

fn looks_like_path(rules: &str) -> bool {
    (rules.contains('/') && !rules.starts_with("p/") && !rules.starts_with("r/"))
        || rules.contains('\\')
        || is_rule_file(Path::new(rules))
}

impl RulesSource {
    pub fn resolve(rules: &str) -> Result<Self> {
        let path = Path::new(rules);
        if path.is_dir() {
            let mut files = fs::read_dir(path)
                .with_context(|| format!("read rules dir {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_rule_file(p))
                .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .collect::<Vec<_>>();
            files.sort();
            if files.is_empty() {
                return Err(anyhow!("no .yml/.yaml rule files in {}", path.display()));
            }
            return Ok(Self::Directory {
                dir: path.to_path_buf(),
                files,
            });
        }
        if path.is_file() {
            return Ok(Self::File(path.to_path_buf()));
        }
        if looks_like_path(rules) {
            return Err(anyhow!("rules path not found: {}", rules));
        }
        Ok(Self::Registry(rules.to_string()))
    }

    /// `(docker -v mount, semgrep --config values)`.
    fn mount_and_configs(&self) -> Result<(Option<String>, Vec<String>)> {
        Ok(match self {
            Self::Directory { dir, files } => {
                let abs = fs::canonicalize(dir).with_context(|| format!("resolve {}", dir.display()))?;
                let configs = files.iter().map(|f| format!("/rules/{}", f)).collect();
                (Some(format!("{}:/rules", abs.display())), configs)
            }
            Self::File(file) => {
                let abs = fs::canonicalize(file).with_context(|| format!("resolve {}", file.display()))?;
                let name = abs
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| anyhow!("rules file has no name: {}", file.display()))?;
                (
                    Some(format!("{}:/rules/{}", abs.display(), name)),
                    vec![format!("/rules/{}", name)],
                )
            }
            Self::Registry(config) => (None, vec![config.clone()]),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SemgrepReport {
    #[serde(default)]
    pub results: Vec<SemgrepFinding>,
    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SemgrepFinding {
    pub check_id: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub start: Option<Position>,
    #[serde(default)]
    pub extra: FindingExtra,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Position {
    pub line: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FindingExtra {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub severity: String,
}

impl SemgrepFinding {
    /// `check-id src/File.sol:12 [ERROR] message`, with the `/src` mount prefix stripped.
    pub fn summary(&self) -> String {
        let path = self.path.strip_prefix("/src/").unwrap_or(&self.path);
        let location = match self.start {
            Some(pos) => format!("{}:{}", path, pos.line),
            None => path.to_string(),
        };
        let mut line = format!("{} {}", self.check_id, location);
        if !self.extra.severity.is_empty() {
            line.push_str(&format!(" [{}]", self.extra.severity));
        }
        let message = self.extra.message.trim();
        if !message.is_empty() {
            line.push_str(&format!(" {}", message));
        }
        line
    }
}

pub fn parse_report(stdout: &str) -> Result<SemgrepReport> {
    serde_json::from_str(stdout.trim()).context("semgrep output is not valid JSON")
}

/// Map a parsed report to an outcome.
pub fn report_outcome(report: &SemgrepReport) -> AnalysisOutcome {
    if report.results.is_empty() {
        let mut outcome = AnalysisOutcome::new(Verdict::Completed, "Semgrep completed, no findings");
        if !report.errors.is_empty() {
            outcome
                .warnings
                .push(format!("semgrep reported {} rule/parse errors", report.errors.len()));
        }
        return outcome;
    }
    let mut outcome = AnalysisOutcome::new(
        Verdict::VulnerabilityFound,
        format!("Semgrep reported {} finding(s)", report.results.len()),
    );
    outcome.details = Some(
        report
            .results
            .iter()
            .map(SemgrepFinding::summary)
            .collect::<Vec<_>>()
            .join("\n"),
    );
    outcome
}

pub struct StaticAnalyzer<'a> {
    runtime: ContainerRuntime<'a>,
    docker: &'a DockerConfig,
}

impl<'a> StaticAnalyzer<'a> {
    pub fn new(runner: &'a dyn CommandRunner, docker: &'a DockerConfig) -> Self {
        Self {
            runtime: ContainerRuntime::new(runner),
            docker,
        }
    }

    pub fn command(&self, target: &Path, rules: &RulesSource) -> Result<CommandSpec> {
        let abs = fs::canonicalize(target).with_context(|| format!("resolve {}", target.display()))?;
        let (mount, configs) = rules.mount_and_configs()?;
        let mut spec = CommandSpec::new(DOCKER)
            .args(["run", "--rm", "-v"])
            .arg(format!("{}:/src", abs.display()));
        if let Some(mount) = mount {
            spec = spec.arg("-v").arg(mount);
        }
        spec = spec.arg(&self.docker.semgrep.tag).args(["semgrep", "--json"]);
        for config in configs {
            spec = spec.arg("--config").arg(config);
        }
        Ok(spec.arg("/src"))
    }

    async fn try_run(&self, target: &Path, rules: &str) -> Result<AnalysisOutcome> {
        let rules = RulesSource::resolve(rules)?;
        self.runtime
            .ensure_image(&self.docker.semgrep)
            .await
            .context("semgrep image unavailable")?;
        let spec = self.command(target, &rules)?;
        info!(path = %target.display(), rules = ?rules, "running semgrep");
        let output = self.runtime.run_once(spec).await.context("Failed to run semgrep container")?;
        if !output.is_success() {
            let mut outcome = AnalysisOutcome::new(Verdict::Error, "Semgrep run failed");
            outcome.details = Some(output.failure_text());
            return Ok(outcome);
        }
        let report = parse_report(&output.stdout)?;
        debug!(findings = report.results.len(), errors = report.errors.len(), "semgrep report");
        Ok(report_outcome(&report))
    }

    /// Scan `target` with `rules`. Never fails; errors become an `error` outcome.
    pub async fn run(&self, target: &Path, rules: &str) -> AnalysisOutcome {
        match self.try_run(target, rules).await {
            Ok(outcome) => outcome,
            Err(err) => AnalysisOutcome::failure(None, &err),
        }
    }
}
