//! Foundry project discovery.
//!
//! A deployable target is either a Foundry project (`foundry.toml` + `src/`)
//! or a single `.sol` file, which gets scaffolded into a scratch project.

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tempfile::TempDir;
use tracing::{debug, info};

use crate::process::{CommandRunner, CommandSpec};

pub const MANIFEST: &str = "foundry.toml";
pub const SOURCE_DIR: &str = "src";
pub const FORGE: &str = "forge";

static CONTRACT_DECL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*contract\s+([A-Za-z_$][A-Za-z0-9_$]*)").expect("static regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRequest {
    pub project_root: PathBuf,
    pub contract_name: Option<String>,
}

impl DeploymentRequest {
    pub fn new(project_root: impl Into<PathBuf>, contract_name: Option<String>) -> Self {
        Self {
            project_root: project_root.into(),
            contract_name,
        }
    }
}

/// A `contract X` declaration found in the sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCandidate {
    pub name: String,
    /// Relative to the project root.
    pub source: PathBuf,
}

/// Contract chosen for deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractTarget {
    pub name: String,
    pub source: Option<PathBuf>,
    pub warnings: Vec<String>,
}

impl ContractTarget {
    /// Identifier passed to `forge create`: `src/File.sol:Name`, or the bare name.
    pub fn forge_identifier(&self) -> String {
        match &self.source {
            Some(path) => format!("{}:{}", path.to_string_lossy().replace('\\', "/"), self.name),
            None => self.name.clone(),
        }
    }

    /// `out/<File>.sol/<Name>.json`, the compiled artifact forge writes.
    pub fn artifact_path(&self, project_root: &Path) -> Option<PathBuf> {
        let file_name = self.source.as_ref()?.file_name()?;
        Some(
            project_root
                .join("out")
                .join(file_name)
                .join(format!("{}.json", self.name)),
        )
    }
}

/// Fail fast unless `root` looks like a Foundry project.
pub fn validate_project(root: &Path) -> Result<()> {
    if !root.is_dir() {
        return Err(anyhow!("project root is not a directory: {}", root.display()));
    }
    if !root.join(MANIFEST).is_file() {
        return Err(anyhow!(
            "not a Foundry project: {} missing in {}",
            MANIFEST,
            root.display()
        ));
    }
    if !root.join(SOURCE_DIR).is_dir() {
        return Err(anyhow!(
            "not a Foundry project: {}/ directory missing in {}",
            SOURCE_DIR,
            root.display()
        ));
    }
    Ok(())
}

pub fn declared_contracts(source: &str) -> Vec<String> {
    CONTRACT_DECL_RE
        .captures_iter(source)
        .map(|c| c[1].to_string())
        .collect()
}

fn collect_sol_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            collect_sol_files(&path, out)?;
        } else if path.extension().map(|e| e == "sol").unwrap_or(false) {
            out.push(path);
        }
    }
    Ok(())
}

/// All contract declarations under `src/`, ordered by file path.
pub fn scan_contracts(root: &Path) -> Result<Vec<ContractCandidate>> {
    let mut files = Vec::new();
    collect_sol_files(&root.join(SOURCE_DIR), &mut files)?;
    files.sort();

    let mut out = Vec::new();
    for file in files {
        let text = fs::read_to_string(&file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let relative = file.strip_prefix(root).unwrap_or(&file).to_path_buf();
        for name in declared_contracts(&text) {
            out.push(ContractCandidate {
                name,
                source: relative.clone(),
            });
        }
    }
    Ok(out)
}

fn file_stem(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|s| s.to_str())
}

/// Pick the contract to deploy.
///
/// An explicit name wins. Otherwise a lone declaration is used; with several,
/// the one named after its file is used (with a warning) if it is unique, and
/// anything else requires an explicit name.
pub fn resolve_contract(root: &Path, explicit: Option<&str>) -> Result<ContractTarget> {
    let candidates = scan_contracts(root)?;

    if let Some(name) = explicit {
        let source = candidates
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.source.clone());
        let mut warnings = Vec::new();
        if source.is_none() {
            warnings.push(format!(
                "contract {} not found by source scan; letting forge resolve it",
                name
            ));
        }
        return Ok(ContractTarget {
            name: name.to_string(),
            source,
            warnings,
        });
    }

    match candidates.as_slice() {
        [] => Err(anyhow!(
            "no contract declaration found under {}",
            root.join(SOURCE_DIR).display()
        )),
        [only] => Ok(ContractTarget {
            name: only.name.clone(),
            source: Some(only.source.clone()),
            warnings: Vec::new(),
        }),
        many => {
            let names: Vec<&str> = many.iter().map(|c| c.name.as_str()).collect();
            let by_stem: Vec<&ContractCandidate> = many
                .iter()
                .filter(|c| file_stem(&c.source) == Some(c.name.as_str()))
                .collect();
            match by_stem.as_slice() {
                [chosen] => Ok(ContractTarget {
                    name: chosen.name.clone(),
                    source: Some(chosen.source.clone()),
                    warnings: vec![format!(
                        "multiple contracts found ({}); chose {} because it matches its file name. Pass --contract to choose explicitly",
                        names.join(", "),
                        chosen.name
                    )],
                }),
                _ => Err(anyhow!(
                    "multiple contracts found ({}); pass --contract to choose one",
                    names.join(", ")
                )),
            }
        }
    }
}

/// A project ready for `forge`. Scratch projects are deleted on drop.
#[derive(Debug)]
pub struct PreparedProject {
    pub root: PathBuf,
    /// Contract name implied by the target (the file stem of a single `.sol`).
    pub implied_contract: Option<String>,
    scratch: Option<TempDir>,
}

impl PreparedProject {
    pub fn existing(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            implied_contract: None,
            scratch: None,
        }
    }

    pub fn is_scratch(&self) -> bool {
        self.scratch.is_some()
    }
}

/// Turn a CLI target into a Foundry project root.
///
/// Directories are used as-is. A single `.sol` file is copied into a fresh
/// `forge init` project with the template sources removed.
pub async fn prepare_project(runner: &dyn CommandRunner, target: &Path) -> Result<PreparedProject> {
    if target.is_dir() {
        return Ok(PreparedProject::existing(target));
    }
    if !target.is_file() || target.extension().map(|e| e != "sol").unwrap_or(true) {
        return Err(anyhow!(
            "target must be a Foundry project directory or a .sol file: {}",
            target.display()
        ));
    }

    let scratch = tempfile::Builder::new()
        .prefix("chainhawk-deploy-")
        .tempdir()
        .context("create scratch project dir")?;
    let root = scratch.path().to_path_buf();
    info!(file = %target.display(), scratch = %root.display(), "scaffolding project for single source file");

    let init = runner
        .run(
            &CommandSpec::new(FORGE)
                .args(["init", "--no-git", "--force"])
                .arg(root.display().to_string()),
        )
        .await?;
    if !init.is_success() {
        return Err(anyhow!("forge init failed: {}", init.failure_text()));
    }

    for template_dir in ["test", "script", SOURCE_DIR] {
        let dir = root.join(template_dir);
        if dir.exists() {
            fs::remove_dir_all(&dir).with_context(|| format!("remove {}", dir.display()))?;
        }
    }
    let src = root.join(SOURCE_DIR);
    fs::create_dir_all(&src).with_context(|| format!("create {}", src.display()))?;
    let file_name = target
        .file_name()
        .ok_or_else(|| anyhow!("target has no file name: {}", target.display()))?;
    fs::copy(target, src.join(file_name))
        .with_context(|| format!("copy {} into scratch project", target.display()))?;
    if !root.join(MANIFEST).exists() {
        debug!("forge init left no manifest; writing a minimal one");
        fs::write(
            root.join(MANIFEST),
            "[profile.default]\nsrc = \"src\"\nout = \"out\"\nlibs = [\"lib\"]\n",
        )
        .context("write foundry.toml")?;
    }

    let source = fs::read_to_string(target).unwrap_or_default();
    let implied_contract = file_stem(target)
        .filter(|stem| declared_contracts(&source).iter().any(|n| n == stem))
        .map(str::to_string);

    Ok(PreparedProject {
        root,
        implied_contract,
        scratch: Some(scratch),
    })
}
