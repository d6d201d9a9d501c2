#![allow(dead_code)]
//! Scripted fakes for the process and RPC seams.
//!
//! - [`ScriptedRunner`]: answers commands by `program + argv prefix`, records every call
//! - [`ScriptedRpc`]: answers JSON-RPC methods with fixed results or errors
//! - fixtures for Foundry project trees

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chainhawk_core::process::{CommandOutput, CommandRunner, CommandSpec};
use chainhawk_core::rpc::ChainRpc;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

type Hook = Box<dyn Fn(&CommandSpec) -> Result<CommandOutput> + Send + Sync>;

enum Reply {
    Output(CommandOutput),
    SpawnError(String),
    Hook(Hook),
}

struct Rule {
    program: String,
    prefix: Vec<String>,
    reply: Reply,
}

/// First matching rule wins; unmatched commands succeed with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<Rule>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn rule(mut self, program: &str, prefix: &[&str], reply: Reply) -> Self {
        self.rules.push(Rule {
            program: program.to_string(),
            prefix: prefix.iter().map(|s| s.to_string()).collect(),
            reply,
        });
        self
    }

    pub fn on(self, program: &str, prefix: &[&str], output: CommandOutput) -> Self {
        self.rule(program, prefix, Reply::Output(output))
    }

    pub fn spawn_error(self, program: &str, prefix: &[&str], message: &str) -> Self {
        self.rule(program, prefix, Reply::SpawnError(message.to_string()))
    }

    pub fn hook<F>(self, program: &str, prefix: &[&str], hook: F) -> Self
    where
        F: Fn(&CommandSpec) -> Result<CommandOutput> + Send + Sync + 'static,
    {
        self.rule(program, prefix, Reply::Hook(Box::new(hook)))
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, program: &str, prefix: &[&str]) -> Vec<CommandSpec> {
        self.calls()
            .into_iter()
            .filter(|c| c.matches(program, prefix))
            .collect()
    }

    pub fn count(&self, program: &str, prefix: &[&str]) -> usize {
        self.calls_matching(program, prefix).len()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(spec.clone());
        fn prefix_refs(r: &Rule) -> Vec<&str> {
            r.prefix.iter().map(String::as_str).collect()
        }
        let rule = self
            .rules
            .iter()
            .find(|r| spec.matches(&r.program, &prefix_refs(r)));
        match rule.map(|r| &r.reply) {
            Some(Reply::Output(out)) => Ok(out.clone()),
            Some(Reply::SpawnError(msg)) => Err(anyhow!("{}", msg)),
            Some(Reply::Hook(hook)) => hook(spec),
            None => Ok(CommandOutput::success("")),
        }
    }
}

/// Fixed per-method replies. Unknown methods fail like a refused connection.
#[derive(Default)]
pub struct ScriptedRpc {
    replies: HashMap<String, std::result::Result<Value, String>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedRpc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok(mut self, method: &str, result: Value) -> Self {
        self.replies.insert(method.to_string(), Ok(result));
        self
    }

    pub fn err(mut self, method: &str, message: &str) -> Self {
        self.replies.insert(method.to_string(), Err(message.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls().iter().filter(|(m, _)| m == method).count()
    }
}

#[async_trait]
impl ChainRpc for ScriptedRpc {
    async fn call(&self, method: &str, params: Value, _timeout: Duration) -> Result<Value> {
        self.calls.lock().unwrap().push((method.to_string(), params));
        match self.replies.get(method) {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(message)) => Err(anyhow!("{}", message)),
            None => Err(anyhow!("connection refused ({})", method)),
        }
    }
}

/// A Foundry project with `foundry.toml` and the given `src/` files.
pub fn foundry_project(sources: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("foundry.toml"), "[profile.default]\n").unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    for (name, body) in sources {
        write_file(&dir.path().join("src").join(name), body);
    }
    dir
}

pub fn write_file(path: &Path, body: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, body).unwrap();
}

pub const VAULT_SOL: &str = "// SPDX-License-Identifier: MIT\npragma solidity ^0.8.20;\n\ncontract Vault {\n    mapping(address => uint256) public balances;\n}\n";

pub const ANVIL_DEPLOYER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
