//! External process invocation.
//!
//! Every tool chainhawk drives (docker, forge) goes through [`CommandRunner`],
//! so the workflow only ever sees exit code, stdout and stderr.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tracing::debug;

/// A single external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Wall-clock budget. `None` waits for the process to exit.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Whether argv starts with `program` followed by `prefix`.
    pub fn matches(&self, program: &str, prefix: &[&str]) -> bool {
        self.program == program
            && self.args.len() >= prefix.len()
            && self.args.iter().zip(prefix).all(|(a, p)| a == p)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished (or killed) process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal or by the timeout.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    pub fn timed_out(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: None,
            stdout: stdout.into(),
            stderr: stderr.into(),
            timed_out: true,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }

    /// Short failure description: stderr if present, else stdout.
    pub fn failure_text(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.exit_code {
            Some(code) => format!("exited with status {}", code),
            None => "terminated without exit status".to_string(),
        }
    }
}

/// Runs external commands. Spawn failures are errors; non-zero exits are not.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// [`CommandRunner`] backed by real OS processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        debug!(command = %spec, "spawning");
        let mut cmd = tokio::process::Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }

        let child = cmd
            .spawn()
            .with_context(|| format!("failed to execute `{}`", spec.program))?;

        let Some(budget) = spec.timeout else {
            let output = child
                .wait_with_output()
                .await
                .with_context(|| format!("failed to wait for `{}`", spec.program))?;
            return Ok(from_std_output(output));
        };

        collect_with_deadline(child, budget, &spec.program).await
    }
}

fn from_std_output(output: std::process::Output) -> CommandOutput {
    CommandOutput {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        timed_out: false,
    }
}

/// Read both pipes while waiting, so output produced before a timeout kill is kept.
async fn collect_with_deadline(
    mut child: tokio::process::Child,
    budget: Duration,
    program: &str,
) -> Result<CommandOutput> {
    use tokio::io::AsyncReadExt;

    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(pipe) = stdout_pipe.as_mut() {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(pipe) = stderr_pipe.as_mut() {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    });

    let (exit_code, timed_out) = match tokio::time::timeout(budget, child.wait()).await {
        Ok(status) => {
            let status = status.with_context(|| format!("failed to wait for `{}`", program))?;
            (status.code(), false)
        }
        Err(_) => {
            debug!(program, budget_secs = budget.as_secs(), "deadline exceeded, killing");
            let _ = child.kill().await;
            (None, true)
        }
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();
    Ok(CommandOutput {
        exit_code,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        timed_out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_spec_display_and_matches() {
        let spec = CommandSpec::new("docker").args(["images", "-q", "chainhawk-ityfuzz"]);
        assert_eq!(spec.to_string(), "docker images -q chainhawk-ityfuzz");
        assert!(spec.matches("docker", &["images"]));
        assert!(spec.matches("docker", &[]));
        assert!(!spec.matches("docker", &["build"]));
        assert!(!spec.matches("forge", &["images"]));
    }

    #[test]
    fn test_failure_text_prefers_stderr() {
        let out = CommandOutput {
            exit_code: Some(1),
            stdout: "some log".into(),
            stderr: "  boom \n".into(),
            timed_out: false,
        };
        assert_eq!(out.failure_text(), "boom");
        assert_eq!(CommandOutput::failure(2, "").failure_text(), "exited with status 2");
        assert!(!CommandOutput::timed_out("", "").is_success());
        assert!(CommandOutput::success("").is_success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_captures_output() {
        let out = SystemRunner
            .run(&CommandSpec::new("sh").args(["-c", "echo hello; echo oops >&2; exit 3"]))
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
        assert!(!out.timed_out);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_kills_on_timeout_and_keeps_partial_output() {
        let out = SystemRunner
            .run(
                &CommandSpec::new("sh")
                    .args(["-c", "echo started; exec sleep 5"])
                    .timeout(Duration::from_millis(300)),
            )
            .await
            .unwrap();
        assert!(out.timed_out);
        assert_eq!(out.exit_code, None);
        assert_eq!(out.stdout.trim(), "started");
    }

    #[tokio::test]
    async fn test_system_runner_spawn_failure_is_error() {
        let err = SystemRunner
            .run(&CommandSpec::new("definitely-not-a-real-binary-chainhawk"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to execute"));
    }
}
