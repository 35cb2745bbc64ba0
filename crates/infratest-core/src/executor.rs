//! The subprocess boundary: running the infrastructure tool.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::config::HarnessConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::obs;

/// One invocation of the tool: arguments, working directory and extra environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: BTreeMap<String, String>,
}

impl Invocation {
    pub fn new(args: Vec<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            args,
            working_dir: working_dir.into(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// The subcommand (`init`, `apply`, ...).
    pub fn subcommand(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or("")
    }

    /// Human-readable command line, for logs and errors.
    pub fn command_line(&self, binary: &str) -> String {
        let mut line = binary.to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Captured result of one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit code (-1 when killed by a signal).
    pub exit_code: i32,

    pub stdout: String,

    pub stderr: String,

    pub duration_ms: u64,

    pub finished_at: DateTime<Utc>,
}

impl CommandOutput {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            duration_ms: 0,
            finished_at: Utc::now(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => {
                let mut combined = self.stdout.clone();
                if !combined.ends_with('\n') {
                    combined.push('\n');
                }
                combined.push_str(&self.stderr);
                combined
            }
        }
    }

    /// `Ok(self)` on exit code 0, otherwise a [`HarnessError::ToolInvocation`].
    pub fn into_result(self, command: String) -> HarnessResult<CommandOutput> {
        if self.success() {
            Ok(self)
        } else {
            Err(HarnessError::ToolInvocation {
                command,
                exit_code: self.exit_code,
                attempts: 1,
                output: self.combined(),
            })
        }
    }
}

/// Runs tool invocations. The production implementation is [`TerraformCli`];
/// tests use [`crate::fakes::ScriptedExecutor`].
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run one invocation. A non-zero exit is *not* an error at this level.
    async fn execute(&self, invocation: &Invocation) -> HarnessResult<CommandOutput>;

    /// Name of the binary, for diagnostics.
    fn binary(&self) -> &str;
}

/// Spawns the real tool binary.
#[derive(Debug, Clone)]
pub struct TerraformCli {
    binary: String,
    timeout: Option<Duration>,
}

impl TerraformCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            timeout: None,
        }
    }

    /// Bound every invocation. A zero duration means unbounded.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = if timeout.is_zero() { None } else { Some(timeout) };
        self
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(config.binary.clone())
            .with_timeout(Duration::from_secs(config.command_timeout_secs))
    }
}

impl Default for TerraformCli {
    fn default() -> Self {
        Self::new("terraform")
    }
}

#[async_trait]
impl ToolExecutor for TerraformCli {
    async fn execute(&self, invocation: &Invocation) -> HarnessResult<CommandOutput> {
        let start = Instant::now();
        let command_line = invocation.command_line(&self.binary);
        obs::emit_command_started(&command_line, &invocation.working_dir);

        let child = Command::new(&self.binary)
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HarnessError::ToolInvocation {
                command: command_line.clone(),
                exit_code: -1,
                attempts: 1,
                output: format!("failed to spawn `{}`: {}", self.binary, e),
            })?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| HarnessError::ToolInvocation {
                    command: command_line.clone(),
                    exit_code: -1,
                    attempts: 1,
                    output: format!("timed out after {}ms", limit.as_millis()),
                })??,
            None => child.wait_with_output().await?,
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);
        obs::emit_command_finished(&command_line, exit_code, duration_ms);

        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms,
            finished_at: Utc::now(),
        })
    }

    fn binary(&self) -> &str {
        &self.binary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_command_line() {
        let inv = Invocation::new(
            vec!["init".to_string(), "-backend=false".to_string()],
            "/tmp/aws",
        );
        assert_eq!(inv.subcommand(), "init");
        assert_eq!(inv.command_line("terraform"), "terraform init -backend=false");
    }

    #[test]
    fn test_combined_output() {
        assert_eq!(CommandOutput::new(0, "out", "").combined(), "out");
        assert_eq!(CommandOutput::new(0, "", "err").combined(), "err");
        assert_eq!(CommandOutput::new(0, "out", "err").combined(), "out\nerr");
        assert_eq!(CommandOutput::new(0, "out\n", "err").combined(), "out\nerr");
    }

    #[test]
    fn test_into_result() {
        assert!(CommandOutput::new(0, "ok", "")
            .into_result("terraform init".into())
            .is_ok());

        let err = CommandOutput::new(1, "", "Error: boom")
            .into_result("terraform init".into())
            .unwrap_err();
        match err {
            HarnessError::ToolInvocation {
                exit_code, output, ..
            } => {
                assert_eq!(exit_code, 1);
                assert!(output.contains("boom"));
            }
            other => panic!("expected ToolInvocation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_execute_real_process() {
        let dir = tempfile::tempdir().unwrap();
        let cli = TerraformCli::new("echo");
        let inv = Invocation::new(vec!["hello".to_string()], dir.path());

        let out = cli.execute(&inv).await.unwrap();
        assert!(out.success());
        assert!(out.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_execute_nonzero_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cli = TerraformCli::new("false");
        let out = cli
            .execute(&Invocation::new(vec![], dir.path()))
            .await
            .unwrap();
        assert!(!out.success());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_tool_invocation_error() {
        let dir = tempfile::tempdir().unwrap();
        let cli = TerraformCli::new("/nonexistent-binary-that-does-not-exist");
        let err = cli
            .execute(&Invocation::new(vec!["init".to_string()], dir.path()))
            .await
            .unwrap_err();
        match err {
            HarnessError::ToolInvocation { exit_code, .. } => assert_eq!(exit_code, -1),
            other => panic!("expected ToolInvocation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let cli = TerraformCli::new("sleep").with_timeout(Duration::from_millis(100));
        let err = cli
            .execute(&Invocation::new(vec!["5".to_string()], dir.path()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
