//! Script execution against the slonik interpreter.
//!
//! `ScriptRunner` is the seam between planning and the outside world:
//! `SlonikRunner` spawns the real interpreter with the rendered script on
//! stdin; `RecordingRunner` records every script and replays queued
//! outcomes, serving both the test suite and the read-only `plan` mode.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use slonictl_types::{ReconcileError, ReconcileResult};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::Script;

/// Captured result of one interpreter invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ScriptOutput {
    pub fn ok() -> Self {
        Self {
            status: 0,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn failed(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Fold a non-zero exit into the fatal interpreter error, diagnostics
    /// untouched.
    pub fn into_result(self) -> ReconcileResult<ScriptOutput> {
        if self.success() {
            Ok(self)
        } else {
            Err(ReconcileError::Interpreter {
                status: self.status,
                stdout: self.stdout,
                stderr: self.stderr,
            })
        }
    }
}

/// Executes rendered scripts.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Run one script to completion and capture its outcome. A non-zero
    /// exit is returned as a successful `ScriptOutput`, not an error; the
    /// caller decides what a failure aborts.
    async fn run(&self, script: &Script) -> ReconcileResult<ScriptOutput>;
}

/// Production runner spawning the `slonik` binary.
#[derive(Debug, Clone)]
pub struct SlonikRunner {
    binary: PathBuf,
}

impl SlonikRunner {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }
}

impl Default for SlonikRunner {
    fn default() -> Self {
        Self::new("slonik")
    }
}

#[async_trait]
impl ScriptRunner for SlonikRunner {
    async fn run(&self, script: &Script) -> ReconcileResult<ScriptOutput> {
        let rendered = script.render();
        tracing::debug!(
            binary = %self.binary.display(),
            statements = script.statements().len(),
            "dispatching script to slonik"
        );

        let mut child = Command::new(&self.binary)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ReconcileError::Spawn(format!("{}: {}", self.binary.display(), e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ReconcileError::Spawn("stdin unavailable".to_string()))?;
        stdin
            .write_all(rendered.as_bytes())
            .await
            .map_err(|e| ReconcileError::Spawn(format!("writing script: {}", e)))?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ReconcileError::Spawn(format!("waiting for slonik: {}", e)))?;

        let result = ScriptOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        if !result.success() {
            tracing::warn!(status = result.status, "slonik reported failure");
        }
        Ok(result)
    }
}

/// Recording runner: captures every rendered script, replays queued
/// outcomes, and answers success once the queue runs dry.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    outcomes: Mutex<VecDeque<ScriptOutput>>,
    scripts: Mutex<Vec<String>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue outcomes to replay in order.
    pub fn with_outcomes(outcomes: Vec<ScriptOutput>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            scripts: Mutex::new(Vec::new()),
        }
    }

    /// Every script rendered so far, in dispatch order.
    pub fn recorded(&self) -> Vec<String> {
        self.scripts.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.scripts.lock().unwrap().len()
    }
}

#[async_trait]
impl ScriptRunner for RecordingRunner {
    async fn run(&self, script: &Script) -> ReconcileResult<ScriptOutput> {
        self.scripts.lock().unwrap().push(script.render());
        let outcome = self.outcomes.lock().unwrap().pop_front();
        Ok(outcome.unwrap_or_else(ScriptOutput::ok))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slonictl_types::{ClusterName, ConnInfo, NodeId};

    fn script() -> Script {
        Script::new(&ClusterName::parse("replication").unwrap())
            .admin_node(NodeId(1), &ConnInfo::new("db1", "app", "postgres", 5432))
            .statement(crate::Statement::UninstallNode { id: NodeId(1) })
    }

    #[tokio::test]
    async fn test_recording_runner_records_in_order() {
        let runner = RecordingRunner::new();
        runner.run(&script()).await.unwrap();
        runner.run(&script()).await.unwrap();

        let recorded = runner.recorded();
        assert_eq!(recorded.len(), 2);
        assert!(recorded[0].contains("uninstall node (id = 1);"));
        assert_eq!(runner.call_count(), 2);
    }

    #[tokio::test]
    async fn test_recording_runner_replays_outcomes() {
        let runner = RecordingRunner::with_outcomes(vec![
            ScriptOutput::ok(),
            ScriptOutput::failed(255, "set 10 is subscribed"),
        ]);
        assert!(runner.run(&script()).await.unwrap().success());

        let second = runner.run(&script()).await.unwrap();
        assert_eq!(second.status, 255);
        assert!(matches!(
            second.into_result(),
            Err(ReconcileError::Interpreter { status: 255, .. })
        ));
    }

    #[tokio::test]
    async fn test_recording_runner_defaults_to_success() {
        let runner = RecordingRunner::new();
        assert!(runner.run(&script()).await.unwrap().success());
    }

    #[test]
    fn test_script_output_into_result() {
        assert!(ScriptOutput::ok().into_result().is_ok());
        let err = ScriptOutput::failed(1, "boom").into_result().unwrap_err();
        assert!(matches!(err, ReconcileError::Interpreter { status: 1, .. }));
    }
}
