//! Command-line agent system.
//!
//! Runs any CLI agent that accepts a prompt via stdin or a `--prompt`
//! argument. The process runs inside the task output directory and sees the
//! task through environment variables:
//!
//! | Variable | Value |
//! |---|---|
//! | `TASK_ID` | task id |
//! | `TASK_OUTPUT_DIR` | task output directory |
//! | `TASK_FILE` | staged input file, if any |
//! | `TASK_URL` | browsing start URL, if any |
//!
//! Stdout is parsed as a [`Candidate`] JSON object when possible; otherwise
//! the trimmed stdout is the answer.

use std::collections::HashMap;
use std::path::Path;
use std::io::ErrorKind;
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::System;
use crate::error::SystemError;
use crate::types::{Candidate, Task};

/// Construction parameters for [`CommandSystem`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandParams {
    /// Program to run.
    pub command: String,
    /// Arguments passed before the prompt.
    #[serde(default)]
    pub args: Vec<String>,
    /// Pass the prompt on stdin (default) or as `--prompt <text>`.
    #[serde(default = "default_use_stdin")]
    pub use_stdin: bool,
    /// Kill the process after this many seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Extra environment variables.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_use_stdin() -> bool {
    true
}

impl CommandParams {
    pub fn from_value(value: &serde_json::Value) -> Result<Self, SystemError> {
        let params: Self = serde_json::from_value(value.clone())
            .map_err(|e| SystemError::Config(format!("invalid command parameters: {}", e)))?;
        if params.command.trim().is_empty() {
            return Err(SystemError::Config("`command` must not be empty".to_string()));
        }
        Ok(params)
    }
}

/// System backed by an external agent process.
pub struct CommandSystem {
    name: String,
    params: CommandParams,
}

impl CommandSystem {
    pub fn new(name: impl Into<String>, params: CommandParams) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    fn timeout(&self) -> Option<Duration> {
        self.params.timeout_secs.map(Duration::from_secs)
    }

    /// Prompt text sent to the agent.
    pub fn build_prompt(task: &Task) -> String {
        let mut prompt = task.question.clone();
        if let Some(url) = &task.url_path {
            prompt.push_str(&format!("\n\nStart at: {}", url));
        }
        if task.has_attachment() {
            if let (Some(name), Some(dir)) = (&task.file_name, &task.file_dir) {
                prompt.push_str(&format!("\n\nAttached file: {}", dir.join(name).display()));
            }
        }
        prompt
    }

    /// Interprets agent stdout as a candidate.
    pub fn parse_output(stdout: &str) -> Candidate {
        let trimmed = stdout.trim();
        match serde_json::from_str::<Candidate>(trimmed) {
            Ok(candidate) => candidate,
            Err(_) => Candidate::text(trimmed),
        }
    }

    fn build_command(&self, task_id: &str, task: &Task, output_dir: &Path, prompt: &str) -> Command {
        let mut cmd = Command::new(&self.params.command);
        cmd.current_dir(output_dir);
        cmd.args(&self.params.args);

        for (key, value) in &self.params.env {
            cmd.env(key, value);
        }
        cmd.env("TASK_ID", task_id);
        cmd.env("TASK_OUTPUT_DIR", output_dir);
        if let Some(path) = task.attachment_path(output_dir) {
            cmd.env("TASK_FILE", path);
        }
        if let Some(url) = &task.url_path {
            cmd.env("TASK_URL", url);
        }

        if self.params.use_stdin {
            cmd.stdin(Stdio::piped());
        } else {
            cmd.stdin(Stdio::null());
            cmd.arg("--prompt").arg(prompt);
        }

        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }

    /// Spawns the agent, feeds the prompt while collecting its output, and
    /// waits for exit. Dropping the future kills the process.
    async fn exchange(&self, cmd: &mut Command, prompt: String) -> Result<Output, SystemError> {
        let mut child = cmd.spawn().map_err(|e| {
            SystemError::Execution(format!("failed to spawn {}: {}", self.params.command, e))
        })?;

        let writer = match child.stdin.take() {
            Some(mut stdin) if self.params.use_stdin => Some(tokio::spawn(async move {
                stdin.write_all(prompt.as_bytes()).await?;
                stdin.shutdown().await
            })),
            _ => None,
        };

        let output = child.wait_with_output().await?;

        if let Some(writer) = writer {
            match writer.await {
                Ok(Ok(())) => {}
                // The agent closed stdin without reading all of it.
                Ok(Err(e)) if e.kind() == ErrorKind::BrokenPipe => {
                    debug!(command = %self.params.command, "Agent did not consume the full prompt");
                }
                Ok(Err(e)) => {
                    return Err(SystemError::Execution(format!("failed to write prompt: {}", e)));
                }
                Err(e) => {
                    return Err(SystemError::Execution(format!("prompt writer failed: {}", e)));
                }
            }
        }

        Ok(output)
    }
}

#[async_trait]
impl System for CommandSystem {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_answer(
        &self,
        task_id: &str,
        task: &Task,
        output_dir: &Path,
    ) -> Result<Candidate, SystemError> {
        tokio::fs::create_dir_all(output_dir).await?;

        let prompt = Self::build_prompt(task);
        let mut cmd = self.build_command(task_id, task, output_dir, &prompt);
        let start = Instant::now();

        info!(
            task_id = %task_id,
            command = %self.params.command,
            dir = %output_dir.display(),
            "Starting agent process"
        );

        let exchange = self.exchange(&mut cmd, prompt);
        let output = match self.timeout() {
            Some(limit) => match tokio::time::timeout(limit, exchange).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(task_id = %task_id, timeout_secs = limit.as_secs(), "Agent process timed out");
                    return Err(SystemError::Timeout(limit));
                }
            },
            None => exchange.await?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(
            task_id = %task_id,
            exit_code = ?output.status.code(),
            duration_secs = start.elapsed().as_secs_f64(),
            "Agent process finished"
        );

        if !output.status.success() {
            return Err(SystemError::Execution(format!(
                "{} exited with {}: {}",
                self.params.command,
                output.status,
                stderr.trim()
            )));
        }

        let candidate = Self::parse_output(&stdout);
        self.save_answer_to_disk(task_id, &candidate, output_dir).await?;
        Ok(candidate)
    }
}
