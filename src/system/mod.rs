//! Systems under evaluation.
//!
//! A system maps a task to a [`Candidate`] and owns the persistence of its
//! answers: one JSON file per task named `{task_id}_answer.json` inside the
//! task's output directory. `get_answer` must save before returning so a
//! crash after the save still leaves a recoverable answer on disk.

pub mod command;
pub mod oracle;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::SystemError;
use crate::types::{Candidate, Task};

pub use command::{CommandParams, CommandSystem};
pub use oracle::OracleSystem;

/// Suffix of the per-task answer file.
pub const ANSWER_SUFFIX: &str = "_answer.json";

/// Path of the answer file for `task_id` inside `output_dir`.
pub fn answer_path(task_id: &str, output_dir: &Path) -> PathBuf {
    output_dir.join(format!("{}{}", task_id, ANSWER_SUFFIX))
}

/// Writes `candidate` to `{task_id}_answer.json`, creating `output_dir`.
pub async fn save_answer(
    task_id: &str,
    candidate: &Candidate,
    output_dir: &Path,
) -> Result<PathBuf, SystemError> {
    tokio::fs::create_dir_all(output_dir).await?;
    let path = answer_path(task_id, output_dir);
    let json = serde_json::to_string_pretty(candidate)?;
    tokio::fs::write(&path, json).await?;
    debug!(task_id = %task_id, path = %path.display(), "Saved answer");
    Ok(path)
}

/// Reads a saved answer. `Ok(None)` when absent, `Err(Json)` when malformed.
pub async fn load_answer(task_id: &str, output_dir: &Path) -> Result<Option<Candidate>, SystemError> {
    let path = answer_path(task_id, output_dir);
    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&content)?))
}

/// The agent or program under evaluation.
///
/// Implementations hold only serializable configuration so an identical
/// instance can be rebuilt per task from the same parameters.
#[async_trait]
pub trait System: Send + Sync {
    fn name(&self) -> &str;

    /// Produces an answer for `task`, saving it under `output_dir` first.
    async fn get_answer(
        &self,
        task_id: &str,
        task: &Task,
        output_dir: &Path,
    ) -> Result<Candidate, SystemError>;

    async fn save_answer_to_disk(
        &self,
        task_id: &str,
        candidate: &Candidate,
        output_dir: &Path,
    ) -> Result<PathBuf, SystemError> {
        save_answer(task_id, candidate, output_dir).await
    }

    async fn load_answer_from_disk(
        &self,
        task_id: &str,
        output_dir: &Path,
    ) -> Result<Option<Candidate>, SystemError> {
        load_answer(task_id, output_dir).await
    }
}
