//! Single-task executor.
//!
//! Produces (or reuses) a candidate for one task id and records its timing:
//!
//! 1. ensure `<run_dir>/<task_id>/` exists
//! 2. resolve the system and benchmark instances (shared or fresh)
//! 3. look the task up by id
//! 4. return the cached answer if both the answer and `times.json` are valid;
//!    a corrupt answer or missing `times.json` clears the task's files
//! 5. copy referenced input files into the task directory
//! 6. call the system, then write `times.json`
//!
//! Every failure is logged and becomes an empty outcome for the task.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use super::layout::TaskTimes;
use crate::benchmark::Benchmark;
use crate::error::{EngineError, TaskError};
use crate::system::System;
use crate::types::{Candidate, Task};

/// Builds a fresh instance on demand.
pub type Factory<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<Arc<T>, EngineError>> + Send + Sync>;

/// Wraps a synchronous constructor as a [`Factory`].
pub fn sync_factory<T, F>(build: F) -> Factory<T>
where
    T: ?Sized + Send + Sync + 'static,
    F: Fn() -> Result<Arc<T>, EngineError> + Send + Sync + 'static,
{
    Arc::new(move || {
        let result = build();
        async move { result }.boxed()
    })
}

/// How a job obtains its system or benchmark.
pub enum Instance<T: ?Sized> {
    /// Reuse one instance for every task.
    Shared(Arc<T>),
    /// Build a new instance for every task.
    Fresh(Factory<T>),
}

impl<T: ?Sized> Clone for Instance<T> {
    fn clone(&self) -> Self {
        match self {
            Instance::Shared(inner) => Instance::Shared(Arc::clone(inner)),
            Instance::Fresh(factory) => Instance::Fresh(Arc::clone(factory)),
        }
    }
}

impl<T: ?Sized + Send + Sync> Instance<T> {
    pub async fn resolve(&self) -> Result<Arc<T>, TaskError> {
        match self {
            Instance::Shared(inner) => Ok(Arc::clone(inner)),
            Instance::Fresh(factory) => factory()
                .await
                .map_err(|e| TaskError::Instance(e.to_string())),
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Instance::Fresh(_))
    }
}

/// Result of executing one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskOutcome {
    pub task_id: String,
    /// `None` when the task failed.
    pub candidate: Option<Candidate>,
    /// Seconds spent in the system; 0 for failed tasks.
    pub duration: f64,
    /// True when the answer came from a previous attempt.
    pub cached: bool,
}

impl TaskOutcome {
    pub fn failed(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            candidate: None,
            duration: 0.0,
            cached: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.candidate.is_some()
    }
}

/// Executes one task. Never fails: errors become [`TaskOutcome::failed`].
pub async fn execute_task(
    task_id: &str,
    run_dir: &Path,
    system: &Instance<dyn System>,
    benchmark: &Instance<dyn Benchmark>,
) -> TaskOutcome {
    match try_execute(task_id, run_dir, system, benchmark).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(task_id = %task_id, error = %e, "Task execution failed");
            TaskOutcome::failed(task_id)
        }
    }
}

async fn try_execute(
    task_id: &str,
    run_dir: &Path,
    system: &Instance<dyn System>,
    benchmark: &Instance<dyn Benchmark>,
) -> Result<TaskOutcome, TaskError> {
    let task_dir = run_dir.join(task_id);
    tokio::fs::create_dir_all(&task_dir).await?;

    let system = system.resolve().await?;
    let benchmark = benchmark.resolve().await?;

    let task = benchmark
        .load_task_by_id(task_id)
        .ok_or_else(|| TaskError::TaskNotFound(task_id.to_string()))?;

    if let Some((candidate, times)) = check_cache(task_id, &task_dir, system.as_ref()).await? {
        debug!(task_id = %task_id, duration_secs = times.duration, "Reusing cached answer");
        return Ok(TaskOutcome {
            task_id: task_id.to_string(),
            candidate: Some(candidate),
            duration: times.duration,
            cached: true,
        });
    }

    let task = stage_inputs(task, &task_dir, benchmark.data_dir()).await?;

    let start = Utc::now();
    let candidate = system.get_answer(task_id, &task, &task_dir).await?;
    let times = TaskTimes::from_span(start, Utc::now());
    times.save(&task_dir).await?;

    info!(task_id = %task_id, duration_secs = times.duration, "Task completed");

    Ok(TaskOutcome {
        task_id: task_id.to_string(),
        candidate: Some(candidate),
        duration: times.duration,
        cached: false,
    })
}

/// Returns the cached answer and timing when both are valid. Otherwise
/// clears stale files as needed and returns `None`.
async fn check_cache(
    task_id: &str,
    task_dir: &Path,
    system: &dyn System,
) -> Result<Option<(Candidate, TaskTimes)>, TaskError> {
    match system.load_answer_from_disk(task_id, task_dir).await {
        Ok(Some(candidate)) => match TaskTimes::load(task_dir).await {
            Some(times) => Ok(Some((candidate, times))),
            None => {
                warn!(task_id = %task_id, "Cached answer has no valid times file, re-running");
                clear_task_files(task_dir).await?;
                Ok(None)
            }
        },
        Ok(None) => Ok(None),
        Err(e) => {
            warn!(task_id = %task_id, error = %e, "Cached answer is corrupt, re-running");
            clear_task_files(task_dir).await?;
            Ok(None)
        }
    }
}

/// Removes the files directly inside `task_dir`, keeping the directory and
/// any subdirectories.
pub async fn clear_task_files(task_dir: &Path) -> std::io::Result<usize> {
    let mut removed = 0;
    let mut entries = tokio::fs::read_dir(task_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            tokio::fs::remove_file(entry.path()).await?;
            removed += 1;
        }
    }
    debug!(dir = %task_dir.display(), removed, "Cleared task files");
    Ok(removed)
}

/// Copies the task's referenced input into `task_dir` and points the task
/// at the copy.
pub async fn stage_inputs(
    mut task: Task,
    task_dir: &Path,
    data_dir: &Path,
) -> Result<Task, TaskError> {
    if !task.has_attachment() {
        return Ok(task);
    }
    let (Some(name), Some(source)) = (task.file_name.clone(), task.attachment_path(data_dir)) else {
        return Ok(task);
    };
    let dest = task_dir.join(&name);

    if source != dest {
        let staging_error = |reason: String| TaskError::Staging {
            path: source.display().to_string(),
            reason,
        };

        let meta = tokio::fs::metadata(&source)
            .await
            .map_err(|e| staging_error(e.to_string()))?;

        if meta.is_dir() {
            let (from, to) = (source.clone(), dest.clone());
            tokio::task::spawn_blocking(move || copy_dir(&from, &to))
                .await
                .map_err(|e| staging_error(e.to_string()))?
                .map_err(|e| staging_error(e.to_string()))?;
        } else {
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(&source, &dest)
                .await
                .map_err(|e| staging_error(e.to_string()))?;
        }
        debug!(task_id = %task.id, from = %source.display(), to = %dest.display(), "Staged input");
    }

    task.file_dir = Some(task_dir.to_path_buf());
    Ok(task)
}

fn copy_dir(source: &Path, dest: &Path) -> std::io::Result<()> {
    for entry in WalkDir::new(source) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(std::io::Error::other)?;
        let target: PathBuf = dest.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
