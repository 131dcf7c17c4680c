//! Single-task evaluator.
//!
//! Scores the cached candidate of one task and writes `score.json`. An
//! existing, parseable `score.json` is returned as-is unless `redo_eval` is
//! set. The duration comes from `times.json`, or -1 when it is unknown.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, error, warn};

use super::executor::Instance;
use super::layout::{TaskTimes, SCORE_FILE};
use crate::benchmark::Benchmark;
use crate::error::TaskError;
use crate::system::System;
use crate::types::EvalResult;

/// Duration reported when `times.json` is absent.
pub const UNKNOWN_DURATION: f64 = -1.0;

/// Result of evaluating one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredTask {
    pub task_id: String,
    /// `None` when the task could not be scored.
    pub result: Option<EvalResult>,
    /// Seconds from `times.json`, or [`UNKNOWN_DURATION`].
    pub duration: f64,
    /// True when the score came from `score.json`.
    pub cached: bool,
}

impl ScoredTask {
    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }

    pub fn has_duration(&self) -> bool {
        self.duration >= 0.0
    }
}

/// Evaluates one task. Never fails: errors yield a `None` result.
pub async fn evaluate_task(
    task_id: &str,
    run_dir: &Path,
    system: &Instance<dyn System>,
    benchmark: &Instance<dyn Benchmark>,
    redo_eval: bool,
) -> ScoredTask {
    let task_dir = run_dir.join(task_id);
    let duration = TaskTimes::load(&task_dir)
        .await
        .map(|t| t.duration)
        .unwrap_or(UNKNOWN_DURATION);

    match try_evaluate(task_id, &task_dir, system, benchmark, redo_eval).await {
        Ok((result, cached)) => ScoredTask {
            task_id: task_id.to_string(),
            result: Some(result),
            duration,
            cached,
        },
        Err(e) => {
            match &e {
                TaskError::NoCandidate(_) => warn!(task_id = %task_id, "No candidate to evaluate"),
                _ => error!(task_id = %task_id, error = %e, "Task evaluation failed"),
            }
            ScoredTask {
                task_id: task_id.to_string(),
                result: None,
                duration,
                cached: false,
            }
        }
    }
}

async fn try_evaluate(
    task_id: &str,
    task_dir: &Path,
    system: &Instance<dyn System>,
    benchmark: &Instance<dyn Benchmark>,
    redo_eval: bool,
) -> Result<(EvalResult, bool), TaskError> {
    if !redo_eval {
        if let Some(result) = load_score(task_dir).await {
            debug!(task_id = %task_id, "Reusing cached score");
            return Ok((result, true));
        }
    }

    let benchmark = benchmark.resolve().await?;
    let task = benchmark
        .load_task_by_id(task_id)
        .ok_or_else(|| TaskError::TaskNotFound(task_id.to_string()))?;

    let system = system.resolve().await?;
    let candidate = match system.load_answer_from_disk(task_id, task_dir).await {
        Ok(Some(candidate)) => candidate,
        Ok(None) => return Err(TaskError::NoCandidate(task_id.to_string())),
        Err(e) => {
            warn!(task_id = %task_id, error = %e, "Cached answer is unreadable");
            return Err(TaskError::NoCandidate(task_id.to_string()));
        }
    };

    let result = benchmark.evaluator(&task, &candidate)?;
    save_score(task_dir, &result).await?;
    Ok((result, false))
}

/// Reads `score.json`; missing or corrupt files read as `None`.
pub async fn load_score(task_dir: &Path) -> Option<EvalResult> {
    let path = task_dir.join(SCORE_FILE);
    let content = tokio::fs::read_to_string(&path).await.ok()?;
    match serde_json::from_str(&content) {
        Ok(result) => Some(result),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring corrupt score file");
            None
        }
    }
}

pub async fn save_score(task_dir: &Path, result: &EvalResult) -> Result<(), TaskError> {
    tokio::fs::create_dir_all(task_dir).await?;
    let json = serde_json::to_string_pretty(result)?;
    tokio::fs::write(task_dir.join(SCORE_FILE), json).await?;
    Ok(())
}
