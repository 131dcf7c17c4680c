//! Error types for agent-bench operations.
//!
//! Errors are split by the layer that raises them:
//! - Benchmark collaborators (dataset loading, splits, scoring)
//! - Metric aggregation across tasks and runs
//! - System collaborators (answer production and persistence)
//! - Per-task failures caught at the executor/evaluator boundary
//! - Structural engine failures that abort a whole invocation

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::engine::config::ConfigError;

/// Errors raised by a benchmark implementation.
#[derive(Debug, Error)]
pub enum BenchmarkError {
    #[error("Invalid split '{split}' for benchmark '{benchmark}' (available: {})", available.join(", "))]
    InvalidSplit {
        benchmark: String,
        split: String,
        available: Vec<String>,
    },

    #[error("Dataset for benchmark '{0}' has not been loaded")]
    DatasetNotLoaded(String),

    #[error("Duplicate task id '{0}' in dataset")]
    DuplicateTask(String),

    #[error("Task id '{0}' cannot be used as a directory name")]
    InvalidTaskId(String),

    #[error("Dataset download failed: {0}")]
    Download(String),

    #[error("Invalid dataset record at {path}:{line}: {reason}")]
    InvalidRecord {
        path: String,
        line: usize,
        reason: String,
    },

    #[error("Invalid benchmark parameters: {0}")]
    InvalidParams(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while combining per-task scores into metrics.
#[derive(Debug, Error, PartialEq)]
pub enum AggregateError {
    #[error("Cannot aggregate an empty score list")]
    Empty,

    #[error("Inconsistent score shapes: {0}")]
    InconsistentShape(String),

    #[error("Multi-run aggregation needs at least 2 runs, got {0}")]
    TooFewRuns(usize),

    #[error("Got {scores} score lists but {durations} duration lists")]
    LengthMismatch { scores: usize, durations: usize },
}

/// Errors raised by a system under evaluation.
#[derive(Debug, Error)]
pub enum SystemError {
    #[error("System execution failed: {0}")]
    Execution(String),

    #[error("System timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid system configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A failure confined to a single task.
///
/// Produced inside the executor and evaluator, logged, and turned into an
/// empty outcome for that task id. Never aborts a batch.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Task '{0}' not found")]
    TaskNotFound(String),

    #[error("Failed to stage input file '{path}': {reason}")]
    Staging { path: String, reason: String },

    #[error("No candidate answer on disk for task '{0}'")]
    NoCandidate(String),

    #[error("Could not resolve instance: {0}")]
    Instance(String),

    #[error("System error: {0}")]
    System(#[from] SystemError),

    #[error("Benchmark error: {0}")]
    Benchmark(#[from] BenchmarkError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Structural errors that abort a run or evaluation invocation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid subsample fraction {0}: must be in (0, 1]")]
    InvalidSubsample(f64),

    #[error("Run output directory does not exist: {}", .0.display())]
    MissingRunOutput(PathBuf),

    #[error("Unknown benchmark '{name}' (registered: {})", available.join(", "))]
    UnknownBenchmark { name: String, available: Vec<String> },

    #[error("Unknown system '{name}' (registered: {})", available.join(", "))]
    UnknownSystem { name: String, available: Vec<String> },

    #[error("Per-task {0} reload requested but no factory is available")]
    ReloadUnavailable(&'static str),

    #[error("Run '{0}' has no successfully scored tasks to aggregate")]
    NoSuccessfulTasks(String),

    #[error("Benchmark error: {0}")]
    Benchmark(#[from] BenchmarkError),

    #[error("System error: {0}")]
    System(#[from] SystemError),

    #[error("Aggregation error: {0}")]
    Aggregate(#[from] AggregateError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
