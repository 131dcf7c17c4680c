//! On-disk layout of runs and datasets.
//!
//! ```text
//! <runs_dir>/runs/<system>/<benchmark>/<split | all_benchmark>/<run_id>/
//!     <task_id>/
//!         <task_id>_answer.json
//!         times.json
//!         score.json
//!     metrics.json
//! <runs_dir>/runs/<system>/<benchmark>/<split | all_benchmark>/aggregate_metrics.json
//! <benchmark_dir>/data/<benchmark>/
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Directory under `runs_dir` holding all runs.
pub const RUNS_SUBDIR: &str = "runs";
/// Directory under `benchmark_dir` holding dataset caches.
pub const DATA_SUBDIR: &str = "data";
/// Split directory name used when no split is selected.
pub const ALL_BENCHMARK_SPLIT: &str = "all_benchmark";
pub const TIMES_FILE: &str = "times.json";
pub const SCORE_FILE: &str = "score.json";
pub const METRICS_FILE: &str = "metrics.json";
pub const AGGREGATE_METRICS_FILE: &str = "aggregate_metrics.json";

/// Dataset cache directory of a benchmark.
pub fn benchmark_data_dir(benchmark_dir: &Path, benchmark_name: &str) -> PathBuf {
    benchmark_dir.join(DATA_SUBDIR).join(benchmark_name)
}

/// Paths of one system × benchmark × split combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    split_dir: PathBuf,
}

impl RunLayout {
    pub fn new(
        runs_dir: &Path,
        system_name: &str,
        benchmark_name: &str,
        split: Option<&str>,
    ) -> Self {
        let split_dir = runs_dir
            .join(RUNS_SUBDIR)
            .join(system_name)
            .join(benchmark_name)
            .join(split.unwrap_or(ALL_BENCHMARK_SPLIT));
        Self { split_dir }
    }

    pub fn split_dir(&self) -> &Path {
        &self.split_dir
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.split_dir.join(run_id)
    }

    pub fn task_dir(&self, run_id: &str, task_id: &str) -> PathBuf {
        self.run_dir(run_id).join(task_id)
    }

    pub fn metrics_path(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join(METRICS_FILE)
    }

    pub fn aggregate_metrics_path(&self) -> PathBuf {
        self.split_dir.join(AGGREGATE_METRICS_FILE)
    }
}

/// Contents of `times.json`. Times are Unix epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaskTimes {
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
}

fn epoch_secs(t: DateTime<Utc>) -> f64 {
    t.timestamp_micros() as f64 / 1_000_000.0
}

impl TaskTimes {
    pub fn from_span(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let start_time = epoch_secs(start);
        let end_time = epoch_secs(end);
        Self {
            start_time,
            end_time,
            duration: (end_time - start_time).max(0.0),
        }
    }

    /// Reads `times.json` from `task_dir`. Missing or unparsable files read
    /// as `None`.
    pub async fn load(task_dir: &Path) -> Option<Self> {
        let path = task_dir.join(TIMES_FILE);
        let content = tokio::fs::read_to_string(&path).await.ok()?;
        match serde_json::from_str(&content) {
            Ok(times) => Some(times),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unparsable times file");
                None
            }
        }
    }

    pub async fn save(&self, task_dir: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(task_dir.join(TIMES_FILE), json).await
    }
}
