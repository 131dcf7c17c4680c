//! Benchmarks: task collections, splits, scoring, and metric aggregation.
//!
//! A benchmark owns a [`Dataset`] (its tasks keyed by id) and knows how to
//! score one candidate against one task. The engine only talks to
//! benchmarks through the [`Benchmark`] trait:
//!
//! ```text
//! download_dataset → load_dataset → get_split_tasks / load_task_by_id
//!                                 → evaluator (per task)
//!                                 → compute_aggregate_metrics[_multiple_runs]
//! ```
//!
//! Task ids are unique and stable across runs because the on-disk result
//! cache is keyed by them.

pub mod aggregate;
pub mod jsonl;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{AggregateError, BenchmarkError};
use crate::types::{Candidate, EvalResult, Task};

pub use aggregate::Metrics;
pub use jsonl::{JsonlQaBenchmark, JsonlWebBenchmark};

/// Task store shared by benchmark implementations.
#[derive(Debug, Clone)]
pub struct Dataset {
    name: String,
    data_dir: PathBuf,
    tasks: BTreeMap<String, Task>,
    loaded: bool,
}

impl Dataset {
    /// Creates an empty, not yet loaded dataset.
    pub fn new(name: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            data_dir: data_dir.into(),
            tasks: BTreeMap::new(),
            loaded: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Replaces the task map. Fails on duplicate ids and on ids that are not
    /// a single path component.
    pub fn set_tasks(&mut self, tasks: Vec<Task>) -> Result<(), BenchmarkError> {
        let mut map = BTreeMap::new();
        for task in tasks {
            if !is_valid_task_id(&task.id) {
                return Err(BenchmarkError::InvalidTaskId(task.id));
            }
            if map.contains_key(&task.id) {
                return Err(BenchmarkError::DuplicateTask(task.id));
            }
            map.insert(task.id.clone(), task);
        }
        self.tasks = map;
        self.loaded = true;
        Ok(())
    }

    pub fn tasks(&self) -> &BTreeMap<String, Task> {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Distinct split tags present in the tasks.
    pub fn splits(&self) -> Vec<String> {
        self.tasks
            .values()
            .filter_map(|t| t.set.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn ensure_loaded(&self) -> Result<(), BenchmarkError> {
        if self.loaded {
            Ok(())
        } else {
            Err(BenchmarkError::DatasetNotLoaded(self.name.clone()))
        }
    }
}

/// Task ids name directories and files under a run directory.
fn is_valid_task_id(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".." && !id.contains(['/', '\\', '\0'])
}

/// A named dataset plus its splits and scoring logic.
#[async_trait]
pub trait Benchmark: Send + Sync {
    /// Task store backing this benchmark.
    fn dataset(&self) -> &Dataset;

    fn name(&self) -> &str {
        self.dataset().name()
    }

    /// Local dataset cache directory.
    fn data_dir(&self) -> &Path {
        self.dataset().data_dir()
    }

    /// Fetches the dataset into `data_dir`. Must be a no-op when the data
    /// is already present.
    async fn download_dataset(&self) -> Result<(), BenchmarkError> {
        Ok(())
    }

    /// Populates the task map. Must run before any split or task lookup.
    async fn load_dataset(&mut self) -> Result<(), BenchmarkError>;

    /// Recognized split names.
    fn splits(&self) -> Vec<String> {
        self.dataset().splits()
    }

    /// Ids of all tasks in `split`, in id order.
    fn get_split_tasks(&self, split: &str) -> Result<Vec<String>, BenchmarkError> {
        let dataset = self.dataset();
        dataset.ensure_loaded()?;

        let available = self.splits();
        if !available.iter().any(|s| s == split) {
            return Err(BenchmarkError::InvalidSplit {
                benchmark: self.name().to_string(),
                split: split.to_string(),
                available,
            });
        }

        Ok(dataset
            .tasks()
            .values()
            .filter(|t| t.in_split(split))
            .map(|t| t.id.clone())
            .collect())
    }

    /// Ids of every task, in id order.
    fn all_task_ids(&self) -> Result<Vec<String>, BenchmarkError> {
        let dataset = self.dataset();
        dataset.ensure_loaded()?;
        Ok(dataset.tasks().keys().cloned().collect())
    }

    fn load_task_by_id(&self, id: &str) -> Option<Task> {
        self.dataset().get(id).cloned()
    }

    /// Scores one candidate. Pure: no side effects beyond computing the score.
    fn evaluator(&self, task: &Task, candidate: &Candidate) -> Result<EvalResult, BenchmarkError>;

    /// Scores raw JSON mappings by converting them to the typed records.
    fn evaluate_raw(
        &self,
        task: serde_json::Value,
        candidate: serde_json::Value,
    ) -> Result<EvalResult, BenchmarkError> {
        let task = Task::try_from(task)?;
        let candidate = Candidate::try_from(candidate)?;
        self.evaluator(&task, &candidate)
    }

    fn compute_aggregate_metrics(&self, scores: &[EvalResult]) -> Result<Metrics, AggregateError> {
        aggregate::aggregate_scores(scores)
    }

    fn compute_aggregate_metrics_multiple_runs(
        &self,
        all_scores: &[Vec<EvalResult>],
        all_durations: &[Vec<f64>],
    ) -> Result<Metrics, AggregateError> {
        aggregate::check_runs(all_scores.len(), all_durations.len())?;
        let per_run = all_scores
            .iter()
            .map(|scores| self.compute_aggregate_metrics(scores))
            .collect::<Result<Vec<_>, _>>()?;
        aggregate::combine_runs(&per_run, all_durations)
    }
}
