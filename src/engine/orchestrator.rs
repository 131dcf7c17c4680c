//! Run and evaluation orchestration.
//!
//! [`Harness::run`] fans the executor over the task ids of one split;
//! [`Harness::evaluate`] fans the evaluator over one or more finished runs,
//! then writes `metrics.json` per run and, for several runs,
//! `aggregate_metrics.json` at the split level.
//!
//! Structural problems (unknown split, bad subsample fraction, missing run
//! directory) abort before any task starts. Per-task failures never do.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::config::{EvalRequest, ExecutionMode, HarnessConfig, RunRequest};
use super::evaluator::{evaluate_task, ScoredTask};
use super::executor::{execute_task, Factory, Instance, TaskOutcome};
use super::layout::RunLayout;
use super::pool::run_pool;
use super::sampling::subsample_task_ids;
use crate::benchmark::{Benchmark, Metrics};
use crate::error::EngineError;
use crate::registry::Registry;
use crate::system::System;
use crate::types::{EvalResult, Score};

/// Summary of one run invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Mean duration over successful tasks, in seconds.
    pub mean_duration: f64,
    pub outcomes: Vec<TaskOutcome>,
}

impl RunSummary {
    fn from_outcomes(run_id: &str, run_dir: PathBuf, outcomes: Vec<TaskOutcome>) -> Self {
        let durations: Vec<f64> = outcomes
            .iter()
            .filter(|o| o.is_success())
            .map(|o| o.duration)
            .collect();
        let succeeded = durations.len();

        Self {
            run_id: run_id.to_string(),
            run_dir,
            total: outcomes.len(),
            succeeded,
            failed: outcomes.len() - succeeded,
            mean_duration: mean_or_zero(&durations),
            outcomes,
        }
    }
}

/// Contents of a run's `metrics.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Benchmark aggregate metrics, written as top-level keys.
    #[serde(flatten)]
    pub metrics: Metrics,
    /// Mean duration of scored tasks with a known duration.
    pub average_time: f64,
    /// `(task_id, score)` for every scored task.
    pub scores: Vec<(String, Score)>,
}

/// Evaluation outcome of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunEvaluation {
    pub run_id: String,
    pub scored: usize,
    pub failed: usize,
    pub metrics: RunMetrics,
    pub tasks: Vec<ScoredTask>,
}

/// Result of one evaluation invocation.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub runs: Vec<RunEvaluation>,
    /// Cross-run metrics, present when several runs were evaluated.
    pub aggregate: Option<Metrics>,
}

/// Drives runs and evaluations of one benchmark × system pair.
pub struct Harness {
    runs_dir: PathBuf,
    benchmark: Arc<dyn Benchmark>,
    system: Arc<dyn System>,
    benchmark_factory: Option<Factory<dyn Benchmark>>,
    system_factory: Option<Factory<dyn System>>,
}

impl Harness {
    /// Creates a harness around a loaded benchmark and a system.
    ///
    /// Without factories, per-task reloading is unavailable.
    pub fn new(
        runs_dir: impl Into<PathBuf>,
        benchmark: Arc<dyn Benchmark>,
        system: Arc<dyn System>,
    ) -> Self {
        Self {
            runs_dir: runs_dir.into(),
            benchmark,
            system,
            benchmark_factory: None,
            system_factory: None,
        }
    }

    pub fn with_benchmark_factory(mut self, factory: Factory<dyn Benchmark>) -> Self {
        self.benchmark_factory = Some(factory);
        self
    }

    pub fn with_system_factory(mut self, factory: Factory<dyn System>) -> Self {
        self.system_factory = Some(factory);
        self
    }

    /// Builds the benchmark and system described by `config`, with factories
    /// that rebuild them from the same specs.
    pub async fn from_config(
        registry: Arc<Registry>,
        config: &HarnessConfig,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let benchmark: Arc<dyn Benchmark> = Arc::from(
            registry
                .load_benchmark(&config.benchmark, &config.benchmark_dir)
                .await?,
        );
        let system: Arc<dyn System> = Arc::from(registry.create_system(&config.system)?);

        let benchmark_factory: Factory<dyn Benchmark> = {
            let registry = Arc::clone(&registry);
            let spec = config.benchmark.clone();
            let dir = config.benchmark_dir.clone();
            Arc::new(move || {
                let registry = Arc::clone(&registry);
                let spec = spec.clone();
                let dir = dir.clone();
                async move {
                    let benchmark = registry.load_benchmark(&spec, &dir).await?;
                    Ok::<_, EngineError>(Arc::<dyn Benchmark>::from(benchmark))
                }
                .boxed()
            })
        };

        let system_factory: Factory<dyn System> = {
            let spec = config.system.clone();
            Arc::new(move || {
                let result = registry
                    .create_system(&spec)
                    .map(Arc::<dyn System>::from);
                async move { result }.boxed()
            })
        };

        Ok(Self::new(config.runs_dir.clone(), benchmark, system)
            .with_benchmark_factory(benchmark_factory)
            .with_system_factory(system_factory))
    }

    pub fn benchmark(&self) -> &Arc<dyn Benchmark> {
        &self.benchmark
    }

    pub fn system(&self) -> &Arc<dyn System> {
        &self.system
    }

    /// Directory layout for `split` (`None` = whole benchmark).
    pub fn layout(&self, split: Option<&str>) -> RunLayout {
        RunLayout::new(
            &self.runs_dir,
            self.system.name(),
            self.benchmark.name(),
            split,
        )
    }

    fn task_ids(&self, split: Option<&str>) -> Result<Vec<String>, EngineError> {
        Ok(match split {
            Some(split) => self.benchmark.get_split_tasks(split)?,
            None => self.benchmark.all_task_ids()?,
        })
    }

    fn instances(
        &self,
        mode: ExecutionMode,
        reload_system: bool,
        reload_benchmark: bool,
    ) -> Result<(Instance<dyn System>, Instance<dyn Benchmark>), EngineError> {
        let system = if reload_system {
            let factory = self
                .system_factory
                .as_ref()
                .ok_or(EngineError::ReloadUnavailable("system"))?;
            Instance::Fresh(Arc::clone(factory))
        } else {
            Instance::Shared(Arc::clone(&self.system))
        };

        let reload_benchmark = if reload_benchmark && mode.is_parallel() {
            warn!(
                workers = mode.workers(),
                "Per-task benchmark reload is not supported in parallel mode, reusing one instance"
            );
            false
        } else {
            reload_benchmark
        };

        let benchmark = if reload_benchmark {
            let factory = self
                .benchmark_factory
                .as_ref()
                .ok_or(EngineError::ReloadUnavailable("benchmark"))?;
            Instance::Fresh(Arc::clone(factory))
        } else {
            Instance::Shared(Arc::clone(&self.benchmark))
        };

        Ok((system, benchmark))
    }

    /// Executes every selected task of the split under one run id.
    pub async fn run(&self, request: &RunRequest) -> Result<RunSummary, EngineError> {
        let all_ids = self.task_ids(request.split.as_deref())?;
        let task_ids = subsample_task_ids(&all_ids, request.subsample, request.seed)?;
        let (system, benchmark) = self.instances(
            request.mode,
            request.reload_system_per_task,
            request.reload_benchmark_per_task,
        )?;

        let layout = self.layout(request.split.as_deref());
        let run_dir = layout.run_dir(&request.run_id);
        tokio::fs::create_dir_all(&run_dir).await?;

        info!(
            run_id = %request.run_id,
            benchmark = %self.benchmark.name(),
            system = %self.system.name(),
            tasks = task_ids.len(),
            universe = all_ids.len(),
            mode = ?request.mode,
            dir = %run_dir.display(),
            "Starting run"
        );

        let job_dir = run_dir.clone();
        let slots = run_pool(task_ids.clone(), request.mode, move |task_id: String| {
            let run_dir = job_dir.clone();
            let system = system.clone();
            let benchmark = benchmark.clone();
            async move { execute_task(&task_id, &run_dir, &system, &benchmark).await }
        })
        .await;

        let outcomes: Vec<TaskOutcome> = task_ids
            .iter()
            .zip(slots)
            .map(|(id, slot)| slot.unwrap_or_else(|| TaskOutcome::failed(id.clone())))
            .collect();

        let summary = RunSummary::from_outcomes(&request.run_id, run_dir, outcomes);
        info!(
            run_id = %summary.run_id,
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            mean_duration_secs = summary.mean_duration,
            "Run finished"
        );
        Ok(summary)
    }

    /// Scores finished runs and writes their metrics.
    pub async fn evaluate(&self, request: &EvalRequest) -> Result<EvaluationReport, EngineError> {
        let layout = self.layout(request.split.as_deref());

        for run_id in &request.run_ids {
            let run_dir = layout.run_dir(run_id);
            if !tokio::fs::try_exists(&run_dir).await? {
                return Err(EngineError::MissingRunOutput(run_dir));
            }
        }

        let split_ids = self.task_ids(request.split.as_deref())?;
        let (system, benchmark) = self.instances(
            request.mode,
            request.reload_system_per_task,
            request.reload_benchmark_per_task,
        )?;

        let mut runs = Vec::with_capacity(request.run_ids.len());
        for run_id in &request.run_ids {
            let run = self
                .evaluate_run(
                    &layout,
                    run_id,
                    &split_ids,
                    request,
                    system.clone(),
                    benchmark.clone(),
                )
                .await?;
            runs.push(run);
        }

        let aggregate = if runs.len() > 1 {
            let all_scores: Vec<Vec<EvalResult>> = runs
                .iter()
                .map(|run| scored_results(&run.tasks))
                .collect();
            let all_durations: Vec<Vec<f64>> = runs
                .iter()
                .map(|run| known_durations(&run.tasks))
                .collect();

            let metrics = self
                .benchmark
                .compute_aggregate_metrics_multiple_runs(&all_scores, &all_durations)?;
            let path = layout.aggregate_metrics_path();
            write_json(&path, &metrics).await?;
            info!(runs = runs.len(), path = %path.display(), "Wrote cross-run metrics");
            Some(metrics)
        } else {
            None
        };

        Ok(EvaluationReport { runs, aggregate })
    }

    async fn evaluate_run(
        &self,
        layout: &RunLayout,
        run_id: &str,
        split_ids: &[String],
        request: &EvalRequest,
        system: Instance<dyn System>,
        benchmark: Instance<dyn Benchmark>,
    ) -> Result<RunEvaluation, EngineError> {
        let run_dir = layout.run_dir(run_id);
        let task_ids = executed_task_ids(&run_dir, split_ids).await?;

        info!(
            run_id = %run_id,
            tasks = task_ids.len(),
            redo_eval = request.redo_eval,
            mode = ?request.mode,
            "Evaluating run"
        );

        let job_dir = run_dir.clone();
        let redo_eval = request.redo_eval;
        let slots = run_pool(task_ids.clone(), request.mode, move |task_id: String| {
            let run_dir = job_dir.clone();
            let system = system.clone();
            let benchmark = benchmark.clone();
            async move { evaluate_task(&task_id, &run_dir, &system, &benchmark, redo_eval).await }
        })
        .await;

        let tasks: Vec<ScoredTask> = task_ids
            .iter()
            .zip(slots)
            .map(|(id, slot)| {
                slot.unwrap_or_else(|| ScoredTask {
                    task_id: id.clone(),
                    result: None,
                    duration: super::evaluator::UNKNOWN_DURATION,
                    cached: false,
                })
            })
            .collect();

        let results = scored_results(&tasks);
        if results.is_empty() {
            return Err(EngineError::NoSuccessfulTasks(run_id.to_string()));
        }

        let metrics = self.benchmark.compute_aggregate_metrics(&results)?;
        let run_metrics = RunMetrics {
            metrics,
            average_time: mean_or_zero(&known_durations(&tasks)),
            scores: tasks
                .iter()
                .filter_map(|t| t.result.as_ref().map(|r| (t.task_id.clone(), r.score.clone())))
                .collect(),
        };

        write_json(&layout.metrics_path(run_id), &run_metrics).await?;

        let scored = results.len();
        info!(
            run_id = %run_id,
            scored,
            failed = tasks.len() - scored,
            average_time = run_metrics.average_time,
            "Run evaluated"
        );

        Ok(RunEvaluation {
            run_id: run_id.to_string(),
            scored,
            failed: tasks.len() - scored,
            metrics: run_metrics,
            tasks,
        })
    }
}

/// Split task ids that have a directory in `run_dir`, in split order.
async fn executed_task_ids(run_dir: &Path, split_ids: &[String]) -> Result<Vec<String>, EngineError> {
    let mut ids = Vec::with_capacity(split_ids.len());
    for id in split_ids {
        if tokio::fs::try_exists(run_dir.join(id)).await? {
            ids.push(id.clone());
        }
    }
    Ok(ids)
}

fn scored_results(tasks: &[ScoredTask]) -> Vec<EvalResult> {
    tasks.iter().filter_map(|t| t.result.clone()).collect()
}

fn known_durations(tasks: &[ScoredTask]) -> Vec<f64> {
    tasks
        .iter()
        .filter(|t| t.is_success() && t.has_duration())
        .map(|t| t.duration)
        .collect()
}

fn mean_or_zero(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), EngineError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}
