//! Task execution and evaluation engine.
//!
//! - `config`: harness configuration, run/eval requests, execution modes
//! - `layout`: run directory layout and `times.json`
//! - `sampling`: seeded subsampling of task ids
//! - `pool`: sequential or worker-pool scheduling
//! - `executor` / `evaluator`: cached single-task steps
//! - `orchestrator`: the [`Harness`] tying it together

pub mod config;
pub mod evaluator;
pub mod executor;
pub mod layout;
pub mod orchestrator;
pub mod pool;
pub mod sampling;

pub use config::{
    BenchmarkSpec, ConfigError, EvalRequest, ExecutionMode, HarnessConfig, RunRequest, SystemSpec,
};
pub use evaluator::{evaluate_task, ScoredTask};
pub use executor::{execute_task, sync_factory, Factory, Instance, TaskOutcome};
pub use layout::{RunLayout, TaskTimes};
pub use orchestrator::{EvaluationReport, Harness, RunEvaluation, RunMetrics, RunSummary};
pub use pool::run_pool;
pub use sampling::subsample_task_ids;
