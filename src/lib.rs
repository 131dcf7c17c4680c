//! agent-bench: evaluation harness for AI agents on benchmark suites.
//!
//! A [`System`] (the agent under test) answers the tasks of a [`Benchmark`]
//! split. Every answer, timing and score is cached on disk under a per-task
//! directory, so runs resume after interruption and evaluation is cheap to
//! repeat. Metrics are aggregated per run and across repeated runs.

pub mod benchmark;
pub mod cli;
pub mod engine;
pub mod error;
pub mod registry;
pub mod system;
pub mod types;

pub use benchmark::{Benchmark, Dataset, Metrics};
pub use engine::{EvalRequest, ExecutionMode, Harness, HarnessConfig, RunRequest};
pub use error::{AggregateError, BenchmarkError, EngineError, SystemError, TaskError};
pub use registry::Registry;
pub use system::System;
pub use types::{Candidate, CandidateDetails, EvalResult, Score, Task};
