//! Shared data model: tasks, candidate answers, and evaluation results.
//!
//! Every benchmark and system exchanges these records. They are plain serde
//! types so they round-trip through the JSON files of a run directory.

pub mod candidate;
pub mod eval_result;
pub mod task;

pub use candidate::{BrowsingTrace, Candidate, CandidateDetails};
pub use eval_result::{EvalResult, Score};
pub use task::Task;
