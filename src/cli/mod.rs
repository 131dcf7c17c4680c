//! Command-line interface for agent-bench.
//!
//! Provides commands to list registered kinds, download datasets, run a
//! system over a benchmark split and evaluate finished runs.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli, Commands};
