//! Metric aggregation over task scores and across runs.
//!
//! Single run, scalar scores:
//! `mean_score`, `max_score`, `num_tasks`.
//!
//! Single run, keyed scores (`{"a": .., "b": ..}`):
//! `mean_score_a`, `max_score_a`, `mean_score_b`, `max_score_b`, `num_tasks`.
//!
//! Multiple runs: each run is aggregated on its own, then `mean_*` keys are
//! averaged, `max_*` keys take the maximum, every other key is averaged, and
//! `average_time` is the total duration over all runs divided by the number
//! of runs.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::AggregateError;
use crate::types::{EvalResult, Score};

/// Aggregate metrics keyed by metric name.
pub type Metrics = BTreeMap<String, f64>;

/// Key holding the task count of a run.
pub const NUM_TASKS_KEY: &str = "num_tasks";

/// Key holding the average duration in seconds.
pub const AVERAGE_TIME_KEY: &str = "average_time";

/// Aggregates the scores of one run.
pub fn aggregate_scores(scores: &[EvalResult]) -> Result<Metrics, AggregateError> {
    let first = scores.first().ok_or(AggregateError::Empty)?;

    let mut metrics = match &first.score {
        Score::Scalar(_) => aggregate_scalar(scores)?,
        Score::Keyed(keys) => {
            let keys: BTreeSet<&str> = keys.keys().map(String::as_str).collect();
            aggregate_keyed(scores, &keys)?
        }
    };

    metrics.insert(NUM_TASKS_KEY.to_string(), scores.len() as f64);
    Ok(metrics)
}

fn aggregate_scalar(scores: &[EvalResult]) -> Result<Metrics, AggregateError> {
    let mut values = Vec::with_capacity(scores.len());
    for (i, result) in scores.iter().enumerate() {
        match result.score {
            Score::Scalar(v) => values.push(v),
            Score::Keyed(_) => {
                return Err(AggregateError::InconsistentShape(format!(
                    "score {} is keyed but the first score is scalar",
                    i
                )))
            }
        }
    }

    let mut metrics = Metrics::new();
    metrics.insert("mean_score".to_string(), mean(&values));
    metrics.insert("max_score".to_string(), max(&values));
    Ok(metrics)
}

fn aggregate_keyed(
    scores: &[EvalResult],
    keys: &BTreeSet<&str>,
) -> Result<Metrics, AggregateError> {
    let mut columns: BTreeMap<&str, Vec<f64>> = keys.iter().map(|k| (*k, Vec::new())).collect();

    for (i, result) in scores.iter().enumerate() {
        let map = result.score.as_keyed().ok_or_else(|| {
            AggregateError::InconsistentShape(format!(
                "score {} is scalar but the first score is keyed",
                i
            ))
        })?;

        let these: BTreeSet<&str> = map.keys().map(String::as_str).collect();
        if &these != keys {
            return Err(AggregateError::InconsistentShape(format!(
                "score {} has keys {:?}, expected {:?}",
                i, these, keys
            )));
        }

        for (key, value) in map {
            if let Some(column) = columns.get_mut(key.as_str()) {
                column.push(*value);
            }
        }
    }

    let mut metrics = Metrics::new();
    for (key, values) in columns {
        metrics.insert(format!("mean_score_{}", key), mean(&values));
        metrics.insert(format!("max_score_{}", key), max(&values));
    }
    Ok(metrics)
}

/// Checks the preconditions of multi-run aggregation.
pub fn check_runs(num_scores: usize, num_durations: usize) -> Result<(), AggregateError> {
    if num_scores != num_durations {
        return Err(AggregateError::LengthMismatch {
            scores: num_scores,
            durations: num_durations,
        });
    }
    if num_scores < 2 {
        return Err(AggregateError::TooFewRuns(num_scores));
    }
    Ok(())
}

/// Combines per-run metrics into one cross-run metrics map.
///
/// Every run must report the same metric keys.
pub fn combine_runs(
    per_run: &[Metrics],
    all_durations: &[Vec<f64>],
) -> Result<Metrics, AggregateError> {
    check_runs(per_run.len(), all_durations.len())?;

    let keys: BTreeSet<&String> = per_run[0].keys().collect();
    for (i, run) in per_run.iter().enumerate().skip(1) {
        let these: BTreeSet<&String> = run.keys().collect();
        if these != keys {
            return Err(AggregateError::InconsistentShape(format!(
                "run {} reports metrics {:?}, run 0 reports {:?}",
                i, these, keys
            )));
        }
    }

    let mut combined = Metrics::new();
    for key in keys {
        let values: Vec<f64> = per_run.iter().map(|run| run[key]).collect();
        let value = if key.starts_with("max_") {
            max(&values)
        } else {
            mean(&values)
        };
        combined.insert(key.clone(), value);
    }

    let total_time: f64 = all_durations.iter().flatten().sum();
    combined.insert(
        AVERAGE_TIME_KEY.to_string(),
        total_time / all_durations.len() as f64,
    );

    Ok(combined)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}
