//! Seeded task subsampling.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::EngineError;

/// Number of tasks kept when sampling `fraction` of `total`.
///
/// At least one task is kept from a non-empty universe.
pub fn sample_size(total: usize, fraction: f64) -> usize {
    if total == 0 {
        return 0;
    }
    ((total as f64 * fraction).floor() as usize).clamp(1, total)
}

/// Picks `fraction` of `task_ids` uniformly at random with a seeded RNG.
///
/// `None` returns every id. The selection keeps the input order, so the same
/// seed and universe always yield the same list.
pub fn subsample_task_ids(
    task_ids: &[String],
    fraction: Option<f64>,
    seed: u64,
) -> Result<Vec<String>, EngineError> {
    let Some(fraction) = fraction else {
        return Ok(task_ids.to_vec());
    };

    if !(fraction > 0.0 && fraction <= 1.0) {
        return Err(EngineError::InvalidSubsample(fraction));
    }

    let n = sample_size(task_ids.len(), fraction);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut indices: Vec<usize> = (0..task_ids.len()).collect();
    indices.shuffle(&mut rng);
    indices.truncate(n);
    indices.sort_unstable();

    Ok(indices.into_iter().map(|i| task_ids[i].clone()).collect())
}
