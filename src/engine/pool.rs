//! Fixed-size worker pool for per-task jobs.
//!
//! Workers are independent tokio tasks pulling `(index, item)` pairs from a
//! shared queue and sending `(index, result)` back over a channel. Results
//! are slotted back into submission order; completion order is unspecified.
//! A job that panics yields `None` in its slot and never takes the batch
//! down with it.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error};

use super::config::ExecutionMode;

/// Runs `job` over `items` and returns one slot per item, in input order.
pub async fn run_pool<I, R, F, Fut>(items: Vec<I>, mode: ExecutionMode, job: F) -> Vec<Option<R>>
where
    I: Send + 'static,
    R: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    match mode {
        ExecutionMode::Sequential => run_sequential(items, job).await,
        ExecutionMode::Parallel { workers } => run_parallel(items, workers, job).await,
    }
}

async fn run_guarded<R, Fut>(index: usize, fut: Fut) -> Option<R>
where
    Fut: Future<Output = R>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => Some(result),
        Err(_) => {
            error!(job = index, "Job panicked");
            None
        }
    }
}

async fn run_sequential<I, R, F, Fut>(items: Vec<I>, job: F) -> Vec<Option<R>>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = R>,
{
    let mut results = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        results.push(run_guarded(index, job(item)).await);
    }
    results
}

async fn run_parallel<I, R, F, Fut>(items: Vec<I>, workers: usize, job: F) -> Vec<Option<R>>
where
    I: Send + 'static,
    R: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let total = items.len();
    let workers = workers.max(1).min(total.max(1));

    let (work_tx, work_rx) = mpsc::channel::<(usize, I)>(total.max(1));
    for pair in items.into_iter().enumerate() {
        // Capacity covers every item and the receiver is alive.
        if work_tx.send(pair).await.is_err() {
            break;
        }
    }
    drop(work_tx);

    let work_rx = Arc::new(Mutex::new(work_rx));
    let (result_tx, mut result_rx) = mpsc::unbounded_channel::<(usize, Option<R>)>();
    let job = Arc::new(job);

    let mut handles = Vec::with_capacity(workers);
    for worker_id in 0..workers {
        let work_rx = Arc::clone(&work_rx);
        let result_tx = result_tx.clone();
        let job = Arc::clone(&job);

        handles.push(tokio::spawn(async move {
            loop {
                let next = work_rx.lock().await.recv().await;
                let Some((index, item)) = next else {
                    break;
                };
                debug!(worker = worker_id, job = index, "Worker picked up job");
                let result = run_guarded(index, job(item)).await;
                if result_tx.send((index, result)).is_err() {
                    break;
                }
            }
        }));
    }
    drop(result_tx);

    let mut results: Vec<Option<R>> = (0..total).map(|_| None).collect();
    while let Some((index, result)) = result_rx.recv().await {
        if let Some(slot) = results.get_mut(index) {
            *slot = result;
        }
    }

    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "Worker task failed");
        }
    }

    results
}
