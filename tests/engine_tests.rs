//! Integration tests for the run/evaluate engine.
//!
//! Benchmarks and systems are in-test doubles that count how often they are
//! invoked, so caching and resumability can be observed directly.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use agent_bench::benchmark::{Benchmark, Dataset};
use agent_bench::engine::layout::{TaskTimes, SCORE_FILE};
use agent_bench::engine::{
    sync_factory, BenchmarkSpec, EvalRequest, ExecutionMode, Harness, HarnessConfig, RunMetrics,
    RunRequest, SystemSpec,
};
use agent_bench::error::{BenchmarkError, EngineError, SystemError};
use agent_bench::registry::Registry;
use agent_bench::system::{answer_path, System};
use agent_bench::types::{Candidate, EvalResult, Task};

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

struct CountingBenchmark {
    dataset: Dataset,
    evaluations: Arc<AtomicUsize>,
    keyed: bool,
}

impl CountingBenchmark {
    fn new(n: usize) -> Self {
        let tasks = (0..n)
            .map(|i| {
                let set = if i % 2 == 0 { "validation" } else { "test" };
                Task::new(format!("task-{:02}", i), format!("question {}", i), format!("answer {}", i))
                    .with_set(set)
            })
            .collect();
        let mut dataset = Dataset::new("counting", "/nonexistent/data");
        dataset.set_tasks(tasks).unwrap();
        Self {
            dataset,
            evaluations: Arc::new(AtomicUsize::new(0)),
            keyed: false,
        }
    }

    fn keyed(mut self) -> Self {
        self.keyed = true;
        self
    }
}

#[async_trait]
impl Benchmark for CountingBenchmark {
    fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    async fn load_dataset(&mut self) -> Result<(), BenchmarkError> {
        Ok(())
    }

    fn evaluator(&self, task: &Task, candidate: &Candidate) -> Result<EvalResult, BenchmarkError> {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        let hit = if task.ground_truth == candidate.answer { 1.0 } else { 0.0 };
        if self.keyed {
            Ok(EvalResult::keyed([("exact", hit), ("nonempty", 1.0)]))
        } else {
            Ok(EvalResult::scalar(hit))
        }
    }
}

/// Answers correctly except for ids listed in `wrong`; fails on `failing`;
/// panics on `panicking`.
#[derive(Default)]
struct CountingSystem {
    calls: Arc<AtomicUsize>,
    wrong: HashSet<String>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
}

impl CountingSystem {
    fn new() -> Self {
        Self::default()
    }

    fn wrong_on(mut self, id: &str) -> Self {
        self.wrong.insert(id.to_string());
        self
    }

    fn failing_on(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    fn panicking_on(mut self, id: &str) -> Self {
        self.panicking.insert(id.to_string());
        self
    }

    fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl System for CountingSystem {
    fn name(&self) -> &str {
        "counting"
    }

    async fn get_answer(
        &self,
        task_id: &str,
        task: &Task,
        output_dir: &Path,
    ) -> Result<Candidate, SystemError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panicking.contains(task_id) {
            panic!("agent crashed on {}", task_id);
        }
        if self.failing.contains(task_id) {
            return Err(SystemError::Execution(format!("model refused {}", task_id)));
        }
        let answer = if self.wrong.contains(task_id) {
            "nope".to_string()
        } else {
            task.ground_truth.clone()
        };
        let candidate = Candidate::text(answer);
        self.save_answer_to_disk(task_id, &candidate, output_dir).await?;
        Ok(candidate)
    }
}

struct Fixture {
    _tmp: TempDir,
    runs_dir: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let runs_dir = tmp.path().to_path_buf();
        Self { _tmp: tmp, runs_dir }
    }

    fn harness(&self, benchmark: CountingBenchmark, system: CountingSystem) -> Harness {
        Harness::new(&self.runs_dir, Arc::new(benchmark), Arc::new(system))
    }
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

// ---------------------------------------------------------------------------
// Execution caching
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_second_run_reuses_cached_answers() {
    let fx = Fixture::new();
    let system = CountingSystem::new();
    let calls = system.calls();
    let harness = fx.harness(CountingBenchmark::new(6), system);
    let request = RunRequest::new("0").with_split("validation");

    let first = harness.run(&request).await.unwrap();
    assert_eq!(first.total, 3);
    assert_eq!(first.succeeded, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let second = harness.run(&request).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(second.outcomes.iter().all(|o| o.cached));

    for (a, b) in first.outcomes.iter().zip(&second.outcomes) {
        assert_eq!(a.task_id, b.task_id);
        assert_eq!(a.candidate, b.candidate);
    }
}

#[tokio::test]
async fn test_restart_skips_finished_tasks_with_original_duration() {
    let fx = Fixture::new();
    let first_system = CountingSystem::new();
    let harness = fx.harness(CountingBenchmark::new(4), first_system);
    let request = RunRequest::new("resume");
    harness.run(&request).await.unwrap();

    let task_dir = harness.layout(None).task_dir("resume", "task-01");
    let times = TaskTimes::load(&task_dir).await.unwrap();

    // A new process: fresh instances, same directories.
    let restarted_system = CountingSystem::new();
    let calls = restarted_system.calls();
    let harness = fx.harness(CountingBenchmark::new(4), restarted_system);
    let summary = harness.run(&request).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(summary.succeeded, 4);
    let outcome = summary
        .outcomes
        .iter()
        .find(|o| o.task_id == "task-01")
        .unwrap();
    assert!(outcome.cached);
    assert_eq!(outcome.duration, times.duration);
}

#[tokio::test]
async fn test_corrupt_answer_is_rerun() {
    let fx = Fixture::new();
    let system = CountingSystem::new();
    let calls = system.calls();
    let harness = fx.harness(CountingBenchmark::new(2), system);
    let request = RunRequest::new("0");
    harness.run(&request).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let task_dir = harness.layout(None).task_dir("0", "task-00");
    let answer = answer_path("task-00", &task_dir);
    std::fs::write(&answer, "{\"answer\": ").unwrap();
    std::fs::write(task_dir.join("notes.txt"), "stale").unwrap();

    let summary = harness.run(&request).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(summary.succeeded, 2);

    let repaired: Candidate = serde_json::from_str(&read(&answer)).unwrap();
    assert_eq!(repaired.answer, "answer 0");
    assert!(!task_dir.join("notes.txt").exists());
    assert!(task_dir.exists());
}

#[tokio::test]
async fn test_missing_times_file_is_rerun() {
    let fx = Fixture::new();
    let system = CountingSystem::new();
    let calls = system.calls();
    let harness = fx.harness(CountingBenchmark::new(2), system);
    let request = RunRequest::new("0");
    harness.run(&request).await.unwrap();

    let task_dir = harness.layout(None).task_dir("0", "task-01");
    std::fs::remove_file(task_dir.join("times.json")).unwrap();

    harness.run(&request).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(TaskTimes::load(&task_dir).await.is_some());
}

// ---------------------------------------------------------------------------
// Failure isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_failing_task_does_not_abort_batch() {
    let fx = Fixture::new();
    let system = CountingSystem::new().failing_on("task-02");
    let harness = fx.harness(CountingBenchmark::new(4), system);

    let summary = harness.run(&RunRequest::new("0")).await.unwrap();
    assert_eq!(summary.total, 4);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 1);

    let failed = &summary.outcomes[2];
    assert_eq!(failed.task_id, "task-02");
    assert!(failed.candidate.is_none());
    assert_eq!(failed.duration, 0.0);
}

#[tokio::test]
async fn test_panicking_system_is_contained_in_parallel() {
    let fx = Fixture::new();
    let system = CountingSystem::new().panicking_on("task-01");
    let harness = fx.harness(CountingBenchmark::new(6), system);

    let request = RunRequest::new("0").with_mode(ExecutionMode::Parallel { workers: 3 });
    let summary = harness.run(&request).await.unwrap();

    assert_eq!(summary.failed, 1);
    let ids: Vec<&str> = summary.outcomes.iter().map(|o| o.task_id.as_str()).collect();
    assert_eq!(
        ids,
        vec!["task-00", "task-01", "task-02", "task-03", "task-04", "task-05"]
    );
    assert!(summary.outcomes[1].candidate.is_none());
}

#[tokio::test]
async fn test_parallel_and_sequential_agree() {
    let fx = Fixture::new();
    let harness = fx.harness(CountingBenchmark::new(8), CountingSystem::new().wrong_on("task-03"));

    harness
        .run(&RunRequest::new("seq").with_mode(ExecutionMode::Sequential))
        .await
        .unwrap();
    harness
        .run(&RunRequest::new("par").with_mode(ExecutionMode::Parallel { workers: 4 }))
        .await
        .unwrap();

    let report = harness
        .evaluate(&EvalRequest::new(["seq", "par"]))
        .await
        .unwrap();
    assert_eq!(report.runs[0].metrics.scores, report.runs[1].metrics.scores);
    assert_eq!(report.runs[0].metrics.metrics["mean_score"], 7.0 / 8.0);
}

// ---------------------------------------------------------------------------
// Structural errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_invalid_subsample_aborts_before_execution() {
    let fx = Fixture::new();
    let system = CountingSystem::new();
    let calls = system.calls();
    let harness = fx.harness(CountingBenchmark::new(4), system);

    for fraction in [0.0, 1.5] {
        let err = harness
            .run(&RunRequest::new("0").with_subsample(fraction, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidSubsample(_)));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invalid_split_aborts() {
    let fx = Fixture::new();
    let harness = fx.harness(CountingBenchmark::new(4), CountingSystem::new());
    let err = harness
        .run(&RunRequest::new("0").with_split("train"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Benchmark(BenchmarkError::InvalidSplit { .. })
    ));
}

#[tokio::test]
async fn test_evaluate_missing_run_fails() {
    let fx = Fixture::new();
    let harness = fx.harness(CountingBenchmark::new(2), CountingSystem::new());
    harness.run(&RunRequest::new("0")).await.unwrap();

    let err = harness
        .evaluate(&EvalRequest::new(["0", "never-ran"]))
        .await
        .unwrap_err();
    match err {
        EngineError::MissingRunOutput(path) => assert!(path.ends_with("never-ran")),
        other => panic!("unexpected error: {other}"),
    }
    // Nothing was written for the existing run either.
    assert!(!harness.layout(None).metrics_path("0").exists());
}

#[tokio::test]
async fn test_run_with_no_successes_cannot_be_aggregated() {
    let fx = Fixture::new();
    let system = CountingSystem::new()
        .failing_on("task-00")
        .failing_on("task-01");
    let harness = fx.harness(CountingBenchmark::new(2), system);
    harness.run(&RunRequest::new("0")).await.unwrap();

    let err = harness.evaluate(&EvalRequest::new(["0"])).await.unwrap_err();
    assert!(matches!(err, EngineError::NoSuccessfulTasks(id) if id == "0"));
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_evaluation_is_cached_unless_redo() {
    let fx = Fixture::new();
    let benchmark = CountingBenchmark::new(4);
    let evaluations = Arc::clone(&benchmark.evaluations);
    let harness = fx.harness(benchmark, CountingSystem::new().wrong_on("task-00"));
    harness.run(&RunRequest::new("0")).await.unwrap();

    let request = EvalRequest::new(["0"]);
    harness.evaluate(&request).await.unwrap();
    assert_eq!(evaluations.load(Ordering::SeqCst), 4);

    let score_path = harness.layout(None).task_dir("0", "task-00").join(SCORE_FILE);
    let before = read(&score_path);

    let report = harness.evaluate(&request).await.unwrap();
    assert_eq!(evaluations.load(Ordering::SeqCst), 4);
    assert_eq!(read(&score_path), before);
    assert!(report.runs[0].tasks.iter().all(|t| t.cached));

    harness
        .evaluate(&request.clone().with_redo_eval(true))
        .await
        .unwrap();
    assert_eq!(evaluations.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn test_metrics_file_contents() {
    let fx = Fixture::new();
    let system = CountingSystem::new().wrong_on("task-02").failing_on("task-04");
    let harness = fx.harness(CountingBenchmark::new(6), system);
    harness
        .run(&RunRequest::new("0").with_split("validation"))
        .await
        .unwrap();

    let report = harness
        .evaluate(&EvalRequest::new(["0"]).with_split("validation"))
        .await
        .unwrap();
    assert!(report.aggregate.is_none());

    let run = &report.runs[0];
    assert_eq!(run.scored, 2);
    assert_eq!(run.failed, 1);

    let path = harness.layout(Some("validation")).metrics_path("0");
    let on_disk: RunMetrics = serde_json::from_str(&read(&path)).unwrap();
    assert_eq!(on_disk, run.metrics);
    assert_eq!(on_disk.metrics["num_tasks"], 2.0);
    assert_eq!(on_disk.metrics["mean_score"], 0.5);
    assert_eq!(on_disk.metrics["max_score"], 1.0);
    assert!(on_disk.average_time >= 0.0);

    let ids: Vec<&str> = on_disk.scores.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["task-00", "task-02"]);
    assert!(!harness.layout(Some("validation")).aggregate_metrics_path().exists());
}

#[tokio::test]
async fn test_multi_run_aggregate_written_at_split_level() {
    let fx = Fixture::new();
    let runs_dir = fx.runs_dir.clone();

    // Run "a" gets one task wrong, run "b" gets everything right.
    let harness = fx.harness(CountingBenchmark::new(4).keyed(), CountingSystem::new().wrong_on("task-00"));
    harness.run(&RunRequest::new("a")).await.unwrap();
    let harness = Harness::new(
        &runs_dir,
        Arc::new(CountingBenchmark::new(4).keyed()),
        Arc::new(CountingSystem::new()),
    );
    harness.run(&RunRequest::new("b")).await.unwrap();

    let report = harness
        .evaluate(&EvalRequest::new(["a", "b"]).with_mode(ExecutionMode::Parallel { workers: 2 }))
        .await
        .unwrap();

    let aggregate = report.aggregate.unwrap();
    assert_eq!(aggregate["mean_score_exact"], (0.75 + 1.0) / 2.0);
    assert_eq!(aggregate["max_score_exact"], 1.0);
    assert_eq!(aggregate["mean_score_nonempty"], 1.0);
    assert_eq!(aggregate["num_tasks"], 4.0);
    assert!(aggregate.contains_key("average_time"));

    let layout = harness.layout(None);
    assert!(layout.metrics_path("a").exists());
    assert!(layout.metrics_path("b").exists());
    let on_disk: agent_bench::Metrics =
        serde_json::from_str(&read(&layout.aggregate_metrics_path())).unwrap();
    assert_eq!(on_disk, aggregate);
}

#[tokio::test]
async fn test_evaluation_reports_missing_candidate_without_aborting() {
    let fx = Fixture::new();
    let harness = fx.harness(CountingBenchmark::new(3), CountingSystem::new());
    harness.run(&RunRequest::new("0")).await.unwrap();

    let task_dir = harness.layout(None).task_dir("0", "task-01");
    std::fs::remove_file(answer_path("task-01", &task_dir)).unwrap();

    let report = harness.evaluate(&EvalRequest::new(["0"])).await.unwrap();
    let run = &report.runs[0];
    assert_eq!(run.scored, 2);
    assert_eq!(run.failed, 1);
    let missing = run.tasks.iter().find(|t| t.task_id == "task-01").unwrap();
    assert!(missing.result.is_none());
    assert!(missing.duration >= 0.0);
}

// ---------------------------------------------------------------------------
// Subsampling and instance policy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_subsample_is_deterministic_per_seed() {
    let fx = Fixture::new();
    let harness = fx.harness(CountingBenchmark::new(20), CountingSystem::new());

    let a = harness
        .run(&RunRequest::new("a").with_subsample(0.25, 7))
        .await
        .unwrap();
    let b = harness
        .run(&RunRequest::new("b").with_subsample(0.25, 7))
        .await
        .unwrap();

    let ids = |s: &agent_bench::engine::RunSummary| -> Vec<String> {
        s.outcomes.iter().map(|o| o.task_id.clone()).collect()
    };
    assert_eq!(a.total, 5);
    assert_eq!(ids(&a), ids(&b));
}

#[tokio::test]
async fn test_reload_policies() {
    let fx = Fixture::new();
    let builds = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&builds);

    let harness = fx
        .harness(CountingBenchmark::new(4), CountingSystem::new())
        .with_benchmark_factory(sync_factory(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(CountingBenchmark::new(4)) as Arc<dyn Benchmark>)
        }));

    // Sequential: one fresh benchmark per task.
    harness
        .run(&RunRequest::new("seq").with_reload_benchmark(true))
        .await
        .unwrap();
    assert_eq!(builds.load(Ordering::SeqCst), 4);

    // Parallel: downgraded to the shared instance.
    harness
        .run(
            &RunRequest::new("par")
                .with_mode(ExecutionMode::Parallel { workers: 2 })
                .with_reload_benchmark(true),
        )
        .await
        .unwrap();
    assert_eq!(builds.load(Ordering::SeqCst), 4);

    // No system factory registered.
    let err = harness
        .run(&RunRequest::new("x").with_reload_system(true))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ReloadUnavailable("system")));
}

// ---------------------------------------------------------------------------
// End to end through the registry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_registry_end_to_end_with_builtins() {
    let tmp = TempDir::new().unwrap();
    let data_dir = tmp.path().join("bench").join("data").join("trivia");
    std::fs::create_dir_all(&data_dir).unwrap();
    std::fs::write(
        data_dir.join("tasks.jsonl"),
        concat!(
            "{\"id\":\"q1\",\"question\":\"Capital of France?\",\"ground_truth\":\"Paris\",\"set\":\"validation\"}\n",
            "{\"id\":\"q2\",\"question\":\"2+2?\",\"ground_truth\":\"4\",\"set\":\"validation\"}\n",
            "{\"id\":\"q3\",\"question\":\"Largest ocean?\",\"ground_truth\":\"Pacific\",\"set\":\"test\"}\n",
        ),
    )
    .unwrap();

    let config = HarnessConfig::default()
        .with_runs_dir(tmp.path().join("out"))
        .with_benchmark_dir(tmp.path().join("bench"))
        .with_benchmark(BenchmarkSpec::new("jsonl_qa").with_name("trivia"))
        .with_system(SystemSpec::new("oracle"));

    let harness = Harness::from_config(Arc::new(Registry::builtin()), &config)
        .await
        .unwrap();

    let summary = harness
        .run(
            &RunRequest::new("0")
                .with_split("validation")
                .with_reload_system(true)
                .with_reload_benchmark(true),
        )
        .await
        .unwrap();
    assert_eq!(summary.succeeded, 2);
    assert!(tmp
        .path()
        .join("out/runs/oracle/trivia/validation/0/q1/q1_answer.json")
        .exists());

    let report = harness
        .evaluate(&EvalRequest::new(["0"]).with_split("validation"))
        .await
        .unwrap();
    assert_eq!(report.runs[0].metrics.metrics["mean_score"], 1.0);
    assert!(tmp
        .path()
        .join("out/runs/oracle/trivia/validation/0/metrics.json")
        .exists());
}
