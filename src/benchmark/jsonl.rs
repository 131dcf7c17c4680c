//! JSON Lines benchmarks.
//!
//! Both benchmarks read one [`Task`] JSON object per line from
//! `<data_dir>/<file>`. Blank lines and lines starting with `#` are skipped.
//!
//! - `jsonl_qa` scores a normalized exact match as a scalar 1.0 / 0.0.
//! - `jsonl_web` scores `{exact_match, url_visited}`, where `url_visited`
//!   checks the candidate's browsing trace against the task's `url_path`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Benchmark, Dataset};
use crate::error::BenchmarkError;
use crate::types::{Candidate, EvalResult, Task};

/// Default dataset file name inside the data directory.
pub const DEFAULT_TASK_FILE: &str = "tasks.jsonl";

/// Construction parameters shared by the JSONL benchmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonlParams {
    /// Dataset file name relative to the data directory.
    pub file: String,
    /// URL fetched by `download_dataset` when the file is missing.
    pub source_url: Option<String>,
    /// Split assigned to tasks that carry no `set` tag.
    pub default_split: Option<String>,
    /// HTTP timeout for the download.
    pub download_timeout_secs: u64,
}

impl Default for JsonlParams {
    fn default() -> Self {
        Self {
            file: DEFAULT_TASK_FILE.to_string(),
            source_url: None,
            default_split: None,
            download_timeout_secs: 120,
        }
    }
}

impl JsonlParams {
    /// Parses parameters from a JSON value; `null` yields the defaults.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, BenchmarkError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value.clone()).map_err(|e| BenchmarkError::InvalidParams(e.to_string()))
    }
}

/// Answer normalization used by exact-match scoring.
#[derive(Debug, Clone)]
pub struct AnswerNormalizer {
    punctuation: Regex,
}

impl AnswerNormalizer {
    pub fn new() -> Result<Self, BenchmarkError> {
        let punctuation =
            Regex::new(r"[^\w\s]").map_err(|e| BenchmarkError::InvalidParams(e.to_string()))?;
        Ok(Self { punctuation })
    }

    /// Lowercases, strips punctuation and collapses whitespace.
    pub fn normalize(&self, text: &str) -> String {
        let lowered = text.to_lowercase();
        let stripped = self.punctuation.replace_all(&lowered, " ");
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Returns the exact-match score plus both normalized strings.
    pub fn exact_match(&self, expected: &str, actual: &str) -> (f64, String, String) {
        let expected = self.normalize(expected);
        let actual = self.normalize(actual);
        let score = if expected == actual { 1.0 } else { 0.0 };
        (score, expected, actual)
    }
}

/// Shared JSONL loading and downloading.
#[derive(Debug, Clone)]
struct JsonlSource {
    dataset: Dataset,
    params: JsonlParams,
}

impl JsonlSource {
    fn new(name: &str, data_dir: PathBuf, params: JsonlParams) -> Self {
        Self {
            dataset: Dataset::new(name, data_dir),
            params,
        }
    }

    fn task_file(&self) -> PathBuf {
        self.dataset.data_dir().join(&self.params.file)
    }

    async fn download(&self) -> Result<(), BenchmarkError> {
        let path = self.task_file();
        if tokio::fs::try_exists(&path).await? {
            debug!(benchmark = %self.dataset.name(), path = %path.display(), "Dataset already present");
            return Ok(());
        }

        let url = self.params.source_url.as_deref().ok_or_else(|| {
            BenchmarkError::Download(format!(
                "{} is missing and no source_url is configured",
                path.display()
            ))
        })?;

        info!(benchmark = %self.dataset.name(), url = %url, "Downloading dataset");

        let client = Client::builder()
            .timeout(Duration::from_secs(self.params.download_timeout_secs))
            .build()
            .map_err(|e| BenchmarkError::Download(e.to_string()))?;

        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| BenchmarkError::Download(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BenchmarkError::Download(format!(
                "{} returned status {}",
                url, status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| BenchmarkError::Download(e.to_string()))?;

        tokio::fs::create_dir_all(self.dataset.data_dir()).await?;
        tokio::fs::write(&path, &body).await?;

        info!(
            benchmark = %self.dataset.name(),
            bytes = body.len(),
            path = %path.display(),
            "Dataset downloaded"
        );
        Ok(())
    }

    async fn load(&mut self) -> Result<(), BenchmarkError> {
        let path = self.task_file();
        let mut tasks = read_tasks(&path).await?;
        if let Some(split) = &self.params.default_split {
            for task in tasks.iter_mut().filter(|t| t.set.is_none()) {
                task.set = Some(split.clone());
            }
        }

        self.dataset.set_tasks(tasks)?;
        info!(
            benchmark = %self.dataset.name(),
            tasks = self.dataset.len(),
            splits = ?self.dataset.splits(),
            "Dataset loaded"
        );
        Ok(())
    }
}

/// Reads a JSONL task file.
pub async fn read_tasks(path: &Path) -> Result<Vec<Task>, BenchmarkError> {
    let content = tokio::fs::read_to_string(path).await?;
    parse_tasks(&content, &path.display().to_string())
}

/// Parses JSONL task records; `origin` names the source in errors.
pub fn parse_tasks(content: &str, origin: &str) -> Result<Vec<Task>, BenchmarkError> {
    let mut tasks = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let task: Task = serde_json::from_str(line).map_err(|e| BenchmarkError::InvalidRecord {
            path: origin.to_string(),
            line: idx + 1,
            reason: e.to_string(),
        })?;
        tasks.push(task);
    }
    Ok(tasks)
}

/// Question-answering benchmark scored by normalized exact match.
pub struct JsonlQaBenchmark {
    source: JsonlSource,
    normalizer: AnswerNormalizer,
}

impl JsonlQaBenchmark {
    pub fn new(
        name: impl Into<String>,
        data_dir: impl Into<PathBuf>,
        params: JsonlParams,
    ) -> Result<Self, BenchmarkError> {
        Ok(Self {
            source: JsonlSource::new(&name.into(), data_dir.into(), params),
            normalizer: AnswerNormalizer::new()?,
        })
    }
}

#[async_trait]
impl Benchmark for JsonlQaBenchmark {
    fn dataset(&self) -> &Dataset {
        &self.source.dataset
    }

    async fn download_dataset(&self) -> Result<(), BenchmarkError> {
        self.source.download().await
    }

    async fn load_dataset(&mut self) -> Result<(), BenchmarkError> {
        self.source.load().await
    }

    fn evaluator(&self, task: &Task, candidate: &Candidate) -> Result<EvalResult, BenchmarkError> {
        let (score, expected, actual) = self
            .normalizer
            .exact_match(&task.ground_truth, &candidate.answer);
        Ok(EvalResult::scalar(score)
            .with_metadata("normalized_ground_truth", expected.into())
            .with_metadata("normalized_answer", actual.into()))
    }
}

/// Browsing benchmark scored on the answer and on the visited pages.
pub struct JsonlWebBenchmark {
    source: JsonlSource,
    normalizer: AnswerNormalizer,
}

impl JsonlWebBenchmark {
    pub fn new(
        name: impl Into<String>,
        data_dir: impl Into<PathBuf>,
        params: JsonlParams,
    ) -> Result<Self, BenchmarkError> {
        Ok(Self {
            source: JsonlSource::new(&name.into(), data_dir.into(), params),
            normalizer: AnswerNormalizer::new()?,
        })
    }
}

fn same_url(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}

/// 1.0 if the candidate's trace (or its final page) reached `target`.
fn url_visited(target: Option<&str>, candidate: &Candidate) -> f64 {
    let Some(target) = target else {
        return 0.0;
    };
    let final_url = match &candidate.details {
        crate::types::CandidateDetails::Browsing(trace) => trace.final_url.as_deref(),
        crate::types::CandidateDetails::Text => None,
    };
    let hit = candidate
        .visited_urls()
        .iter()
        .map(String::as_str)
        .chain(final_url)
        .any(|url| same_url(url, target));
    if hit {
        1.0
    } else {
        0.0
    }
}

#[async_trait]
impl Benchmark for JsonlWebBenchmark {
    fn dataset(&self) -> &Dataset {
        &self.source.dataset
    }

    async fn download_dataset(&self) -> Result<(), BenchmarkError> {
        self.source.download().await
    }

    async fn load_dataset(&mut self) -> Result<(), BenchmarkError> {
        self.source.load().await
    }

    fn evaluator(&self, task: &Task, candidate: &Candidate) -> Result<EvalResult, BenchmarkError> {
        let (exact, expected, actual) = self
            .normalizer
            .exact_match(&task.ground_truth, &candidate.answer);
        let visited = url_visited(task.url_path.as_deref(), candidate);

        Ok(
            EvalResult::keyed([("exact_match", exact), ("url_visited", visited)])
                .with_metadata("normalized_ground_truth", expected.into())
                .with_metadata("normalized_answer", actual.into())
                .with_metadata(
                    "pages_visited",
                    serde_json::Value::from(candidate.visited_urls().len()),
                ),
        )
    }
}
