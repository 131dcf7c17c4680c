//! Benchmark task records.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One benchmark question with a stable identifier and ground truth.
///
/// Tasks are created when a benchmark loads its dataset and are read-only
/// afterwards. The executor works on a private clone so it can point file
/// references at the staged copies in the task's output directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique, run-stable identifier. The on-disk cache is keyed by it.
    pub id: String,
    /// The question or instruction shown to the system.
    pub question: String,
    /// Reference answer used by the benchmark evaluator.
    #[serde(default)]
    pub ground_truth: String,
    /// Split tag (e.g. "validation", "test").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<String>,
    /// Free-form benchmark metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Name of an attached input file or directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Directory holding `file_name`. Defaults to the benchmark data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_dir: Option<PathBuf>,
    /// Start URL or path for browsing tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_path: Option<String>,
}

impl Task {
    /// Creates a task with the required fields.
    pub fn new(
        id: impl Into<String>,
        question: impl Into<String>,
        ground_truth: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            question: question.into(),
            ground_truth: ground_truth.into(),
            set: None,
            metadata: HashMap::new(),
            file_name: None,
            file_dir: None,
            url_path: None,
        }
    }

    /// Sets the split tag.
    pub fn with_set(mut self, set: impl Into<String>) -> Self {
        self.set = Some(set.into());
        self
    }

    /// Attaches an input file located in `dir`.
    pub fn with_file(mut self, file_name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        self.file_name = Some(file_name.into());
        self.file_dir = Some(dir.into());
        self
    }

    /// Sets the browsing start URL.
    pub fn with_url_path(mut self, url: impl Into<String>) -> Self {
        self.url_path = Some(url.into());
        self
    }

    /// Adds a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns true if the task references an input file.
    pub fn has_attachment(&self) -> bool {
        self.file_name.as_deref().is_some_and(|f| !f.is_empty())
    }

    /// Full path of the attached file, resolving a missing `file_dir`
    /// against `default_dir`.
    pub fn attachment_path(&self, default_dir: &Path) -> Option<PathBuf> {
        let name = self.file_name.as_deref().filter(|f| !f.is_empty())?;
        let dir = self.file_dir.as_deref().unwrap_or(default_dir);
        Some(dir.join(name))
    }

    /// Returns true if the task belongs to `split`.
    pub fn in_split(&self, split: &str) -> bool {
        self.set.as_deref() == Some(split)
    }
}

impl TryFrom<serde_json::Value> for Task {
    type Error = serde_json::Error;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        serde_json::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_minimal_task() {
        let task: Task = serde_json::from_str(r#"{"id":"t1","question":"2+2?"}"#).unwrap();
        assert_eq!(task.id, "t1");
        assert_eq!(task.ground_truth, "");
        assert!(task.set.is_none());
        assert!(task.metadata.is_empty());
        assert!(!task.has_attachment());
    }

    #[test]
    fn test_unknown_keys_tolerated() {
        let task: Task = serde_json::from_value(json!({
            "id": "t2",
            "question": "q",
            "ground_truth": "a",
            "set": "test",
            "level": 3
        }))
        .unwrap();
        assert!(task.in_split("test"));
        assert!(!task.in_split("validation"));
    }

    #[test]
    fn test_attachment_path_defaults_to_data_dir() {
        let task = Task::new("t3", "q", "a");
        assert!(task.attachment_path(Path::new("/data")).is_none());

        let mut task = task;
        task.file_name = Some("sheet.xlsx".to_string());
        assert_eq!(
            task.attachment_path(Path::new("/data")),
            Some(PathBuf::from("/data/sheet.xlsx"))
        );

        let task = task.with_file("sheet.xlsx", "/elsewhere");
        assert_eq!(
            task.attachment_path(Path::new("/data")),
            Some(PathBuf::from("/elsewhere/sheet.xlsx"))
        );
    }

    #[test]
    fn test_try_from_raw_mapping() {
        let raw = json!({"id": "t4", "question": "q", "url_path": "https://example.com"});
        let task = Task::try_from(raw).unwrap();
        assert_eq!(task.url_path.as_deref(), Some("https://example.com"));

        assert!(Task::try_from(json!({"question": "no id"})).is_err());
    }
}
