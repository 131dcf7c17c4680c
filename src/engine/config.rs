//! Harness configuration.
//!
//! Sources, lowest to highest precedence: defaults, a YAML file, environment
//! variables, then explicit overrides from the caller (the CLI).
//!
//! Benchmarks and systems are described by specs (`kind` + `params`) rather
//! than by live objects. A spec is the complete, serializable constructor
//! input: any worker can rebuild an identical instance from it through the
//! registry.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed YAML configuration file.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Serializable description of a benchmark instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSpec {
    /// Registered benchmark kind, e.g. `jsonl_qa`.
    pub kind: String,
    /// Benchmark name used for the data and run directories. Defaults to `kind`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Kind-specific constructor parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Serializable description of a system instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSpec {
    /// Registered system kind, e.g. `command`.
    pub kind: String,
    /// System name used for the run directory. Defaults to `kind`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Kind-specific constructor parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

macro_rules! impl_spec {
    ($ty:ident) => {
        impl $ty {
            pub fn new(kind: impl Into<String>) -> Self {
                Self {
                    kind: kind.into(),
                    name: None,
                    params: serde_json::Value::Null,
                }
            }

            pub fn with_name(mut self, name: impl Into<String>) -> Self {
                self.name = Some(name.into());
                self
            }

            /// Sets one constructor parameter, turning `params` into an object.
            pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
                if !self.params.is_object() {
                    self.params = serde_json::Value::Object(serde_json::Map::new());
                }
                if let Some(map) = self.params.as_object_mut() {
                    map.insert(key.into(), value);
                }
                self
            }

            /// Name used on disk.
            pub fn display_name(&self) -> &str {
                self.name.as_deref().unwrap_or(&self.kind)
            }
        }
    };
}

impl_spec!(BenchmarkSpec);
impl_spec!(SystemSpec);

impl Default for BenchmarkSpec {
    fn default() -> Self {
        Self::new("jsonl_qa")
    }
}

impl Default for SystemSpec {
    fn default() -> Self {
        Self::new("oracle")
    }
}

/// How tasks of one batch are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One task at a time, in order.
    #[default]
    Sequential,
    /// A fixed pool of independent workers.
    Parallel { workers: usize },
}

impl ExecutionMode {
    /// `Sequential` for `n <= 1`, otherwise a pool of `n` workers.
    pub fn from_workers(n: usize) -> Self {
        if n <= 1 {
            ExecutionMode::Sequential
        } else {
            ExecutionMode::Parallel { workers: n }
        }
    }

    pub fn workers(&self) -> usize {
        match self {
            ExecutionMode::Sequential => 1,
            ExecutionMode::Parallel { workers } => *workers,
        }
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self, ExecutionMode::Parallel { .. })
    }
}

/// Top-level harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Root under which `runs/` is created.
    pub runs_dir: PathBuf,
    /// Root under which `data/<benchmark>/` is created.
    pub benchmark_dir: PathBuf,
    pub benchmark: BenchmarkSpec,
    pub system: SystemSpec,
    /// Worker count; 1 means sequential.
    pub num_workers: usize,
    /// Seed for subsampling.
    pub seed: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            runs_dir: PathBuf::from("."),
            benchmark_dir: PathBuf::from("."),
            benchmark: BenchmarkSpec::default(),
            system: SystemSpec::default(),
            num_workers: 1,
            seed: 42,
        }
    }
}

impl HarnessConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a YAML configuration file. Missing keys take their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Creates configuration from defaults plus environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlays environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `HARNESS_RUNS_DIR`: root of the run directories
    /// - `HARNESS_BENCHMARK_DIR`: root of the dataset cache
    /// - `HARNESS_NUM_WORKERS`: worker count (1 = sequential)
    /// - `HARNESS_SEED`: subsampling seed
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(val) = var("HARNESS_RUNS_DIR") {
            self.runs_dir = PathBuf::from(val);
        }

        if let Some(val) = var("HARNESS_BENCHMARK_DIR") {
            self.benchmark_dir = PathBuf::from(val);
        }

        if let Some(val) = var("HARNESS_NUM_WORKERS") {
            self.num_workers = parse_env_value(&val, "HARNESS_NUM_WORKERS")?;
        }

        if let Some(val) = var("HARNESS_SEED") {
            self.seed = parse_env_value(&val, "HARNESS_SEED")?;
        }

        Ok(())
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.benchmark.kind.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "benchmark.kind cannot be empty".to_string(),
            ));
        }

        if self.system.kind.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "system.kind cannot be empty".to_string(),
            ));
        }

        if self.num_workers == 0 {
            return Err(ConfigError::ValidationFailed(
                "num_workers must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::from_workers(self.num_workers)
    }

    pub fn with_runs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.runs_dir = dir.into();
        self
    }

    pub fn with_benchmark_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.benchmark_dir = dir.into();
        self
    }

    pub fn with_benchmark(mut self, spec: BenchmarkSpec) -> Self {
        self.benchmark = spec;
        self
    }

    pub fn with_system(mut self, spec: SystemSpec) -> Self {
        self.system = spec;
        self
    }

    pub fn with_num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Parameters of one run invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    /// Split to run; `None` runs every task under `all_benchmark`.
    pub split: Option<String>,
    pub run_id: String,
    /// Fraction of tasks to run, in (0, 1].
    pub subsample: Option<f64>,
    pub seed: u64,
    pub mode: ExecutionMode,
    /// Build a fresh system for every task.
    pub reload_system_per_task: bool,
    /// Build and load a fresh benchmark for every task (sequential only).
    pub reload_benchmark_per_task: bool,
}

impl RunRequest {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            split: None,
            run_id: run_id.into(),
            subsample: None,
            seed: 42,
            mode: ExecutionMode::Sequential,
            reload_system_per_task: false,
            reload_benchmark_per_task: false,
        }
    }

    pub fn with_split(mut self, split: impl Into<String>) -> Self {
        self.split = Some(split.into());
        self
    }

    pub fn with_subsample(mut self, fraction: f64, seed: u64) -> Self {
        self.subsample = Some(fraction);
        self.seed = seed;
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_reload_system(mut self, reload: bool) -> Self {
        self.reload_system_per_task = reload;
        self
    }

    pub fn with_reload_benchmark(mut self, reload: bool) -> Self {
        self.reload_benchmark_per_task = reload;
        self
    }
}

/// Parameters of one evaluation invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalRequest {
    pub split: Option<String>,
    /// Runs to evaluate; more than one also writes `aggregate_metrics.json`.
    pub run_ids: Vec<String>,
    pub mode: ExecutionMode,
    /// Recompute scores even when `score.json` exists.
    pub redo_eval: bool,
    pub reload_system_per_task: bool,
    pub reload_benchmark_per_task: bool,
}

impl EvalRequest {
    pub fn new<I, S>(run_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            split: None,
            run_ids: run_ids.into_iter().map(Into::into).collect(),
            mode: ExecutionMode::Sequential,
            redo_eval: false,
            reload_system_per_task: false,
            reload_benchmark_per_task: false,
        }
    }

    pub fn with_split(mut self, split: impl Into<String>) -> Self {
        self.split = Some(split.into());
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_redo_eval(mut self, redo: bool) -> Self {
        self.redo_eval = redo;
        self
    }

    pub fn with_reload_system(mut self, reload: bool) -> Self {
        self.reload_system_per_task = reload;
        self
    }

    pub fn with_reload_benchmark(mut self, reload: bool) -> Self {
        self.reload_benchmark_per_task = reload;
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = HarnessConfig::default();
        assert_eq!(config.num_workers, 1);
        assert_eq!(config.seed, 42);
        assert_eq!(config.benchmark.kind, "jsonl_qa");
        assert_eq!(config.system.kind, "oracle");
        assert_eq!(config.execution_mode(), ExecutionMode::Sequential);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_overrides_defaults() {
        let config = HarnessConfig::from_yaml_str(
            r#"
runs_dir: /tmp/runs
num_workers: 4
benchmark:
  kind: jsonl_web
  name: webqa
  params:
    file: web.jsonl
system:
  kind: command
  params:
    command: ./agent.sh
"#,
        )
        .unwrap();

        assert_eq!(config.runs_dir, PathBuf::from("/tmp/runs"));
        assert_eq!(config.benchmark_dir, PathBuf::from("."));
        assert_eq!(config.benchmark.display_name(), "webqa");
        assert_eq!(config.benchmark.params["file"], "web.jsonl");
        assert_eq!(config.system.display_name(), "command");
        assert_eq!(config.execution_mode(), ExecutionMode::Parallel { workers: 4 });
    }

    #[test]
    fn test_env_overlay() {
        let vars: HashMap<&str, &str> = [
            ("HARNESS_RUNS_DIR", "/data/runs"),
            ("HARNESS_NUM_WORKERS", "8"),
            ("HARNESS_SEED", "7"),
        ]
        .into_iter()
        .collect();

        let mut config = HarnessConfig::default();
        config
            .apply_vars(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.runs_dir, PathBuf::from("/data/runs"));
        assert_eq!(config.num_workers, 8);
        assert_eq!(config.seed, 7);
    }

    #[test]
    fn test_env_invalid_value() {
        let mut config = HarnessConfig::default();
        let err = config
            .apply_vars(|k| (k == "HARNESS_NUM_WORKERS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("HARNESS_NUM_WORKERS"));
    }

    #[test]
    fn test_validation() {
        let config = HarnessConfig::default().with_num_workers(0);
        assert!(config.validate().unwrap_err().to_string().contains("num_workers"));

        let config = HarnessConfig::default().with_system(SystemSpec::new(""));
        assert!(config.validate().unwrap_err().to_string().contains("system.kind"));
    }

    #[test]
    fn test_spec_params() {
        let spec = BenchmarkSpec::new("jsonl_qa")
            .with_param("file", serde_json::json!("a.jsonl"))
            .with_param("default_split", serde_json::json!("test"));
        assert_eq!(spec.params["file"], "a.jsonl");
        assert_eq!(spec.params["default_split"], "test");
        assert_eq!(spec.display_name(), "jsonl_qa");
    }

    #[test]
    fn test_execution_mode_from_workers() {
        assert_eq!(ExecutionMode::from_workers(0), ExecutionMode::Sequential);
        assert_eq!(ExecutionMode::from_workers(1), ExecutionMode::Sequential);
        assert_eq!(
            ExecutionMode::from_workers(3),
            ExecutionMode::Parallel { workers: 3 }
        );
        assert_eq!(ExecutionMode::from_workers(3).workers(), 3);
        assert_eq!(ExecutionMode::default(), ExecutionMode::Sequential);
    }
}
