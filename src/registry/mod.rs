//! Name → factory registry for benchmarks and systems.
//!
//! Every supported kind is registered explicitly, so the set of benchmarks
//! and systems is enumerable up front and an unknown kind fails before any
//! work starts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::benchmark::jsonl::JsonlParams;
use crate::benchmark::{Benchmark, JsonlQaBenchmark, JsonlWebBenchmark};
use crate::engine::config::{BenchmarkSpec, SystemSpec};
use crate::engine::layout::benchmark_data_dir;
use crate::error::{BenchmarkError, EngineError, SystemError};
use crate::system::{CommandParams, CommandSystem, OracleSystem, System};

/// Builds a benchmark from its name, data directory and parameters.
pub type BenchmarkFactory = Arc<
    dyn Fn(&str, PathBuf, &serde_json::Value) -> Result<Box<dyn Benchmark>, BenchmarkError>
        + Send
        + Sync,
>;

/// Builds a system from its name and parameters.
pub type SystemFactory =
    Arc<dyn Fn(&str, &serde_json::Value) -> Result<Box<dyn System>, SystemError> + Send + Sync>;

/// Registered benchmark and system kinds.
#[derive(Clone, Default)]
pub struct Registry {
    benchmarks: BTreeMap<String, BenchmarkFactory>,
    systems: BTreeMap<String, SystemFactory>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in kinds.
    pub fn builtin() -> Self {
        let mut registry = Self::new();

        registry.register_benchmark("jsonl_qa", |name, data_dir, params| {
            let params = JsonlParams::from_value(params)?;
            Ok(Box::new(JsonlQaBenchmark::new(name, data_dir, params)?) as Box<dyn Benchmark>)
        });
        registry.register_benchmark("jsonl_web", |name, data_dir, params| {
            let params = JsonlParams::from_value(params)?;
            Ok(Box::new(JsonlWebBenchmark::new(name, data_dir, params)?) as Box<dyn Benchmark>)
        });

        registry.register_system("command", |name, params| {
            let params = CommandParams::from_value(params)?;
            Ok(Box::new(CommandSystem::new(name, params)) as Box<dyn System>)
        });
        registry.register_system("oracle", |name, _params| {
            Ok(Box::new(OracleSystem::new(name)) as Box<dyn System>)
        });

        registry
    }

    /// Registers (or replaces) a benchmark kind.
    pub fn register_benchmark<F>(&mut self, kind: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&str, PathBuf, &serde_json::Value) -> Result<Box<dyn Benchmark>, BenchmarkError>
            + Send
            + Sync
            + 'static,
    {
        self.benchmarks.insert(kind.into(), Arc::new(factory));
        self
    }

    /// Registers (or replaces) a system kind.
    pub fn register_system<F>(&mut self, kind: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&str, &serde_json::Value) -> Result<Box<dyn System>, SystemError>
            + Send
            + Sync
            + 'static,
    {
        self.systems.insert(kind.into(), Arc::new(factory));
        self
    }

    pub fn benchmark_names(&self) -> Vec<String> {
        self.benchmarks.keys().cloned().collect()
    }

    pub fn system_names(&self) -> Vec<String> {
        self.systems.keys().cloned().collect()
    }

    /// Constructs a benchmark with data dir `<benchmark_dir>/data/<name>/`.
    /// The dataset is not downloaded or loaded.
    pub fn create_benchmark(
        &self,
        spec: &BenchmarkSpec,
        benchmark_dir: &Path,
    ) -> Result<Box<dyn Benchmark>, EngineError> {
        let factory = self
            .benchmarks
            .get(&spec.kind)
            .ok_or_else(|| EngineError::UnknownBenchmark {
                name: spec.kind.clone(),
                available: self.benchmark_names(),
            })?;

        let name = spec.display_name();
        let data_dir = benchmark_data_dir(benchmark_dir, name);
        debug!(kind = %spec.kind, name = %name, data_dir = %data_dir.display(), "Creating benchmark");
        Ok(factory(name, data_dir, &spec.params)?)
    }

    /// Creates a benchmark, downloads its dataset if needed and loads it.
    pub async fn load_benchmark(
        &self,
        spec: &BenchmarkSpec,
        benchmark_dir: &Path,
    ) -> Result<Box<dyn Benchmark>, EngineError> {
        let mut benchmark = self.create_benchmark(spec, benchmark_dir)?;
        benchmark.download_dataset().await?;
        benchmark.load_dataset().await?;
        Ok(benchmark)
    }

    pub fn create_system(&self, spec: &SystemSpec) -> Result<Box<dyn System>, EngineError> {
        let factory = self
            .systems
            .get(&spec.kind)
            .ok_or_else(|| EngineError::UnknownSystem {
                name: spec.kind.clone(),
                available: self.system_names(),
            })?;

        debug!(kind = %spec.kind, name = %spec.display_name(), "Creating system");
        Ok(factory(spec.display_name(), &spec.params)?)
    }
}
