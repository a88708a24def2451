//! Repeated profiling, aggregation and the JSON result files.
use crate::device::DeviceTag;
use crate::error::{BenchError, Result};
use crate::profiler::{Profiler, RunMetrics};
use crate::provision::{provision_with, ProvisionOptions};
use crate::util::{list_files, mean};
use chrono::Local;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One benchmark invocation: which model, how large a batch, how many repetitions.
#[derive(Clone, Debug, PartialEq)]
pub struct BenchmarkConfig {
    pub model: String,
    pub batch_size: usize,
    pub num_runs: usize,
    pub use_half: bool,
}

impl BenchmarkConfig {
    pub fn new(model: &str, batch_size: usize, num_runs: usize, use_half: bool) -> BenchmarkConfig {
        BenchmarkConfig {
            model: model.to_owned(),
            batch_size,
            num_runs,
            use_half,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_runs == 0 {
            return Err(BenchError::InvalidConfig("number of runs must be at least 1".to_owned()));
        }
        if self.batch_size == 0 {
            return Err(BenchError::InvalidConfig("batch size must be at least 1".to_owned()));
        }
        Ok(())
    }
}

/// Per-run measurement series, in run order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSeries {
    pub times_sec: Vec<f64>,
    #[serde(rename = "gpu_mem_diff_MB")]
    pub gpu_mem_diff_mb: Vec<f64>,
    #[serde(rename = "cpu_mem_diff_MB")]
    pub cpu_mem_diff_mb: Vec<f64>,
}

impl RunSeries {
    pub fn len(&self) -> usize {
        self.times_sec.len()
    }
    pub fn is_empty(&self) -> bool {
        self.times_sec.is_empty()
    }
}

/// The document written for every benchmark invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    #[serde(default)]
    pub timestamp: String,
    pub model: String,
    pub batch_size: usize,
    pub device: DeviceTag,
    pub num_runs: usize,
    #[serde(default)]
    pub use_half_precision: bool,
    pub avg_exec_time_sec: f64,
    #[serde(rename = "avg_gpu_memory_diff_MB")]
    pub avg_gpu_memory_diff_mb: f64,
    #[serde(rename = "avg_cpu_memory_diff_MB")]
    pub avg_cpu_memory_diff_mb: f64,
    pub all_runs: RunSeries,
}

impl BenchmarkResult {
    /// Averages `runs`, stamping the result with the current local time.
    pub fn from_runs(
        config: &BenchmarkConfig,
        device: DeviceTag,
        runs: &[RunMetrics],
    ) -> Result<BenchmarkResult> {
        let series = RunSeries {
            times_sec: runs.iter().map(|r| r.exec_time_sec).collect(),
            gpu_mem_diff_mb: runs.iter().map(|r| r.gpu_memory_diff_mb).collect(),
            cpu_mem_diff_mb: runs.iter().map(|r| r.cpu_memory_diff_mb).collect(),
        };
        let avg = |values: &[f64]| {
            mean(values).ok_or_else(|| BenchError::InvalidConfig("no runs to aggregate".to_owned()))
        };
        Ok(BenchmarkResult {
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            model: config.model.clone(),
            batch_size: config.batch_size,
            device,
            num_runs: runs.len(),
            use_half_precision: config.use_half,
            avg_exec_time_sec: avg(&series.times_sec)?,
            avg_gpu_memory_diff_mb: avg(&series.gpu_mem_diff_mb)?,
            avg_cpu_memory_diff_mb: avg(&series.cpu_mem_diff_mb)?,
            all_runs: series,
        })
    }

    /// Items per second over the average run.
    pub fn throughput(&self) -> f64 {
        if self.avg_exec_time_sec > 0.0 {
            self.batch_size as f64 / self.avg_exec_time_sec
        } else {
            0.0
        }
    }

    /// `metrics_<model>_<device>_<unix-seconds>.json`
    pub fn file_name(&self, unix_secs: u64) -> String {
        format!("metrics_{}_{}_{}.json", self.model, self.device, unix_secs)
    }

    /// Writes the result as pretty-printed JSON into `dir`, creating it if needed. Results of the
    /// same model and device written within the same second get a numeric suffix.
    pub fn write_to_dir<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let unix_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let stem = format!("metrics_{}_{}_{}", self.model, self.device, unix_secs);
        let json = serde_json::to_string_pretty(self)?;
        let mut path = dir.join(self.file_name(unix_secs));
        let mut n = 0;
        let mut file = loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break file,
                Err(ref e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    n += 1;
                    path = dir.join(format!("{}_{}.json", stem, n));
                }
                Err(e) => return Err(e.into()),
            }
        };

        file.write_all(json.as_bytes())?;
        info!("Wrote results to {}.", path.display());
        Ok(path)
    }
}

/// Provisions once and profiles `config.num_runs` forward passes one after another.
pub fn run_benchmark(
    config: &BenchmarkConfig,
    options: &ProvisionOptions,
    profiler: &mut Profiler,
) -> Result<BenchmarkResult> {
    config.validate()?;
    let (model, input, device) =
        provision_with(&config.model, config.batch_size, config.use_half, options)?;

    let mut runs = Vec::with_capacity(config.num_runs);
    for i in 0..config.num_runs {
        let metrics = profiler.profile(&model, &input, device)?;
        debug!(
            "Run {}/{}: {:.6} s, gpu {:+.3} MB, cpu {:+.3} MB.",
            i + 1,
            config.num_runs,
            metrics.exec_time_sec,
            metrics.gpu_memory_diff_mb,
            metrics.cpu_memory_diff_mb
        );
        runs.push(metrics);
    }

    let result = BenchmarkResult::from_runs(config, device, &runs)?;
    info!(
        "{} on {} (batch {}, half: {}): {:.6} s on average over {} runs.",
        result.model,
        result.device,
        result.batch_size,
        result.use_half_precision,
        result.avg_exec_time_sec,
        result.num_runs
    );
    Ok(result)
}

/// A result read back from disk with the name of its file.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedResult {
    pub file_name: String,
    pub result: BenchmarkResult,
}

/// Reads every `*.json` in `dir`, sorted by file name. Files that fail to parse are skipped; a
/// missing directory has no results.
pub fn load_all_results<P: AsRef<Path>>(dir: P) -> Result<Vec<LoadedResult>> {
    let dir = dir.as_ref();
    if !dir.exists() {
        debug!("Results directory {} does not exist.", dir.display());
        return Ok(vec![]);
    }

    let mut results = vec![];
    for file_name in list_files(dir)? {
        if !file_name.ends_with(".json") {
            continue;
        }
        let parsed = fs::read_to_string(dir.join(&file_name))
            .map_err(BenchError::from)
            .and_then(|s| serde_json::from_str::<BenchmarkResult>(&s).map_err(BenchError::from));
        match parsed {
            Ok(result) => results.push(LoadedResult { file_name, result }),
            Err(e) => warn!("Skipping {}: {}.", file_name, e),
        }
    }
    Ok(results)
}

/// Results that agree on model, batch size and run count but differ in precision, as
/// `(baseline, half)` pairs.
pub fn find_half_precision_pairs(results: &[LoadedResult]) -> Vec<(&LoadedResult, &LoadedResult)> {
    results
        .iter()
        .tuple_combinations()
        .filter(|(a, b)| {
            a.result.model == b.result.model
                && a.result.batch_size == b.result.batch_size
                && a.result.num_runs == b.result.num_runs
                && a.result.use_half_precision != b.result.use_half_precision
        })
        .map(|(a, b)| if a.result.use_half_precision { (b, a) } else { (a, b) })
        .collect()
}

/// Hourly prices of the machine classes a result may have run on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CostModel {
    pub cpu_hourly_usd: f64,
    pub gpu_hourly_usd: f64,
    pub unified_hourly_usd: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        CostModel {
            cpu_hourly_usd: 0.10,
            gpu_hourly_usd: 0.90,
            unified_hourly_usd: 0.50,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CostEstimate {
    /// Items per second
    pub throughput: f64,
    pub usd_per_1k_inferences: f64,
}

impl CostModel {
    pub fn hourly(&self, device: DeviceTag) -> f64 {
        match device {
            DeviceTag::Cpu => self.cpu_hourly_usd,
            DeviceTag::Gpu => self.gpu_hourly_usd,
            DeviceTag::Unified => self.unified_hourly_usd,
        }
    }

    /// `None` when the result has no positive average time.
    pub fn estimate(&self, result: &BenchmarkResult) -> Option<CostEstimate> {
        let throughput = result.throughput();
        if throughput <= 0.0 {
            return None;
        }
        let seconds_per_1k = 1000.0 / throughput;
        Some(CostEstimate {
            throughput,
            usd_per_1k_inferences: self.hourly(result.device) * seconds_per_1k / 3600.0,
        })
    }
}
