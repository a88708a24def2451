//! Runs many benchmark configurations, each in its own child process.
use crate::error::{BenchError, Result};
use crate::registry::ModelId;
use itertools::iproduct;
use std::path::Path;
use std::process::Command;

/// Arguments of a single `run` invocation of the benchmark binary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunArgs {
    pub model: String,
    pub batch_size: usize,
    pub num_runs: usize,
    pub use_half: bool,
    pub width_divisor: usize,
}

impl RunArgs {
    /// Command-line arguments for the child, results going into `results_dir`.
    pub fn to_args(&self, results_dir: &Path) -> Vec<String> {
        let mut args = vec![
            "run".to_owned(),
            "--model".to_owned(),
            self.model.clone(),
            "--batch-size".to_owned(),
            self.batch_size.to_string(),
            "--num-runs".to_owned(),
            self.num_runs.to_string(),
            "--results-dir".to_owned(),
            results_dir.display().to_string(),
        ];
        if self.width_divisor != 1 {
            args.push("--width-divisor".to_owned());
            args.push(self.width_divisor.to_string());
        }
        if self.use_half {
            args.push("--use-half".to_owned());
        }
        args
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SweepPlan {
    pub models: Vec<String>,
    pub batch_sizes: Vec<usize>,
    pub num_runs: usize,
    pub half_options: Vec<bool>,
    pub width_divisor: usize,
}

impl Default for SweepPlan {
    /// Every registered model at batch sizes 1 to 16, five runs each, with and without half
    /// precision.
    fn default() -> Self {
        SweepPlan {
            models: ModelId::ALL.iter().map(|id| id.to_string()).collect(),
            batch_sizes: vec![1, 2, 4, 8, 16],
            num_runs: 5,
            half_options: vec![false, true],
            width_divisor: 1,
        }
    }
}

impl SweepPlan {
    /// Configurations in model, batch size, precision order.
    pub fn expand(&self) -> Vec<RunArgs> {
        iproduct!(
            self.models.iter(),
            self.batch_sizes.iter(),
            self.half_options.iter()
        )
            .map(|(model, &batch_size, &use_half)| RunArgs {
                model: model.clone(),
                batch_size,
                num_runs: self.num_runs,
                use_half,
                width_divisor: self.width_divisor,
            })
            .collect()
    }
}

/// A baseline run followed by its half-precision counterpart.
pub fn compare_plan(model: &str, batch_size: usize, num_runs: usize) -> SweepPlan {
    SweepPlan {
        models: vec![model.to_owned()],
        batch_sizes: vec![batch_size],
        num_runs,
        half_options: vec![false, true],
        width_divisor: 1,
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Runs every configuration of `plan` through `exe`, one after another. A child that exits
/// unsuccessfully is counted; one that cannot be started aborts the sweep.
pub fn run_plan(plan: &SweepPlan, exe: &Path, results_dir: &Path) -> Result<SweepSummary> {
    let runs = plan.expand();
    info!(
        "Sweeping {} configurations with {}.",
        runs.len(),
        exe.display()
    );

    let mut summary = SweepSummary::default();
    for (i, run) in runs.iter().enumerate() {
        let args = run.to_args(results_dir);
        info!(
            "=== [{}/{}] RUNNING: {} ===",
            i + 1,
            runs.len(),
            args.join(" ")
        );
        let status = Command::new(exe)
            .args(&args)
            .status()
            .map_err(|e| BenchError::ChildFailed(format!("{}: {}", exe.display(), e)))?;
        if status.success() {
            summary.succeeded += 1;
        } else {
            warn!("{} {} exited with {}.", run.model, run.batch_size, status);
            summary.failed += 1;
        }
    }

    info!(
        "Sweep done: {} succeeded, {} failed.",
        summary.succeeded,
        summary.failed
    );
    Ok(summary)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_plan_covers_every_combination() {
        let runs = SweepPlan::default().expand();
        assert_eq!(runs.len(), 7 * 5 * 2);
        assert!(runs.iter().all(|r| r.num_runs == 5));
        assert_eq!(runs[0].model, "mobilenet_v2");
        assert!(!runs[0].use_half);
        assert!(runs[1].use_half);
        assert_eq!(runs[2].batch_size, 2);
    }

    #[test]
    fn compare_is_baseline_then_half() {
        let runs = compare_plan("vgg16", 2, 3).expand();
        assert_eq!(runs.len(), 2);
        assert_eq!(
            runs[0].to_args(Path::new("out")),
            vec![
                "run",
                "--model",
                "vgg16",
                "--batch-size",
                "2",
                "--num-runs",
                "3",
                "--results-dir",
                "out",
            ]
        );
        let half = runs[1].to_args(Path::new("out"));
        assert_eq!(half.last().map(|s| s.as_str()), Some("--use-half"));
    }

    #[test]
    fn missing_executable_is_an_error() {
        let plan = compare_plan("vgg16", 1, 1);
        let exe = Path::new("/nonexistent/rusty-bench");
        match run_plan(&plan, exe, Path::new("results")) {
            Err(BenchError::ChildFailed(_)) => {}
            other => panic!("expected ChildFailed, got {:?}", other),
        }
    }
}
