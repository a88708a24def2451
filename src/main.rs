#[macro_use]
extern crate log;

use clap::{Parser, Subcommand};
use rusty_bench::registry::{self, ModelId};
use rusty_bench::sweep::{self, SweepPlan};
use rusty_bench::{
    run_benchmark, BenchmarkConfig, DevicePreference, Profiler, ProvisionOptions, Result,
    RESULTS_DIR,
};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "rusty-bench")]
#[command(about = "Measure inference latency and memory of a model zoo")]
#[command(version)]
struct Cli {
    /// Directory result files are written to
    #[arg(
        long,
        alias = "results_dir",
        env = "RUSTY_BENCH_RESULTS_DIR",
        default_value = RESULTS_DIR,
        global = true
    )]
    results_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Benchmark one model and write a result file
    Run {
        #[arg(long, default_value = "mobilenet_v2")]
        model: String,
        #[arg(long, alias = "batch_size", default_value = "1")]
        batch_size: usize,
        #[arg(long, alias = "num_runs", default_value = "1")]
        num_runs: usize,
        /// Use half precision on a discrete GPU; ignored elsewhere
        #[arg(long, alias = "use_half")]
        use_half: bool,
        #[arg(long, default_value = "0")]
        seed: u64,
        /// Divide every channel count and hidden size, for smoke runs
        #[arg(long, alias = "width_divisor", default_value = "1")]
        width_divisor: usize,
        /// Load big-endian f32 weights from this directory instead of seeding them
        #[arg(long, alias = "weights_dir")]
        weights_dir: Option<PathBuf>,
        /// "auto" or "cpu"
        #[arg(long, default_value = "auto")]
        device: DevicePreference,
    },
    /// Benchmark every combination of models, batch sizes and precisions
    Sweep {
        #[arg(long, value_delimiter = ',')]
        models: Vec<String>,
        #[arg(long, alias = "batch_sizes", value_delimiter = ',')]
        batch_sizes: Vec<usize>,
        #[arg(long, alias = "num_runs", default_value = "5")]
        num_runs: usize,
        #[arg(long, alias = "width_divisor", default_value = "1")]
        width_divisor: usize,
    },
    /// Benchmark a model at full and at half precision
    Compare {
        #[arg(long, default_value = "vgg16")]
        model: String,
        #[arg(long, alias = "batch_size", default_value = "2")]
        batch_size: usize,
        #[arg(long, alias = "num_runs", default_value = "3")]
        num_runs: usize,
    },
    /// List the supported models
    List,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(_) => debug!("Exited great."),
        Err(err) => {
            error!("Exited with error: {}.", err);
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            model,
            batch_size,
            num_runs,
            use_half,
            seed,
            width_divisor,
            weights_dir,
            device,
        } => {
            let config = BenchmarkConfig::new(&model, batch_size, num_runs, use_half);
            let options = ProvisionOptions {
                seed,
                width_divisor,
                weights_dir,
                device,
            };
            let result = run_benchmark(&config, &options, &mut Profiler::detect())?;
            let path = result.write_to_dir(&cli.results_dir)?;

            println!("Benchmark complete.");
            println!("Results saved to {}", path.display());
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Command::Sweep {
            models,
            batch_sizes,
            num_runs,
            width_divisor,
        } => {
            let mut plan = SweepPlan::default();
            if !models.is_empty() {
                plan.models = models;
            }
            if !batch_sizes.is_empty() {
                plan.batch_sizes = batch_sizes;
            }
            plan.num_runs = num_runs;
            plan.width_divisor = width_divisor;
            sweep_with(&plan, &cli.results_dir)
        }
        Command::Compare {
            model,
            batch_size,
            num_runs,
        } => {
            sweep_with(
                &sweep::compare_plan(&model, batch_size, num_runs),
                &cli.results_dir,
            )?;
            println!(
                "Check {} for a baseline and a half-precision result.",
                cli.results_dir.display()
            );
            Ok(())
        }
        Command::List => {
            println!(
                "{:<16} {:<22} {:<18} {}",
                "model",
                "family",
                "input",
                "available"
            );
            for id in ModelId::ALL.iter() {
                let entry = registry::entry(*id)?;
                let available = match entry.feature() {
                    Some(feature) if !entry.is_available() => format!("no (needs `{}`)", feature),
                    _ => "yes".to_owned(),
                };
                println!(
                    "{:<16} {:<22} {:<18} {}",
                    id.as_str(),
                    entry.family().to_string(),
                    format!("{:?}", entry.input().shape(1)),
                    available
                );
            }
            Ok(())
        }
    }
}

fn sweep_with(plan: &SweepPlan, results_dir: &Path) -> Result<()> {
    let exe = std::env::current_exe()?;
    let summary = sweep::run_plan(plan, &exe, results_dir)?;
    if summary.failed > 0 {
        let total = summary.failed + summary.succeeded;
        warn!("{} of {} configurations failed.", summary.failed, total);
    }
    Ok(())
}
