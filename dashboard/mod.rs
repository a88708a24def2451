#[macro_use]
extern crate log;

mod chart;
mod table;

use clap::Parser;
use rusty_bench::report::{find_half_precision_pairs, load_all_results, CostModel, LoadedResult};
use rusty_bench::{Result, RESULTS_DIR};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "dashboard")]
#[command(about = "Summarize and chart benchmark result files")]
#[command(version)]
struct Args {
    #[arg(
        long,
        alias = "results_dir",
        env = "RUSTY_BENCH_RESULTS_DIR",
        default_value = RESULTS_DIR
    )]
    results_dir: PathBuf,
    /// Result file to show; repeatable. Defaults to the first file
    #[arg(long)]
    select: Vec<String>,
    /// Show every result file
    #[arg(long, conflicts_with = "select")]
    all: bool,
    /// Where charts are written
    #[arg(long, alias = "out_dir", default_value = "charts")]
    out_dir: PathBuf,
    #[arg(long, default_value = "0.10")]
    cpu_hourly_usd: f64,
    #[arg(long, default_value = "0.90")]
    gpu_hourly_usd: f64,
    #[arg(long, default_value = "0.50")]
    unified_hourly_usd: f64,
}

pub fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Err(err) = run(&args) {
        error!("Exited with error: {}.", err);
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let all_results = load_all_results(&args.results_dir)?;
    if all_results.is_empty() {
        warn!(
            "No JSON files found in {}. Please run a benchmark first.",
            args.results_dir.display()
        );
        return Ok(());
    }

    let selected = select(&all_results, args);
    if selected.is_empty() {
        info!("No result file selected.");
        return Ok(());
    }
    fs::create_dir_all(&args.out_dir)?;

    let font = chart::font()?;

    println!("== Selected Runs ==");
    for r in selected.iter() {
        println!("{}", table::summary(r));
        let img = chart::line_chart(
            &font,
            &format!("Execution Time per Run: {}", r.file_name),
            "Time (s)",
            &[series(r)],
            chart::WIDTH,
            chart::HEIGHT,
        );
        save(&img, &args.out_dir, &format!("times_{}", r.file_name))?;
    }

    if selected.len() > 1 {
        println!("== Combined Chart (all selected runs) ==");
        let all = selected.iter().map(|r| series(r)).collect::<Vec<_>>();
        let img = chart::line_chart(
            &font,
            "Execution Time per Run: selected files",
            "Time (s)",
            &all,
            chart::WIDTH,
            chart::HEIGHT,
        );
        let path = save(&img, &args.out_dir, "combined")?;
        println!("Written to {}\n", path.display());
    }

    println!("== Baseline vs. Half-Precision Comparison ==");
    let owned = selected.iter().map(|r| (*r).clone()).collect::<Vec<_>>();
    match find_half_precision_pairs(&owned).first() {
        None => println!("No matching baseline vs. half-precision pairs in the selection.\n"),
        Some(&(baseline, half)) => {
            println!("{}", table::comparison(baseline, half));
            let groups = vec![
                vec![baseline.result.avg_exec_time_sec, baseline.result.avg_gpu_memory_diff_mb],
                vec![half.result.avg_exec_time_sec, half.result.avg_gpu_memory_diff_mb],
            ];
            let img = chart::grouped_bar_chart(
                &font,
                &format!("Baseline vs. Half-Precision: {}", baseline.result.model),
                &["Baseline".to_owned(), "Half-Precision".to_owned()],
                &["Exec Time (s)", "GPU Mem Diff (MB)"],
                &groups,
                chart::WIDTH,
                chart::HEIGHT,
            );
            let path = save(&img, &args.out_dir, "baseline_vs_half")?;
            println!("Written to {}\n", path.display());
        }
    }

    println!("== Cost Estimate ==");
    let prices = CostModel {
        cpu_hourly_usd: args.cpu_hourly_usd,
        gpu_hourly_usd: args.gpu_hourly_usd,
        unified_hourly_usd: args.unified_hourly_usd,
    };
    println!("{}", table::costs(&selected, &prices));
    Ok(())
}

/// The results named by `--select`, every result with `--all`, else the first one.
fn select<'a>(all_results: &'a [LoadedResult], args: &Args) -> Vec<&'a LoadedResult> {
    if args.all {
        return all_results.iter().collect();
    }
    if args.select.is_empty() {
        return all_results.iter().take(1).collect();
    }
    for name in args.select.iter() {
        if !all_results.iter().any(|r| &r.file_name == name) {
            warn!("No result file named {}.", name);
        }
    }
    all_results
        .iter()
        .filter(|r| args.select.contains(&r.file_name))
        .collect()
}

fn series(loaded: &LoadedResult) -> chart::Series {
    chart::Series {
        label: loaded.file_name.clone(),
        values: loaded.result.all_runs.times_sec.clone(),
    }
}

fn save(img: &image::RgbImage, dir: &Path, stem: &str) -> Result<PathBuf> {
    let stem = stem.trim_end_matches(".json");
    let path = dir.join(format!("{}.png", stem));
    img.save(&path)?;
    debug!("Wrote chart {}.", path.display());
    Ok(path)
}
