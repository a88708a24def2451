use noisy_float::prelude::*;
use rusty_bench::report::{CostEstimate, CostModel, LoadedResult};
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    key: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled)]
struct ComparisonRow {
    #[tabled(rename = "Metric")]
    metric: &'static str,
    #[tabled(rename = "Baseline")]
    baseline: String,
    #[tabled(rename = "Half-Precision")]
    half: String,
}

#[derive(Tabled)]
struct CostRow {
    #[tabled(rename = "File")]
    file: String,
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Items/s")]
    throughput: String,
    #[tabled(rename = "USD / 1k inf.")]
    usd: String,
}

/// Key/value summary of one result file.
pub fn summary(loaded: &LoadedResult) -> String {
    let r = &loaded.result;
    let timestamp = if r.timestamp.is_empty() { "N/A" } else { r.timestamp.as_str() };
    let rows = vec![
        ("Timestamp", timestamp.to_owned()),
        ("Model", r.model.clone()),
        ("Batch Size", r.batch_size.to_string()),
        ("Device", r.device.to_string()),
        ("Num Runs", r.num_runs.to_string()),
        ("Use Half Precision", r.use_half_precision.to_string()),
        ("Avg Exec Time (s)", format!("{:.6}", r.avg_exec_time_sec)),
        ("Avg GPU Mem Diff (MB)", format!("{:.3}", r.avg_gpu_memory_diff_mb)),
        ("Avg CPU Mem Diff (MB)", format!("{:.3}", r.avg_cpu_memory_diff_mb)),
    ]
    .into_iter()
    .map(|(key, value)| FieldRow { key, value })
    .collect::<Vec<_>>();

    format!(
        "File: {}\n{}",
        loaded.file_name,
        Table::new(rows).with(Style::rounded())
    )
}

/// Side-by-side averages of a baseline and its half-precision run.
pub fn comparison(baseline: &LoadedResult, half: &LoadedResult) -> String {
    let (b, h) = (&baseline.result, &half.result);
    let rows = vec![
        ComparisonRow {
            metric: "File",
            baseline: baseline.file_name.clone(),
            half: half.file_name.clone(),
        },
        ComparisonRow {
            metric: "Exec Time (s)",
            baseline: format!("{:.6}", b.avg_exec_time_sec),
            half: format!("{:.6}", h.avg_exec_time_sec),
        },
        ComparisonRow {
            metric: "GPU Mem Diff (MB)",
            baseline: format!("{:.3}", b.avg_gpu_memory_diff_mb),
            half: format!("{:.3}", h.avg_gpu_memory_diff_mb),
        },
    ];

    let mut out = Table::new(rows).with(Style::rounded()).to_string();
    if h.avg_exec_time_sec > 0.0 {
        out.push_str(&format!(
            "\nSpeedup: {:.2}x",
            b.avg_exec_time_sec / h.avg_exec_time_sec
        ));
    }
    out
}

/// Throughput and price per thousand inferences, cheapest first.
pub fn costs(results: &[&LoadedResult], model: &CostModel) -> String {
    let mut estimates = results
        .iter()
        .map(|r| (*r, model.estimate(&r.result)))
        .collect::<Vec<(&LoadedResult, Option<CostEstimate>)>>();
    estimates.sort_by_key(|(_, cost)| {
        let usd = cost.and_then(|c| N64::try_new(c.usd_per_1k_inferences));
        (usd.is_none(), usd)
    });

    let rows = estimates.into_iter().map(|(r, cost)| CostRow {
        file: r.file_name.clone(),
        device: r.result.device.to_string(),
        throughput: cost.map_or_else(|| "-".to_owned(), |c| format!("{:.2}", c.throughput)),
        usd: cost.map_or_else(|| "-".to_owned(), |c| format!("{:.6}", c.usd_per_1k_inferences)),
    });
    Table::new(rows).with(Style::rounded()).to_string()
}
