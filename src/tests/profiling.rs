use super::*;
use crate::profiler::NoGpuQuery;
use crate::report::load_all_results;

#[test]
fn profiling_leaves_model_and_input_untouched() {
    let (model, input, device) =
        provision_with("mobilenet_v2", 1, false, &smoke_options()).unwrap();
    let params = model.snapshot();
    let before = input.clone();

    let mut profiler = Profiler::new(Box::new(NoGpuQuery), Box::new(NoHost));
    for _ in 0..3 {
        let m = profiler.profile(&model, &input, device).unwrap();
        assert!(m.exec_time_sec >= 0.0);
    }
    assert_eq!(model.snapshot(), params);
    assert_eq!(input, before);
}

#[test]
fn gpu_diff_is_zero_on_cpu_even_with_a_reading() {
    let (model, input, device) =
        provision_with("mobilenet_v2", 1, false, &smoke_options()).unwrap();
    let mut profiler = Profiler::new(Box::new(ConstantGpu(512.0)), Box::new(NoHost));
    let m = profiler.profile(&model, &input, device).unwrap();
    assert_eq!(m.gpu_memory_diff_mb, 0.0);
    assert_eq!(m.cpu_memory_diff_mb, 0.0);
}

#[test]
fn detected_profiler_measures_a_run() {
    let (model, input, device) =
        provision_with("mobilenet_v2", 2, false, &smoke_options()).unwrap();
    let m = Profiler::detect().profile(&model, &input, device).unwrap();
    assert!(m.exec_time_sec >= 0.0);
    assert_eq!(m.gpu_memory_diff_mb, 0.0);
}

#[test]
fn benchmark_writes_the_documented_fields() {
    let dir = tempfile::tempdir().unwrap();
    let config = BenchmarkConfig::new("mobilenet_v2", 1, 2, false);
    let mut profiler = Profiler::new(Box::new(NoGpuQuery), Box::new(NoHost));
    let result = run_benchmark(&config, &smoke_options(), &mut profiler).unwrap();
    assert_eq!(result.num_runs, 2);
    assert_eq!(result.all_runs.times_sec.len(), 2);

    let path = result.write_to_dir(dir.path().join("results")).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    let mut keys = json.as_object().unwrap().keys().cloned().collect::<Vec<_>>();
    keys.sort();
    assert_eq!(keys, vec![
        "all_runs",
        "avg_cpu_memory_diff_MB",
        "avg_exec_time_sec",
        "avg_gpu_memory_diff_MB",
        "batch_size",
        "device",
        "model",
        "num_runs",
        "timestamp",
        "use_half_precision",
    ]);
    assert_eq!(json["device"], "cpu");
    assert_eq!(json["model"], "mobilenet_v2");
    let mut run_keys = json["all_runs"].as_object().unwrap().keys().cloned().collect::<Vec<_>>();
    run_keys.sort();
    assert_eq!(
        run_keys,
        vec!["cpu_mem_diff_MB", "gpu_mem_diff_MB", "times_sec"]
    );

    let loaded = load_all_results(dir.path().join("results")).unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].result.model, "mobilenet_v2");
}

#[test]
fn zero_runs_are_rejected_before_provisioning() {
    let config = BenchmarkConfig::new("mobilenet_v2", 1, 0, false);
    let mut profiler = Profiler::new(Box::new(NoGpuQuery), Box::new(NoHost));
    match run_benchmark(&config, &smoke_options(), &mut profiler) {
        Err(BenchError::InvalidConfig(_)) => {}
        other => panic!("expected InvalidConfig, got {:?}", other.map(|r| r.num_runs)),
    }
}
