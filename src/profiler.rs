//! Times a single forward pass and the memory it moves.
use crate::device::DeviceTag;
use crate::error::Result;
use crate::network::Predict;
use crate::tensor::Tensor;
use crate::util::{bytes_to_mb, BYTES_PER_MB};
use nvml_wrapper::Nvml;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use sysinfo::{Pid, System};

/// Measurements of one forward pass.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub exec_time_sec: f64,
    #[serde(rename = "gpu_memory_diff_MB")]
    pub gpu_memory_diff_mb: f64,
    #[serde(rename = "cpu_memory_diff_MB")]
    pub cpu_memory_diff_mb: f64,
}

/// Reads the memory currently in use on the discrete accelerator.
pub trait GpuMemoryQuery {
    /// Used device memory in MB, or `None` if it cannot be read.
    fn used_mb(&mut self) -> Option<f64>;
}

/// Reads the resident memory of this process.
pub trait HostMemoryQuery {
    fn used_bytes(&mut self) -> Option<u64>;
}

/// Device memory of the first NVIDIA GPU through NVML.
pub struct NvmlQuery {
    nvml: Nvml,
}

impl NvmlQuery {
    /// Fails with `None` when the NVML library or driver is not present.
    pub fn init() -> Option<NvmlQuery> {
        match Nvml::init() {
            Ok(nvml) => Some(NvmlQuery { nvml }),
            Err(e) => {
                debug!("NVML is not available: {}.", e);
                None
            }
        }
    }
}

impl GpuMemoryQuery for NvmlQuery {
    fn used_mb(&mut self) -> Option<f64> {
        let device = self.nvml.device_by_index(0).ok()?;
        let info = device.memory_info().ok()?;
        Some(info.used as f64 / BYTES_PER_MB)
    }
}

/// Used where no device memory query exists.
pub struct NoGpuQuery;

impl GpuMemoryQuery for NoGpuQuery {
    fn used_mb(&mut self) -> Option<f64> {
        None
    }
}

pub struct ProcessMemory {
    system: System,
    pid: Option<Pid>,
}

impl ProcessMemory {
    pub fn current() -> ProcessMemory {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| warn!("Cannot resolve the current process: {}.", e))
            .ok();
        ProcessMemory {
            system: System::new(),
            pid,
        }
    }
}

impl HostMemoryQuery for ProcessMemory {
    fn used_bytes(&mut self) -> Option<u64> {
        let pid = self.pid?;
        if !self.system.refresh_process(pid) {
            return None;
        }
        self.system.process(pid).map(|p| p.memory())
    }
}

pub struct Profiler {
    gpu: Box<dyn GpuMemoryQuery>,
    host: Box<dyn HostMemoryQuery>,
}

impl Profiler {
    pub fn new(gpu: Box<dyn GpuMemoryQuery>, host: Box<dyn HostMemoryQuery>) -> Profiler {
        Profiler { gpu, host }
    }

    /// NVML when it loads, otherwise no device memory readings.
    pub fn detect() -> Profiler {
        let gpu: Box<dyn GpuMemoryQuery> = match NvmlQuery::init() {
            Some(q) => Box::new(q),
            None => Box::new(NoGpuQuery),
        };
        Profiler::new(gpu, Box::new(ProcessMemory::current()))
    }

    /// Runs `model` once on `input`. Device memory is only read when `device` is a discrete GPU;
    /// a missing reading on either side leaves the corresponding diff at zero.
    pub fn profile<M>(&mut self, model: &M, input: &Tensor, device: DeviceTag) -> Result<RunMetrics>
    where
        M: Predict + ?Sized,
    {
        let on_gpu = device == DeviceTag::Gpu;
        let gpu_before = if on_gpu { self.gpu.used_mb() } else { None };
        let host_before = self.host.used_bytes();

        let start = Instant::now();
        let output = model.predict(input)?;
        let exec_time_sec = start.elapsed().as_secs_f64();

        let gpu_after = if on_gpu { self.gpu.used_mb() } else { None };
        let host_after = self.host.used_bytes();
        drop(output);

        let gpu_memory_diff_mb = match (gpu_before, gpu_after) {
            (Some(before), Some(after)) => after - before,
            _ => {
                if on_gpu {
                    warn!("GPU memory could not be read, reporting a zero diff.");
                }
                0.0
            }
        };
        let cpu_memory_diff_mb = match (host_before, host_after) {
            (Some(before), Some(after)) => bytes_to_mb(after as f64 - before as f64),
            _ => {
                warn!("Process memory could not be read, reporting a zero diff.");
                0.0
            }
        };

        trace!(
            "\t↳ forward took {:.6} s, gpu {:+.3} MB, cpu {:+.3} MB",
            exec_time_sec,
            gpu_memory_diff_mb,
            cpu_memory_diff_mb
        );
        Ok(RunMetrics {
            exec_time_sec,
            gpu_memory_diff_mb,
            cpu_memory_diff_mb,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::device::Placement;
    use crate::error::BenchError;
    use ndarray::{ArrayD, IxDyn};
    use std::cell::Cell;

    /// Returns readings from a fixed list.
    struct Scripted(Vec<Option<f64>>);

    impl GpuMemoryQuery for Scripted {
        fn used_mb(&mut self) -> Option<f64> {
            if self.0.is_empty() {
                None
            } else {
                self.0.remove(0)
            }
        }
    }

    struct FixedHost(Vec<u64>);

    impl HostMemoryQuery for FixedHost {
        fn used_bytes(&mut self) -> Option<u64> {
            if self.0.is_empty() {
                None
            } else {
                Some(self.0.remove(0))
            }
        }
    }

    struct Echo {
        calls: Cell<usize>,
    }

    impl Predict for Echo {
        fn predict(&self, input: &Tensor) -> Result<Tensor> {
            self.calls.set(self.calls.get() + 1);
            Ok(input.clone())
        }
    }

    struct Failing;

    impl Predict for Failing {
        fn predict(&self, _input: &Tensor) -> Result<Tensor> {
            Err(BenchError::shape_mismatch("fc", [1, 4], [1, 3]))
        }
    }

    fn input() -> Tensor {
        Tensor::from_f32(ArrayD::zeros(IxDyn(&[1, 4])), Placement::Host)
    }

    #[test]
    fn gpu_diff_uses_both_readings() {
        let mut profiler = Profiler::new(
            Box::new(Scripted(vec![Some(100.0), Some(132.5)])),
            Box::new(FixedHost(vec![0, 2 * 1024 * 1024])),
        );
        let model = Echo { calls: Cell::new(0) };
        let m = profiler.profile(&model, &input(), DeviceTag::Gpu).unwrap();
        assert_eq!(model.calls.get(), 1);
        assert_eq!(m.gpu_memory_diff_mb, 32.5);
        assert_eq!(m.cpu_memory_diff_mb, 2.0);
        assert!(m.exec_time_sec >= 0.0);
    }

    #[test]
    fn gpu_diff_is_zero_off_gpu() {
        let mut profiler = Profiler::new(
            Box::new(Scripted(vec![Some(100.0), Some(200.0)])),
            Box::new(FixedHost(vec![4096, 0])),
        );
        let model = Echo { calls: Cell::new(0) };
        let m = profiler.profile(&model, &input(), DeviceTag::Unified).unwrap();
        assert_eq!(m.gpu_memory_diff_mb, 0.0);
        // Host memory may shrink
        assert!(m.cpu_memory_diff_mb < 0.0);
    }

    #[test]
    fn missing_reading_degrades_to_zero() {
        let mut profiler = Profiler::new(
            Box::new(Scripted(vec![Some(100.0), None])),
            Box::new(FixedHost(vec![])),
        );
        let m = profiler
            .profile(&Echo { calls: Cell::new(0) }, &input(), DeviceTag::Gpu)
            .unwrap();
        assert_eq!(m.gpu_memory_diff_mb, 0.0);
        assert_eq!(m.cpu_memory_diff_mb, 0.0);
    }

    #[test]
    fn forward_errors_propagate() {
        let mut profiler = Profiler::new(Box::new(NoGpuQuery), Box::new(FixedHost(vec![0, 0])));
        assert!(profiler.profile(&Failing, &input(), DeviceTag::Cpu).is_err());
    }

    #[test]
    fn metrics_serialize_with_unit_suffixes() {
        let m = RunMetrics {
            exec_time_sec: 0.5,
            gpu_memory_diff_mb: 0.0,
            cpu_memory_diff_mb: 1.0,
        };
        let json = serde_json::to_value(&m).unwrap();
        assert!(json.get("gpu_memory_diff_MB").is_some());
        assert!(json.get("cpu_memory_diff_MB").is_some());
    }
}
