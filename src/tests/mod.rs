mod profiling;
mod provisioning;

use super::*;
use crate::profiler::{GpuMemoryQuery, HostMemoryQuery};

/// Smallest architectures that still take the full-size input, pinned to the CPU.
pub fn smoke_options() -> ProvisionOptions {
    ProvisionOptions {
        seed: 42,
        width_divisor: 16,
        weights_dir: None,
        device: DevicePreference::RequireCpu,
    }
}

/// Reports a fixed device memory reading on every call.
pub struct ConstantGpu(pub f64);

impl GpuMemoryQuery for ConstantGpu {
    fn used_mb(&mut self) -> Option<f64> {
        Some(self.0)
    }
}

pub struct NoHost;

impl HostMemoryQuery for NoHost {
    fn used_bytes(&mut self) -> Option<u64> {
        None
    }
}
