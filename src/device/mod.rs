#[cfg(feature = "opencl")]
pub mod cl;

use crate::error::BenchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of hardware a benchmark runs on, chosen once per process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceTag {
    Cpu,
    /// A discrete accelerator with its own memory pool
    #[serde(alias = "cuda")]
    Gpu,
    /// An accelerator sharing the host memory pool
    #[serde(alias = "mps")]
    Unified,
}

/// Numeric representation of weights and float inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Precision {
    Full,
    Half,
}

/// The device + precision pair a model and its input are bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Placement {
    Host,
    Accelerator,
    AcceleratorHalf,
    UnifiedAccelerator,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DevicePreference {
    /// Walk the static priority list: discrete GPU, unified-memory GPU, CPU
    Auto,
    RequireCpu,
}

impl fmt::Display for DeviceTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::DeviceTag::*;
        let d = match *self {
            Cpu => "cpu",
            Gpu => "gpu",
            Unified => "unified",
        };
        write!(f, "{}", d)
    }
}

impl FromStr for DeviceTag {
    type Err = String;

    fn from_str(s: &str) -> Result<DeviceTag, String> {
        use self::DeviceTag::*;
        match s {
            "cpu" => Ok(Cpu),
            "gpu" => Ok(Gpu),
            "unified" => Ok(Unified),
            _ => Err(format!("unknown device tag \"{}\"", s)),
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Precision::Full => write!(f, "f32"),
            Precision::Half => write!(f, "f16"),
        }
    }
}

impl Placement {
    /// Decides where a model runs. Reduced precision is only used on a discrete accelerator; on
    /// any other device the request is accepted and has no effect.
    pub fn resolve(device: DeviceTag, use_half: bool) -> Placement {
        let placement = match (device, use_half) {
            (DeviceTag::Gpu, true) => Placement::AcceleratorHalf,
            (DeviceTag::Gpu, false) => Placement::Accelerator,
            (DeviceTag::Unified, _) => Placement::UnifiedAccelerator,
            (DeviceTag::Cpu, _) => Placement::Host,
        };
        if use_half && placement.precision() == Precision::Full {
            warn!(
                "Half precision is only used on a discrete GPU; running in {} on {}.",
                placement.precision(),
                device
            );
        }
        placement
    }
    pub fn device(&self) -> DeviceTag {
        use self::Placement::*;
        match *self {
            Host => DeviceTag::Cpu,
            Accelerator | AcceleratorHalf => DeviceTag::Gpu,
            UnifiedAccelerator => DeviceTag::Unified,
        }
    }
    pub fn precision(&self) -> Precision {
        match *self {
            Placement::AcceleratorHalf => Precision::Half,
            Placement::Host | Placement::Accelerator | Placement::UnifiedAccelerator => {
                Precision::Full
            }
        }
    }
    pub fn is_accelerated(&self) -> bool {
        *self != Placement::Host
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.device(), self.precision())
    }
}

impl FromStr for DevicePreference {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<DevicePreference, BenchError> {
        match s {
            "auto" => Ok(DevicePreference::Auto),
            "cpu" => Ok(DevicePreference::RequireCpu),
            _ => Err(BenchError::InvalidConfig(format!(
                "device must be \"auto\" or \"cpu\", got \"{}\"",
                s
            ))),
        }
    }
}

impl Default for DevicePreference {
    fn default() -> Self {
        DevicePreference::Auto
    }
}

/// Where the layers of a placed model execute.
#[derive(Clone, Debug)]
pub enum Backend {
    Host,
    #[cfg(feature = "opencl")]
    OpenCl(cl::ClDevice),
}

/// The selected compute device.
#[derive(Clone, Debug)]
pub struct ComputeDevice {
    tag: DeviceTag,
    name: String,
    backend: Backend,
}

impl ComputeDevice {
    pub fn host() -> ComputeDevice {
        ComputeDevice {
            tag: DeviceTag::Cpu,
            name: "host".to_owned(),
            backend: Backend::Host,
        }
    }
    /// Host kernels reporting as another device class.
    #[cfg(test)]
    pub(crate) fn host_as(tag: DeviceTag) -> ComputeDevice {
        ComputeDevice {
            tag,
            name: format!("host as {}", tag),
            backend: Backend::Host,
        }
    }
    pub fn tag(&self) -> DeviceTag {
        self.tag
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn backend(&self) -> &Backend {
        &self.backend
    }
}

/// Selects the device for this process: a discrete GPU if present, else a unified-memory GPU,
/// else the CPU.
pub fn select_device(preference: &DevicePreference) -> ComputeDevice {
    let device = match preference {
        DevicePreference::RequireCpu => ComputeDevice::host(),
        DevicePreference::Auto => probe_accelerator().unwrap_or_else(ComputeDevice::host),
    };
    info!("Using {} device \"{}\".", device.tag, device.name);
    device
}

#[cfg(feature = "opencl")]
fn probe_accelerator() -> Option<ComputeDevice> {
    let gpus = cl::list_gpus();
    debug!("Available OpenCL GPUs: {:?}.", gpus.iter().map(|d| d.name()).collect::<Vec<_>>());

    // Static priority, not a cost-based decision
    let discrete = gpus.iter().find(|d| !d.host_unified_memory());
    let unified = gpus.iter().find(|d| d.host_unified_memory());
    let (tag, dev) = match (discrete, unified) {
        (Some(d), _) => (DeviceTag::Gpu, d),
        (None, Some(d)) => (DeviceTag::Unified, d),
        (None, None) => return None,
    };
    Some(ComputeDevice {
        tag,
        name: dev.name().to_owned(),
        backend: Backend::OpenCl(dev.clone()),
    })
}

#[cfg(not(feature = "opencl"))]
fn probe_accelerator() -> Option<ComputeDevice> {
    debug!("Built without the `opencl` feature, no accelerators to probe.");
    None
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn half_only_takes_effect_on_discrete_gpu() {
        assert_eq!(
            Placement::resolve(DeviceTag::Gpu, true),
            Placement::AcceleratorHalf
        );
        assert_eq!(
            Placement::resolve(DeviceTag::Gpu, false),
            Placement::Accelerator
        );
        assert_eq!(Placement::resolve(DeviceTag::Cpu, true), Placement::Host);
        assert_eq!(
            Placement::resolve(DeviceTag::Unified, true),
            Placement::UnifiedAccelerator
        );
    }

    #[test]
    fn placement_maps_back_to_device_and_precision() {
        let p = Placement::resolve(DeviceTag::Gpu, true);
        assert_eq!(p.device(), DeviceTag::Gpu);
        assert_eq!(p.precision(), Precision::Half);
        assert_eq!(Placement::Host.device(), DeviceTag::Cpu);
        assert_eq!(Placement::UnifiedAccelerator.precision(), Precision::Full);
    }

    #[test]
    fn device_tags_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&DeviceTag::Gpu).unwrap(), "\"gpu\"");
        assert_eq!("unified".parse::<DeviceTag>(), Ok(DeviceTag::Unified));
        assert_eq!(DeviceTag::Cpu.to_string(), "cpu");
        // Older result files name the backend instead of the device kind
        assert_eq!(
            serde_json::from_str::<DeviceTag>("\"cuda\"").unwrap(),
            DeviceTag::Gpu
        );
        assert_eq!(
            serde_json::from_str::<DeviceTag>("\"mps\"").unwrap(),
            DeviceTag::Unified
        );
    }

    #[test]
    fn required_cpu_is_host() {
        let device = select_device(&DevicePreference::RequireCpu);
        assert_eq!(device.tag(), DeviceTag::Cpu);
        match device.backend() {
            Backend::Host => {}
            #[cfg(feature = "opencl")]
            Backend::OpenCl(_) => panic!("expected the host backend"),
        }
    }
}
