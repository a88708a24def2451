#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;

pub mod device;
pub mod error;
pub mod geometry;
pub mod layers;
pub mod math;
pub mod network;
pub mod profiler;
pub mod provision;
pub mod registry;
pub mod report;
pub mod sweep;
pub mod tensor;
pub mod util;
#[cfg(test)]
mod tests;

pub use crate::device::{DevicePreference, DeviceTag, Placement, Precision};
pub use crate::error::{BenchError, Result};
pub use crate::network::{ModelHandle, Predict};
pub use crate::profiler::{Profiler, RunMetrics};
pub use crate::provision::{provision, provision_with, ProvisionOptions};
pub use crate::registry::ModelId;
pub use crate::report::{run_benchmark, BenchmarkConfig, BenchmarkResult};
pub use crate::tensor::Tensor;

use crate::geometry::ImageGeometry;

/// Input of every image-classification model: 3-channel 224x224 images.
pub const IMAGE_INPUT: ImageGeometry = ImageGeometry::new(224, 3);
/// Tokens per sequence-model input
pub const SEQUENCE_LEN: usize = 16;
/// Token indices are drawn from `[0, TOKEN_RANGE)`
pub const TOKEN_RANGE: i64 = 1000;
pub const RESULTS_DIR: &str = "results";
