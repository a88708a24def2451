//! Error types for provisioning, profiling and result handling.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for benchmark operations.
pub type Result<T> = std::result::Result<T, BenchError>;

/// Errors that can abort a benchmark invocation.
///
/// Unavailable measurements (e.g. no GPU memory query) are not errors; the
/// profiler reports those as zero.
#[derive(Debug, Error)]
pub enum BenchError {
    /// The model identifier is not one of the registered architectures.
    #[error("unsupported model: {model}")]
    UnsupportedModel { model: String },

    /// The model family needs a component this build was compiled without.
    #[error("model {model} requires the `{feature}` feature, which this build does not include")]
    DependencyMissing { model: String, feature: &'static str },

    /// Input placement does not agree with the model placement.
    #[error("placement mismatch: model is on {model}, input is on {input}")]
    PlacementMismatch { model: String, input: String },

    /// A layer received an activation of an unexpected shape.
    #[error("shape mismatch in {layer}: expected {expected}, got {actual}")]
    ShapeMismatch {
        layer: String,
        expected: String,
        actual: String,
    },

    /// Weight file missing, unreadable or of the wrong length.
    #[error("invalid weights file {path}: {reason}")]
    InvalidWeights { path: PathBuf, reason: String },

    /// Benchmark configuration out of range.
    #[error("invalid benchmark configuration: {0}")]
    InvalidConfig(String),

    /// A sweep could not start a child benchmark process.
    #[error("child benchmark failed to start: {0}")]
    ChildFailed(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("tensor shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("chart encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[cfg(feature = "opencl")]
    #[error("opencl error: {0}")]
    OpenCl(String),
}

#[cfg(feature = "opencl")]
impl From<ocl::Error> for BenchError {
    fn from(err: ocl::Error) -> Self {
        BenchError::OpenCl(err.to_string())
    }
}

impl BenchError {
    pub fn unsupported_model(model: impl Into<String>) -> Self {
        BenchError::UnsupportedModel {
            model: model.into(),
        }
    }

    pub fn shape_mismatch(
        layer: impl Into<String>,
        expected: impl std::fmt::Debug,
        actual: impl std::fmt::Debug,
    ) -> Self {
        BenchError::ShapeMismatch {
            layer: layer.into(),
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        }
    }

    pub fn invalid_weights(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        BenchError::InvalidWeights {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
