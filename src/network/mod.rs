#[cfg(test)]
mod test;
#[cfg(feature = "transformers")]
mod transformer;
mod vision;
mod weights;

#[cfg(feature = "transformers")]
pub use self::transformer::*;
pub use self::vision::*;
pub use self::weights::*;

use crate::device::Placement;
use crate::error::{BenchError, Result};
use crate::layers::{Layer, Param, Sequential, Target};
use crate::registry::ModelId;
use crate::tensor::{Activation, Tensor};
use std::path::Path;

/// Uniform reduction of the channel counts and hidden sizes of an architecture. Depths, kernel
/// sizes, input geometry and the number of output classes are unaffected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scale {
    divisor: usize,
}

impl Scale {
    pub fn full() -> Scale {
        Scale { divisor: 1 }
    }
    pub fn new(divisor: usize) -> Result<Scale> {
        if divisor == 0 {
            return Err(BenchError::InvalidConfig(
                "width divisor must be at least 1".to_owned(),
            ));
        }
        Ok(Scale { divisor })
    }
    pub fn divisor(&self) -> usize {
        self.divisor
    }
    /// Scaled width, never below one.
    pub fn ch(&self, channels: usize) -> usize {
        (channels / self.divisor).max(1)
    }
}

impl Default for Scale {
    fn default() -> Self {
        Scale::full()
    }
}

/// A complete model: a named stack of layers with a training/inference switch.
pub struct Network {
    name: String,
    body: Sequential,
    training: bool,
}

impl Network {
    /// Wraps `body`. Like a freshly constructed model, the network starts in training mode.
    pub fn new(name: &str, mut body: Sequential) -> Network {
        body.set_training(true);
        let network = Network {
            name: name.to_owned(),
            body,
            training: true,
        };
        debug!(
            "Create network {} with {} top-level layers and {} weights.",
            network.name,
            network.body.len(),
            network.num_weights()
        );
        network
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Switches every layer to inference mode.
    pub fn eval(&mut self) {
        self.set_training(false);
    }
    fn set_training(&mut self, training: bool) {
        self.training = training;
        self.body.set_training(training);
    }
    pub fn is_training(&self) -> bool {
        self.training
    }

    pub fn forward(&self, input: Activation) -> Result<Activation> {
        self.body.forward(input)
    }

    pub fn parameters(&self) -> Vec<&Param> {
        self.body.parameters()
    }
    pub fn num_weights(&self) -> usize {
        self.body.num_weights()
    }

    pub fn place(&mut self, target: &Target) -> Result<()> {
        debug!("Place network {} on {}.", self.name, target.placement());
        self.body.place(target)
    }

    /// Writes every parameter as `<dir>/<param-name>.bin`.
    pub fn export_weights<P: AsRef<Path>>(&self, dir: P) -> Result<usize> {
        export_params(self.parameters(), dir.as_ref())
    }
}

pub trait Predict {
    fn predict(&self, input: &Tensor) -> Result<Tensor>;
}

/// A provisioned model: the network in inference mode, bound to a placement.
pub struct ModelHandle {
    id: ModelId,
    network: Network,
    placement: Placement,
    device_name: String,
}

impl ModelHandle {
    pub fn new(
        id: ModelId,
        network: Network,
        placement: Placement,
        device_name: &str,
    ) -> ModelHandle {
        ModelHandle {
            id,
            network,
            placement,
            device_name: device_name.to_owned(),
        }
    }
    pub fn id(&self) -> ModelId {
        self.id
    }
    pub fn placement(&self) -> Placement {
        self.placement
    }
    pub fn device_name(&self) -> &str {
        &self.device_name
    }
    pub fn network(&self) -> &Network {
        &self.network
    }
    pub fn num_weights(&self) -> usize {
        self.network.num_weights()
    }
    /// Owned copy of every parameter, for structural comparison.
    pub fn snapshot(&self) -> Vec<Param> {
        self.network.parameters().into_iter().cloned().collect()
    }
    pub fn export_weights<P: AsRef<Path>>(&self, dir: P) -> Result<usize> {
        self.network.export_weights(dir)
    }
}

impl Predict for ModelHandle {
    fn predict(&self, input: &Tensor) -> Result<Tensor> {
        if input.placement() != self.placement {
            return Err(BenchError::PlacementMismatch {
                model: self.placement.to_string(),
                input: input.placement().to_string(),
            });
        }
        let out = self.network.forward(input.to_activation())?;
        Ok(Tensor::from_f32(out, self.placement))
    }
}
