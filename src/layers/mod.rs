mod activation;
#[cfg(feature = "transformers")]
mod attention;
mod block;
mod conv;
mod dense;
mod dropout;
#[cfg(feature = "transformers")]
mod embedding;
mod norm;
mod pool;
#[cfg(test)]
mod test;

pub use self::activation::*;
#[cfg(feature = "transformers")]
pub use self::attention::*;
pub use self::block::*;
pub use self::conv::*;
pub use self::dense::*;
pub use self::dropout::*;
#[cfg(feature = "transformers")]
pub use self::embedding::*;
pub use self::norm::*;
pub use self::pool::*;

#[cfg(feature = "opencl")]
use crate::device::cl::ClContext;
use crate::device::{Backend, ComputeDevice, Placement, Precision};
use crate::error::{BenchError, Result};
use crate::tensor::Activation;
use half::f16;
use ndarray::{Array4, ArrayD, Ix4};

/// A named, trainable tensor of a layer.
#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    name: String,
    value: ArrayD<f32>,
}

impl Param {
    pub fn new(name: impl Into<String>, value: ArrayD<f32>) -> Param {
        Param {
            name: name.into(),
            value,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn value(&self) -> &ArrayD<f32> {
        &self.value
    }
    pub fn value_mut(&mut self) -> &mut ArrayD<f32> {
        &mut self.value
    }
    pub fn len(&self) -> usize {
        self.value.len()
    }
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
    /// Rounds every value to the nearest half-precision float.
    pub fn round_to_half(&mut self) {
        self.value.mapv_inplace(|x| f16::from_f32(x).to_f32());
    }
}

/// Where layers are being placed: the placement plus, for accelerated placements with an OpenCL
/// device, the context their device-side weights live in.
#[derive(Clone, Debug)]
pub struct Target {
    placement: Placement,
    #[cfg(feature = "opencl")]
    cl: Option<ClContext>,
}

impl Target {
    pub fn host() -> Target {
        Target {
            placement: Placement::Host,
            #[cfg(feature = "opencl")]
            cl: None,
        }
    }

    pub fn new(device: &ComputeDevice, placement: Placement) -> Result<Target> {
        match *device.backend() {
            Backend::Host => Ok(Target {
                placement,
                #[cfg(feature = "opencl")]
                cl: None,
            }),
            #[cfg(feature = "opencl")]
            Backend::OpenCl(ref cl_device) => {
                let cl = if placement.is_accelerated() {
                    Some(ClContext::new(cl_device, placement.precision())?)
                } else {
                    None
                };
                Ok(Target { placement, cl })
            }
        }
    }

    pub fn placement(&self) -> Placement {
        self.placement
    }

    #[cfg(feature = "opencl")]
    pub fn cl(&self) -> Option<&ClContext> {
        self.cl.as_ref()
    }
}

/// Describes a layer of a neural network running in inference.
pub trait Layer {
    fn name(&self) -> &str;

    /// Runs the layer. Takes `&self`: nothing is recorded for a backward pass and nothing is
    /// retained between calls.
    fn forward(&self, input: Activation) -> Result<Activation>;

    fn parameters(&self) -> Vec<&Param> {
        vec![]
    }
    fn parameters_mut(&mut self) -> Vec<&mut Param> {
        vec![]
    }
    fn num_weights(&self) -> usize {
        self.parameters().iter().map(|p| p.len()).sum()
    }

    /// Switches training-only behavior (e.g. dropout) on or off.
    fn set_training(&mut self, _training: bool) {}

    /// Binds the layer to a placement. Host layers only need their parameters rounded when the
    /// placement uses reduced precision.
    fn place(&mut self, target: &Target) -> Result<()> {
        round_params(self.parameters_mut(), target);
        Ok(())
    }
}

pub(crate) fn round_params(params: Vec<&mut Param>, target: &Target) {
    if target.placement().precision() == Precision::Half {
        for p in params {
            p.round_to_half();
        }
    }
}

/// Views an activation as an NCHW batch, or fails naming the layer.
pub(crate) fn to_nchw(layer: &str, input: Activation) -> Result<Array4<f32>> {
    let shape = input.shape().to_vec();
    input
        .into_dimensionality::<Ix4>()
        .map_err(|_| BenchError::shape_mismatch(layer, "[batch, channels, height, width]", shape))
}

/// Copies the array into row-major order if it is not laid out that way already.
pub(crate) fn standard_layout(a: Activation) -> Activation {
    if a.is_standard_layout() {
        a
    } else {
        a.as_standard_layout().into_owned()
    }
}

/// Checks the size of axis 1 of an activation.
pub(crate) fn expect_channels(layer: &str, input: &Activation, channels: usize) -> Result<()> {
    match input.shape().get(1) {
        Some(&c) if c == channels => Ok(()),
        _ => Err(BenchError::shape_mismatch(
            layer,
            format!("{} channels", channels),
            input.shape(),
        )),
    }
}

/// Layers applied one after another.
pub struct Sequential {
    name: String,
    layers: Vec<Box<dyn Layer>>,
}

impl Sequential {
    pub fn new(name: impl Into<String>) -> Sequential {
        Sequential {
            name: name.into(),
            layers: vec![],
        }
    }
    pub fn push<L: Layer + 'static>(&mut self, layer: L) {
        trace!("{}: push layer {}.", self.name, layer.name());
        self.layers.push(Box::new(layer));
    }
    pub fn with<L: Layer + 'static>(mut self, layer: L) -> Sequential {
        self.push(layer);
        self
    }
    pub fn len(&self) -> usize {
        self.layers.len()
    }
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl Layer for Sequential {
    fn name(&self) -> &str {
        &self.name
    }
    fn forward(&self, input: Activation) -> Result<Activation> {
        self.layers
            .iter()
            .try_fold(input, |x, layer| layer.forward(x))
    }
    fn parameters(&self) -> Vec<&Param> {
        self.layers.iter().flat_map(|l| l.parameters()).collect()
    }
    fn parameters_mut(&mut self) -> Vec<&mut Param> {
        self.layers
            .iter_mut()
            .flat_map(|l| l.parameters_mut())
            .collect()
    }
    fn set_training(&mut self, training: bool) {
        for layer in self.layers.iter_mut() {
            layer.set_training(training);
        }
    }
    fn place(&mut self, target: &Target) -> Result<()> {
        for layer in self.layers.iter_mut() {
            layer.place(target)?;
        }
        Ok(())
    }
}
