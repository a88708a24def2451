use super::*;
#[cfg(feature = "opencl")]
use crate::device::cl::ClLayer;
use crate::math::linear;
use crate::network::{Init, WeightSource};
use ndarray::{Ix1, IxDyn};

/// A fully-connected layer applied over the last axis of its input
pub struct Linear {
    name: String,
    in_features: usize,
    out_features: usize,
    weight: Param,
    bias: Option<Param>,
    #[cfg(feature = "opencl")]
    device: Option<ClLayer>,
}

impl Linear {
    /// Creates a fully-connected layer with weights of shape (out, in).
    pub fn new(
        src: &mut WeightSource,
        name: &str,
        in_features: usize,
        out_features: usize,
        init: Init,
    ) -> Result<Linear> {
        debug!(
            "Create dense-layer {} with input-size: {}, output-size: {}.",
            name, in_features, out_features
        );
        trace!(
            "\t↳ weights-size: {0}x{1} = {2}.",
            out_features,
            in_features,
            in_features * out_features
        );
        Ok(Linear {
            name: name.to_owned(),
            in_features,
            out_features,
            weight: src.param(
                &format!("{}.weight", name),
                &[out_features, in_features],
                init,
            )?,
            bias: Some(src.param(&format!("{}.bias", name), &[out_features], Init::Zeros)?),
            #[cfg(feature = "opencl")]
            device: None,
        })
    }
}

impl Layer for Linear {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, input: Activation) -> Result<Activation> {
        let mut shape = input.shape().to_vec();
        match shape.last() {
            Some(&n) if n == self.in_features => {}
            _ => {
                return Err(BenchError::shape_mismatch(
                    &self.name,
                    format!("last axis of {}", self.in_features),
                    shape,
                ))
            }
        }
        let rows = input.len() / self.in_features;
        let x = standard_layout(input).into_shape((rows, self.in_features))?;

        #[cfg(feature = "opencl")]
        let out = match self.device {
            Some(ref cl) => cl.linear(x.view(), self.out_features)?,
            None => self.host_forward(x.view())?,
        };
        #[cfg(not(feature = "opencl"))]
        let out = self.host_forward(x.view())?;

        if let Some(last) = shape.last_mut() {
            *last = self.out_features;
        }
        Ok(out.into_shape(IxDyn(&shape))?)
    }

    fn parameters(&self) -> Vec<&Param> {
        let mut params = vec![&self.weight];
        params.extend(self.bias.as_ref());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Param> {
        let mut params = vec![&mut self.weight];
        params.extend(self.bias.as_mut());
        params
    }

    fn place(&mut self, target: &Target) -> Result<()> {
        round_params(self.parameters_mut(), target);

        #[cfg(feature = "opencl")]
        {
            if let Some(cl) = target.cl() {
                let weights = self.weight.value().iter().cloned().collect::<Vec<f32>>();
                let bias = self
                    .bias
                    .as_ref()
                    .map(|b| b.value().iter().cloned().collect::<Vec<f32>>());
                self.device = Some(ClLayer::upload(cl, &weights, bias.as_deref())?);
            }
        }
        Ok(())
    }
}

impl Linear {
    fn host_forward(&self, x: ndarray::ArrayView2<f32>) -> Result<ndarray::Array2<f32>> {
        let weights = self
            .weight
            .value()
            .view()
            .into_shape((self.out_features, self.in_features))?;
        let bias = self
            .bias
            .as_ref()
            .map(|b| b.value().view().into_dimensionality::<Ix1>())
            .transpose()?;
        Ok(linear(x, weights, bias))
    }
}
