use super::*;
use crate::math::layer_norm_last_axis;
use crate::network::{Init, WeightSource};
use ndarray::{Axis, Ix1};

/// Batch normalization with frozen running statistics: a per-channel affine map over axis 1.
pub struct BatchNorm2d {
    name: String,
    channels: usize,
    eps: f32,
    gamma: Param,
    beta: Param,
    running_mean: Param,
    running_var: Param,
}

impl BatchNorm2d {
    pub fn new(
        src: &mut WeightSource,
        name: &str,
        channels: usize,
        eps: f32,
    ) -> Result<BatchNorm2d> {
        trace!("Create batch-norm {} over {} channels.", name, channels);
        Ok(BatchNorm2d {
            name: name.to_owned(),
            channels,
            eps,
            gamma: src.param(&format!("{}.weight", name), &[channels], Init::Ones)?,
            beta: src.param(&format!("{}.bias", name), &[channels], Init::Zeros)?,
            running_mean: src.param(&format!("{}.running_mean", name), &[channels], Init::Zeros)?,
            running_var: src.param(&format!("{}.running_var", name), &[channels], Init::Ones)?,
        })
    }
}

impl Layer for BatchNorm2d {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, mut input: Activation) -> Result<Activation> {
        expect_channels(&self.name, &input, self.channels)?;
        let gamma = self.gamma.value().view().into_dimensionality::<Ix1>()?;
        let beta = self.beta.value().view().into_dimensionality::<Ix1>()?;
        let mean = self.running_mean.value().view().into_dimensionality::<Ix1>()?;
        let var = self.running_var.value().view().into_dimensionality::<Ix1>()?;

        for (c, mut plane) in input.axis_iter_mut(Axis(1)).enumerate() {
            let scale = gamma[c] / (var[c] + self.eps).sqrt();
            let shift = beta[c] - mean[c] * scale;
            plane.mapv_inplace(|x| x * scale + shift);
        }
        Ok(input)
    }

    fn parameters(&self) -> Vec<&Param> {
        vec![&self.gamma, &self.beta, &self.running_mean, &self.running_var]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Param> {
        vec![
            &mut self.gamma,
            &mut self.beta,
            &mut self.running_mean,
            &mut self.running_var,
        ]
    }
}

/// Layer normalization over the last axis
pub struct LayerNorm {
    name: String,
    features: usize,
    eps: f32,
    gamma: Param,
    beta: Param,
}

impl LayerNorm {
    pub fn new(src: &mut WeightSource, name: &str, features: usize, eps: f32) -> Result<LayerNorm> {
        trace!("Create layer-norm {} over {} features.", name, features);
        Ok(LayerNorm {
            name: name.to_owned(),
            features,
            eps,
            gamma: src.param(&format!("{}.weight", name), &[features], Init::Ones)?,
            beta: src.param(&format!("{}.bias", name), &[features], Init::Zeros)?,
        })
    }
}

impl Layer for LayerNorm {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, mut input: Activation) -> Result<Activation> {
        if input.shape().last() != Some(&self.features) {
            return Err(BenchError::shape_mismatch(
                &self.name,
                format!("last axis of {}", self.features),
                input.shape(),
            ));
        }
        let gamma = self.gamma.value().view().into_dimensionality::<Ix1>()?;
        let beta = self.beta.value().view().into_dimensionality::<Ix1>()?;
        layer_norm_last_axis(&mut input, gamma, beta, self.eps);
        Ok(input)
    }

    fn parameters(&self) -> Vec<&Param> {
        vec![&self.gamma, &self.beta]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.gamma, &mut self.beta]
    }
}
