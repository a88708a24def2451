use super::*;
#[cfg(feature = "opencl")]
use crate::device::cl::ClLayer;
use crate::geometry::{Square, Window};
use crate::math::conv2d;
use crate::network::{Init, WeightSource};
use ndarray::Ix1;

/// A grouped 2D convolution over NCHW activations
pub struct Conv2d {
    name: String,
    in_channels: usize,
    out_channels: usize,
    window: Window,
    groups: usize,
    weight: Param,
    bias: Option<Param>,
    #[cfg(feature = "opencl")]
    device: Option<ClLayer>,
}

impl Conv2d {
    /// Creates a convolution with weights of shape (out, in / groups, height, width).
    pub fn new(
        src: &mut WeightSource,
        name: &str,
        in_channels: usize,
        out_channels: usize,
        window: Window,
        groups: usize,
        with_bias: bool,
    ) -> Result<Conv2d> {
        if groups == 0 || in_channels % groups != 0 || out_channels % groups != 0 {
            return Err(BenchError::shape_mismatch(
                name,
                format!("channels divisible by {} groups", groups),
                (in_channels, out_channels),
            ));
        }
        debug!(
            "Create conv-layer {} with input: {}, output: {}, window: {}x{}/{}, groups: {}.",
            name,
            in_channels,
            out_channels,
            window.height(),
            window.width(),
            window.stride(),
            groups
        );
        let in_per_group = in_channels / groups;
        let fan_in = in_per_group * window.num_elems();
        let weight = src.param(
            &format!("{}.weight", name),
            &[out_channels, in_per_group, window.height(), window.width()],
            Init::KaimingNormal { fan_in },
        )?;
        let bias = if with_bias {
            Some(src.param(&format!("{}.bias", name), &[out_channels], Init::Zeros)?)
        } else {
            None
        };
        Ok(Conv2d {
            name: name.to_owned(),
            in_channels,
            out_channels,
            window,
            groups,
            weight,
            bias,
            #[cfg(feature = "opencl")]
            device: None,
        })
    }
}

impl Layer for Conv2d {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, input: Activation) -> Result<Activation> {
        expect_channels(&self.name, &input, self.in_channels)?;
        let x = to_nchw(&self.name, input)?;

        #[cfg(feature = "opencl")]
        {
            if let Some(ref cl) = self.device {
                let out = cl.conv2d(x.view(), self.out_channels, &self.window, self.groups)?;
                return Ok(out.into_dyn());
            }
        }

        let cols = self.weight.len() / self.out_channels;
        let weights = self.weight.value().view().into_shape((self.out_channels, cols))?;
        let bias = self
            .bias
            .as_ref()
            .map(|b| b.value().view().into_dimensionality::<Ix1>())
            .transpose()?;
        Ok(conv2d(x.view(), weights, bias, &self.window, self.groups)?.into_dyn())
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
