mod convolve;

pub use self::convolve::*;
use ndarray::{Array2, ArrayD, ArrayView1, ArrayView2, Axis};
use num_traits::{Float, FromPrimitive};

/// Convert negative values to zero
pub fn relu<T: Float>(x: T) -> T {
    x.max(T::zero())
}

/// ReLU clamped at six, as used by the MobileNet family
pub fn relu6<T: Float + FromPrimitive>(x: T) -> T {
    let six = T::from_f32(6.0).unwrap_or_else(T::max_value);
    x.max(T::zero()).min(six)
}

pub fn sigmoid<T: Float>(x: T) -> T {
    T::one() / (T::one() + (-x).exp())
}

/// Sigmoid-weighted linear unit (swish)
pub fn silu<T: Float>(x: T) -> T {
    x * sigmoid(x)
}

/// GELU with the tanh approximation used by GPT-2
pub fn gelu<T: Float + FromPrimitive>(x: T) -> T {
    let half = T::from_f32(0.5).unwrap_or_else(T::zero);
    let coeff = T::from_f32(0.044_715).unwrap_or_else(T::zero);
    let sqrt_2_over_pi = T::from_f64((2.0 / std::f64::consts::PI).sqrt()).unwrap_or_else(T::one);
    half * x * (T::one() + (sqrt_2_over_pi * (x + coeff * x * x * x)).tanh())
}

/// Softmax over the last axis, in place.
pub fn softmax_last_axis(x: &mut ArrayD<f32>) {
    let last = Axis(x.ndim().saturating_sub(1));
    for mut lane in x.lanes_mut(last) {
        let max = lane.fold(std::f32::NEG_INFINITY, |m, &v| m.max(v));
        lane.mapv_inplace(|v| (v - max).exp());
        let sum = lane.sum();
        if sum > 0.0 {
            lane.mapv_inplace(|v| v / sum);
        }
    }
}

/// Layer normalization over the last axis, in place.
pub fn layer_norm_last_axis(
    x: &mut ArrayD<f32>,
    gamma: ArrayView1<f32>,
    beta: ArrayView1<f32>,
    eps: f32,
) {
    let last = Axis(x.ndim().saturating_sub(1));
    for mut lane in x.lanes_mut(last) {
        let n = lane.len() as f32;
        let mean = lane.sum() / n;
        let var = lane.fold(0.0, |acc, &v| acc + (v - mean) * (v - mean)) / n;
        let inv_std = 1.0 / (var + eps).sqrt();
        for (i, v) in lane.iter_mut().enumerate() {
            *v = (*v - mean) * inv_std * gamma[i] + beta[i];
        }
    }
}

/// Multiplies row-major `input` (rows x in) with `weights` stored as (out x in) and adds `bias`.
pub fn linear(
    input: ArrayView2<f32>,
    weights: ArrayView2<f32>,
    bias: Option<ArrayView1<f32>>,
) -> Array2<f32> {
    let mut out = input.dot(&weights.t());
    if let Some(b) = bias {
        out += &b;
    }
    out
}
