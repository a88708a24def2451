//! Host-side tensors handed to and returned from models.
use crate::device::{Placement, Precision};
use half::f16;
use ndarray::{ArrayD, IxDyn};
use rand::distributions::Uniform;
use rand::Rng;
use rand_distr::StandardNormal;

/// Activations flowing between layers are always f32 on the host.
pub type Activation = ArrayD<f32>;

#[derive(Clone, Debug, PartialEq)]
pub enum TensorData {
    F32(ArrayD<f32>),
    /// Reduced-precision float data
    F16(ArrayD<f16>),
    /// Token indices
    I64(ArrayD<i64>),
}

/// A tensor bound to the placement of the model it is meant for.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    data: TensorData,
    placement: Placement,
}

impl Tensor {
    /// Wraps float data, converting to half storage when the placement asks for it.
    pub fn from_f32(data: ArrayD<f32>, placement: Placement) -> Tensor {
        let data = match placement.precision() {
            Precision::Full => TensorData::F32(data),
            Precision::Half => TensorData::F16(data.mapv(f16::from_f32)),
        };
        Tensor { data, placement }
    }

    /// Wraps token indices; these stay integral under every placement.
    pub fn from_tokens(data: ArrayD<i64>, placement: Placement) -> Tensor {
        Tensor {
            data: TensorData::I64(data),
            placement,
        }
    }

    /// Standard-normal floats of the given shape.
    pub fn randn<R: Rng>(shape: &[usize], placement: Placement, rng: &mut R) -> Tensor {
        let data =
            ArrayD::from_shape_simple_fn(IxDyn(shape), || rng.sample::<f32, _>(StandardNormal));
        Tensor::from_f32(data, placement)
    }

    /// Integers drawn uniformly from `[0, high)`.
    pub fn randint<R: Rng>(
        shape: &[usize],
        high: i64,
        placement: Placement,
        rng: &mut R,
    ) -> Tensor {
        let dist = Uniform::new(0, high);
        let data = ArrayD::from_shape_simple_fn(IxDyn(shape), || rng.sample(&dist));
        Tensor::from_tokens(data, placement)
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }
    pub fn placement(&self) -> Placement {
        self.placement
    }
    pub fn shape(&self) -> &[usize] {
        match self.data {
            TensorData::F32(ref a) => a.shape(),
            TensorData::F16(ref a) => a.shape(),
            TensorData::I64(ref a) => a.shape(),
        }
    }
    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    pub fn batch_size(&self) -> usize {
        self.shape().first().cloned().unwrap_or(0)
    }
    pub fn is_integral(&self) -> bool {
        match self.data {
            TensorData::I64(_) => true,
            TensorData::F32(_) | TensorData::F16(_) => false,
        }
    }

    /// Widens the tensor into a host activation. Token indices become f32 values, which is exact
    /// for every vocabulary below 2^24 entries.
    pub fn to_activation(&self) -> Activation {
        match self.data {
            TensorData::F32(ref a) => a.clone(),
            TensorData::F16(ref a) => a.mapv(f16::to_f32),
            TensorData::I64(ref a) => a.mapv(|x| x as f32),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn half_placement_stores_f16() {
        let mut rng = StdRng::seed_from_u64(7);
        let t = Tensor::randn(&[2, 3, 4, 4], Placement::AcceleratorHalf, &mut rng);
        match t.data() {
            TensorData::F16(a) => assert_eq!(a.shape(), &[2, 3, 4, 4]),
            other => panic!("expected f16 storage, got {:?}", other),
        }
        assert_eq!(t.batch_size(), 2);
    }

    #[test]
    fn tokens_stay_integral_under_half_placement() {
        let mut rng = StdRng::seed_from_u64(7);
        let t = Tensor::randint(&[2, 16], 1000, Placement::AcceleratorHalf, &mut rng);
        assert!(t.is_integral());
        match t.data() {
            TensorData::I64(a) => assert!(a.iter().all(|&x| x >= 0 && x < 1000)),
            other => panic!("expected i64 storage, got {:?}", other),
        }
    }

    #[test]
    fn same_seed_same_tensor() {
        let a = Tensor::randn(&[1, 8], Placement::Host, &mut StdRng::seed_from_u64(1));
        let b = Tensor::randn(&[1, 8], Placement::Host, &mut StdRng::seed_from_u64(1));
        assert_eq!(a, b);
    }
}
