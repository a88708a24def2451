//! Builds a model and a matching synthetic input for one benchmark invocation.
use crate::device::{select_device, ComputeDevice, DevicePreference, DeviceTag, Placement};
use crate::error::{BenchError, Result};
use crate::layers::Target;
use crate::network::{ModelHandle, Scale, WeightSource};
use crate::registry::{self, ModelId};
use crate::tensor::Tensor;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;

/// Knobs of provisioning that the benchmark command line does not fix.
#[derive(Clone, Debug, PartialEq)]
pub struct ProvisionOptions {
    /// Seeds random weights; the input is drawn from `seed + 1`
    pub seed: u64,
    /// Divides every channel count and hidden size, 1 builds the reference architecture
    pub width_divisor: usize,
    pub weights_dir: Option<PathBuf>,
    pub device: DevicePreference,
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        ProvisionOptions {
            seed: 0,
            width_divisor: 1,
            weights_dir: None,
            device: DevicePreference::Auto,
        }
    }
}

/// Provisions `model_id` with default options.
pub fn provision(
    model_id: &str,
    batch_size: usize,
    use_half: bool,
) -> Result<(ModelHandle, Tensor, DeviceTag)> {
    provision_with(model_id, batch_size, use_half, &ProvisionOptions::default())
}

/// Builds the model in inference mode, places it on the selected device and draws an input of
/// the family's shape on the same placement.
pub fn provision_with(
    model_id: &str,
    batch_size: usize,
    use_half: bool,
    options: &ProvisionOptions,
) -> Result<(ModelHandle, Tensor, DeviceTag)> {
    provision_on(model_id, batch_size, use_half, options, || select_device(&options.device))
}

/// `select` runs only once the request has been validated.
fn provision_on<F: FnOnce() -> ComputeDevice>(
    model_id: &str,
    batch_size: usize,
    use_half: bool,
    options: &ProvisionOptions,
    select: F,
) -> Result<(ModelHandle, Tensor, DeviceTag)> {
    // Everything that can be rejected is checked before any construction
    let id = model_id.parse::<ModelId>()?;
    if batch_size == 0 {
        return Err(BenchError::InvalidConfig("batch size must be at least 1".to_owned()));
    }
    let scale = Scale::new(options.width_divisor)?;
    let entry = registry::entry(id)?;
    let build = entry.builder(id)?;

    let device = select();
    let placement = Placement::resolve(device.tag(), use_half);

    let mut src = match options.weights_dir {
        Some(ref dir) => WeightSource::directory(dir),
        None => WeightSource::seeded(options.seed),
    };
    let mut network = build(&mut src, scale)?;
    network.eval();
    network.place(&Target::new(&device, placement)?)?;

    let mut rng = StdRng::seed_from_u64(options.seed.wrapping_add(1));
    let input = entry.input().synthesize(batch_size, placement, &mut rng);

    info!(
        "Provisioned {} ({}, {} weights, width / {}) on {} with input {:?}.",
        id,
        entry.family(),
        network.num_weights(),
        scale.divisor(),
        placement,
        input.shape()
    );
    let handle = ModelHandle::new(id, network, placement, device.name());
    Ok((handle, input, device.tag()))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::network::Predict;
    use crate::tensor::TensorData;
    use half::f16;

    fn smoke() -> ProvisionOptions {
        ProvisionOptions {
            width_divisor: 16,
            device: DevicePreference::RequireCpu,
            ..ProvisionOptions::default()
        }
    }

    #[test]
    fn unknown_model_fails_before_construction() {
        match provision_with("alexnet", 1, false, &smoke()) {
            Err(BenchError::UnsupportedModel { model }) => assert_eq!(model, "alexnet"),
            Err(other) => panic!("expected UnsupportedModel, got {:?}", other),
            Ok(_) => panic!("expected UnsupportedModel"),
        }
    }

    #[test]
    fn zero_batch_is_invalid() {
        match provision_with("mobilenet_v2", 0, false, &smoke()) {
            Err(BenchError::InvalidConfig(_)) => {}
            Err(other) => panic!("expected InvalidConfig, got {:?}", other),
            Ok(_) => panic!("expected InvalidConfig"),
        }
    }

    #[test]
    fn half_is_ignored_on_cpu() {
        let (model, input, device) = provision_with("efficientnet_b0", 2, true, &smoke()).unwrap();
        assert_eq!(device, DeviceTag::Cpu);
        assert_eq!(model.placement(), Placement::Host);
        assert_eq!(input.placement(), model.placement());
        match input.data() {
            TensorData::F32(a) => assert_eq!(a.shape(), &[2, 3, 224, 224]),
            other => panic!("expected f32 input, got {:?}", other),
        }
    }

    #[test]
    fn half_on_a_discrete_gpu_rounds_params_and_input() {
        let gpu = || ComputeDevice::host_as(DeviceTag::Gpu);
        let (model, input, device) = provision_on("resnet50", 1, true, &smoke(), gpu).unwrap();
        assert_eq!(device, DeviceTag::Gpu);
        assert_eq!(model.placement(), Placement::AcceleratorHalf);
        assert_eq!(input.placement(), Placement::AcceleratorHalf);
        match input.data() {
            TensorData::F16(a) => assert_eq!(a.shape(), &[1, 3, 224, 224]),
            other => panic!("expected f16 input, got {:?}", other),
        }
        for p in model.snapshot() {
            let rounded = p.value().iter().all(|&x| f16::from_f32(x).to_f32() == x);
            assert!(rounded, "{} not rounded", p.name());
        }

        let out = model.predict(&input).unwrap();
        assert_eq!(out.shape(), &[1, 1000]);
        assert_eq!(out.placement(), Placement::AcceleratorHalf);
    }

    #[test]
    fn full_precision_on_a_discrete_gpu_keeps_f32() {
        let gpu = || ComputeDevice::host_as(DeviceTag::Gpu);
        let (model, input, _) = provision_on("mobilenet_v2", 1, false, &smoke(), gpu).unwrap();
        assert_eq!(model.placement(), Placement::Accelerator);
        assert!(matches!(input.data(), TensorData::F32(_)));
    }

    #[test]
    fn same_seed_same_model_and_input() {
        let (a, x, _) = provision_with("mobilenet_v2", 1, false, &smoke()).unwrap();
        let (b, y, _) = provision_with("mobilenet_v2", 1, false, &smoke()).unwrap();
        assert_eq!(a.snapshot(), b.snapshot());
        assert_eq!(x, y);
        assert!(!a.network().is_training());
    }
}
