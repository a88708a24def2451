use super::*;
use crate::device::Placement;
use crate::tensor::Tensor;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;

fn small_mobilenet(seed: u64) -> Network {
    mobilenet_v2(&mut WeightSource::seeded(seed), Scale::new(16).unwrap()).unwrap()
}

#[test]
fn parameter_names_are_unique() {
    let net = small_mobilenet(1);
    let mut seen = HashSet::new();
    for p in net.parameters() {
        assert!(
            seen.insert(p.name().to_owned()),
            "duplicate parameter {}",
            p.name()
        );
    }
    assert!(seen.contains("classifier.fc.weight"));
}

#[test]
fn eval_leaves_training_mode() {
    let mut net = small_mobilenet(1);
    assert!(net.is_training());
    net.eval();
    assert!(!net.is_training());
}

#[test]
fn scale_rejects_zero_divisor() {
    assert!(Scale::new(0).is_err());
    assert_eq!(Scale::new(8).unwrap().ch(4), 1);
    assert_eq!(Scale::full().ch(32), 32);
}

#[test]
fn exported_weights_load_back_identically() {
    let dir = tempfile::tempdir().unwrap();
    let net = small_mobilenet(5);
    let count = net.export_weights(dir.path()).unwrap();
    assert_eq!(count, net.parameters().len());

    let scale = Scale::new(16).unwrap();
    let loaded = mobilenet_v2(&mut WeightSource::directory(dir.path()), scale).unwrap();
    let a = net.parameters();
    let b = loaded.parameters();
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b.iter()) {
        assert_eq!(x, y);
    }
}

#[test]
fn missing_weight_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    match mobilenet_v2(
        &mut WeightSource::directory(dir.path()),
        Scale::new(16).unwrap(),
    ) {
        Err(BenchError::InvalidWeights { .. }) | Err(BenchError::Io(_)) => {}
        Err(other) => panic!("expected a weights error, got {:?}", other),
        Ok(_) => panic!("built a network from an empty directory"),
    }
}

#[test]
fn scaled_classifier_keeps_thousand_classes() {
    let mut net = small_mobilenet(2);
    net.eval();
    let input = Tensor::randn(
        &[1, 3, 224, 224],
        Placement::Host,
        &mut StdRng::seed_from_u64(3),
    );
    let out = net.forward(input.to_activation()).unwrap();
    assert_eq!(out.shape(), &[1, NUM_CLASSES]);
}

#[test]
fn predict_rejects_input_on_another_placement() {
    let mut net = small_mobilenet(2);
    net.eval();
    let handle = ModelHandle::new(ModelId::MobilenetV2, net, Placement::Host, "host");
    let mut rng = StdRng::seed_from_u64(3);
    let input = Tensor::randn(&[1, 3, 224, 224], Placement::Accelerator, &mut rng);
    match handle.predict(&input) {
        Err(BenchError::PlacementMismatch { model, input }) => {
            assert_eq!(model, "cpu (f32)");
            assert_eq!(input, "gpu (f32)");
        }
        Err(other) => panic!("expected PlacementMismatch, got {:?}", other),
        Ok(_) => panic!("expected PlacementMismatch"),
    }
}

#[test]
fn small_resnet_and_inception_build() {
    let scale = Scale::new(16).unwrap();
    let mut src = WeightSource::seeded(9);
    let resnet = resnet50(&mut src, scale).unwrap();
    let inception = inception_v3(&mut src, scale).unwrap();
    assert!(resnet.num_weights() > 0);
    assert!(inception.num_weights() > 0);
}
