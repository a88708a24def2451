use super::*;
use crate::tensor::TensorData;
use proptest::prelude::*;

#[test]
fn mobilenet_on_cpu_gets_image_batch() {
    let (model, input, device) =
        provision_with("mobilenet_v2", 1, false, &smoke_options()).unwrap();
    assert_eq!(device, DeviceTag::Cpu);
    assert_eq!(input.shape(), &[1, 3, 224, 224]);
    assert_eq!(model.id(), ModelId::MobilenetV2);
    assert_eq!(model.placement().device(), device);
    assert_eq!(input.placement(), model.placement());
}

#[test]
fn every_available_image_model_provisions() {
    for id in ModelId::ALL.iter() {
        let entry = registry::entry(*id).unwrap();
        if entry.family() != registry::ModelFamily::ImageClassification {
            continue;
        }
        let (model, input, device) =
            provision_with(id.as_str(), 1, false, &smoke_options()).unwrap();
        assert_eq!(model.placement(), Placement::resolve(device, false));
        assert_eq!(input.placement(), model.placement());
        assert_eq!(
            model.predict(&input).unwrap().shape(),
            &[1, network::NUM_CLASSES]
        );
    }
}

#[cfg(not(feature = "transformers"))]
#[test]
fn bert_needs_the_transformers_feature() {
    match provision_with("bert", 1, false, &smoke_options()) {
        Err(BenchError::DependencyMissing { model, feature }) => {
            assert_eq!(model, "bert");
            assert_eq!(feature, "transformers");
        }
        Err(other) => panic!("expected DependencyMissing, got {:?}", other),
        Ok(_) => panic!("expected DependencyMissing"),
    }
}

#[cfg(feature = "transformers")]
#[test]
fn sequence_models_get_token_batches() {
    for name in &["bert", "gpt2"] {
        let (model, input, _) = provision_with(name, 2, true, &smoke_options()).unwrap();
        match input.data() {
            TensorData::I64(a) => {
                assert_eq!(a.shape(), &[2, SEQUENCE_LEN]);
                assert!(a.iter().all(|&t| t >= 0 && t < TOKEN_RANGE));
            }
            other => panic!("expected token indices, got {:?}", other),
        }
        assert!(model.predict(&input).is_ok());
    }
}

#[test]
fn stored_weights_reproduce_the_seeded_model() {
    let dir = tempfile::tempdir().unwrap();
    let (seeded, _, _) = provision_with("efficientnet_b0", 1, false, &smoke_options()).unwrap();
    seeded.export_weights(dir.path()).unwrap();

    let options = ProvisionOptions {
        weights_dir: Some(dir.path().to_path_buf()),
        seed: 7,
        ..smoke_options()
    };
    let (loaded, _, _) = provision_with("efficientnet_b0", 1, false, &options).unwrap();
    assert_eq!(seeded.snapshot(), loaded.snapshot());
}

#[test]
fn half_request_on_cpu_keeps_full_precision_input() {
    let (_, input, _) = provision_with("resnet50", 1, true, &smoke_options()).unwrap();
    match input.data() {
        TensorData::F32(_) => {}
        other => panic!("expected f32 input, got {:?}", other),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn unsupported_ids_are_named_in_the_error(name in "[a-z][a-z0-9_]{0,15}") {
        prop_assume!(name.parse::<ModelId>().is_err());
        match provision(&name, 1, false) {
            Err(BenchError::UnsupportedModel { model }) => prop_assert_eq!(model, name),
            Err(other) => prop_assert!(false, "expected UnsupportedModel, got {:?}", other),
            Ok(_) => prop_assert!(false, "{} provisioned", name),
        }
    }
}
