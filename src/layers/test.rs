use super::*;
use crate::geometry::Window;
use crate::network::{Init, WeightSource};
use approx::assert_abs_diff_eq;
use ndarray::{ArrayD, IxDyn};

fn ones(shape: &[usize]) -> Activation {
    ArrayD::ones(IxDyn(shape))
}

fn conv_bn_relu(src: &mut WeightSource, name: &str, cin: usize, cout: usize) -> Sequential {
    Sequential::new(name)
        .with(
            Conv2d::new(
                src,
                &format!("{}.conv", name),
                cin,
                cout,
                Window::same(3, 1),
                1,
                false,
            )
                .unwrap(),
        )
        .with(BatchNorm2d::new(src, &format!("{}.bn", name), cout, 1e-5).unwrap())
        .with(Activate::new(Act::Relu))
}

#[test]
fn sequential_threads_shapes_through() {
    let mut src = WeightSource::seeded(1);
    let net = conv_bn_relu(&mut src, "block", 3, 8)
        .with(Pool2d::max(Window::new(2, 2, 0)))
        .with(GlobalAvgPool)
        .with(Linear::new(&mut src, "fc", 8, 5, Init::Normal { std: 0.01 }).unwrap());

    let out = net.forward(ones(&[2, 3, 8, 8])).unwrap();
    assert_eq!(out.shape(), &[2, 5]);
    assert_eq!(net.parameters().len(), 1 + 4 + 2);
    assert_eq!(net.num_weights(), 8 * 3 * 9 + 4 * 8 + 5 * 8 + 5);
}

#[test]
fn conv_rejects_wrong_channel_count() {
    let mut src = WeightSource::seeded(1);
    let conv = Conv2d::new(&mut src, "c", 3, 4, Window::same(3, 1), 1, true).unwrap();
    match conv.forward(ones(&[1, 5, 8, 8])) {
        Err(BenchError::ShapeMismatch { layer, .. }) => assert_eq!(layer, "c"),
        other => panic!("expected a shape mismatch, got {:?}", other.map(|a| a.shape().to_vec())),
    }
}

#[test]
fn conv_rejects_indivisible_groups() {
    let mut src = WeightSource::seeded(1);
    assert!(Conv2d::new(&mut src, "c", 6, 4, Window::same(3, 1), 4, false).is_err());
}

#[test]
fn linear_applies_over_last_axis() {
    let mut src = WeightSource::seeded(1);
    let fc = Linear::new(&mut src, "fc", 6, 3, Init::Ones).unwrap();
    let out = fc.forward(ones(&[2, 4, 6])).unwrap();
    assert_eq!(out.shape(), &[2, 4, 3]);
    assert!(out.iter().all(|&x| x == 6.0));
}

#[test]
fn frozen_batch_norm_with_identity_statistics_is_identity() {
    let mut src = WeightSource::seeded(1);
    let bn = BatchNorm2d::new(&mut src, "bn", 2, 0.0).unwrap();
    let x = ones(&[1, 2, 3, 3]) * 0.5;
    let out = bn.forward(x.clone()).unwrap();
    for (a, b) in out.iter().zip(x.iter()) {
        assert_abs_diff_eq!(a, b);
    }
}

#[test]
fn dropout_is_identity_in_inference_mode() {
    let mut dropout = Dropout::new("drop", 0.5);
    assert!(dropout.is_training());
    dropout.set_training(false);
    let x = ones(&[4, 16]);
    assert_eq!(dropout.forward(x.clone()).unwrap(), x);

    dropout.set_training(true);
    let dropped = dropout.forward(ones(&[64, 64])).unwrap();
    assert!(dropped.iter().any(|&v| v == 0.0));
    assert!(dropped.iter().all(|&v| v == 0.0 || v == 2.0));
}

#[test]
fn sequential_propagates_training_flag() {
    let mut seq = Sequential::new("s").with(Dropout::new("d", 1.0));
    seq.set_training(false);
    assert_eq!(seq.forward(ones(&[1, 3])).unwrap(), ones(&[1, 3]));
}

#[test]
fn residual_adds_identity_shortcut() {
    let mut src = WeightSource::seeded(1);
    let fc = Linear::new(&mut src, "fc", 4, 4, Init::Zeros).unwrap();
    let body = Sequential::new("body").with(fc);
    let res = Residual::new("res", body).with_post(Activate::new(Act::Relu));
    let x = ones(&[2, 4]) * -1.0;
    // Zero body leaves the input, which the rectifier clears
    assert!(res.forward(x).unwrap().iter().all(|&v| v == 0.0));
}

#[test]
fn residual_detects_shape_disagreement() {
    let mut src = WeightSource::seeded(1);
    let fc = Linear::new(&mut src, "fc", 4, 2, Init::Zeros).unwrap();
    let body = Sequential::new("body").with(fc);
    assert!(Residual::new("res", body).forward(ones(&[1, 4])).is_err());
}

#[test]
fn concat_stacks_branch_channels() {
    let mut src = WeightSource::seeded(1);
    let one = Window::from_side(1);
    let branches = vec![
        Sequential::new("a").with(Conv2d::new(&mut src, "a", 3, 2, one, 1, false).unwrap()),
        Sequential::new("b").with(Conv2d::new(&mut src, "b", 3, 5, one, 1, false).unwrap()),
        Sequential::new("pool").with(Pool2d::avg(Window::new(3, 1, 1))),
    ];
    let out = Concat::new("mixed", branches).forward(ones(&[1, 3, 6, 6])).unwrap();
    assert_eq!(out.shape(), &[1, 10, 6, 6]);
}

#[test]
fn squeeze_excite_keeps_shape_and_halves_constant_input() {
    let mut src = WeightSource::seeded(1);
    let mut se = SqueezeExcite::new(&mut src, "se", 4, 1, Act::Silu).unwrap();
    // Zero weights: the excitation is sigmoid(0) = 0.5 everywhere
    for p in se.parameters_mut() {
        p.value_mut().fill(0.0);
    }
    let out = se.forward(ones(&[2, 4, 3, 3])).unwrap();
    assert_eq!(out.shape(), &[2, 4, 3, 3]);
    assert!(out.iter().all(|&v| (v - 0.5).abs() < 1e-6));
}

#[test]
fn adaptive_pool_reaches_requested_side() {
    let out = AdaptiveAvgPool2d::new(2).forward(ones(&[1, 3, 5, 5])).unwrap();
    assert_eq!(out.shape(), &[1, 3, 2, 2]);
    assert!(out.iter().all(|&v| (v - 1.0).abs() < 1e-6));
}

#[test]
fn flatten_keeps_batch_axis() {
    let out = Flatten.forward(ones(&[3, 2, 2, 2])).unwrap();
    assert_eq!(out.shape(), &[3, 8]);
}

#[test]
fn half_placement_rounds_parameters() {
    let mut src = WeightSource::seeded(1);
    let mut fc = Linear::new(&mut src, "fc", 2, 1, Init::Ones).unwrap();
    for p in fc.parameters_mut() {
        p.value_mut().fill(1.0 + 1e-4);
    }

    let host = Target::host();
    fc.place(&host).unwrap();
    assert_eq!(fc.parameters()[0].value()[[0, 0]], 1.0 + 1e-4);

    let host_device = crate::device::ComputeDevice::host();
    let half = Target::new(&host_device, Placement::AcceleratorHalf).unwrap();
    fc.place(&half).unwrap();
    assert_eq!(fc.parameters()[0].value()[[0, 0]], 1.0);
}

#[cfg(feature = "transformers")]
#[test]
fn causal_attention_ignores_later_tokens() {
    let mut src = WeightSource::seeded(3);
    let attn = SelfAttention::new(&mut src, "attn", 8, 2, true).unwrap();

    let mut a = ArrayD::<f32>::zeros(IxDyn(&[1, 3, 8]));
    a.iter_mut().enumerate().for_each(|(i, v)| *v = (i % 5) as f32 * 0.1);
    let mut b = a.clone();
    // Change only the last token
    for h in 0..8 {
        b[[0, 2, h]] = 3.0;
    }

    let out_a = attn.forward(a).unwrap();
    let out_b = attn.forward(b).unwrap();
    for t in 0..2 {
        for h in 0..8 {
            assert_abs_diff_eq!(out_a[[0, t, h]], out_b[[0, t, h]], epsilon = 1e-5);
        }
    }
}

#[cfg(feature = "transformers")]
#[test]
fn embeddings_reject_out_of_vocabulary_ids() {
    let mut src = WeightSource::seeded(3);
    let emb = Embeddings::new(&mut src, "emb", 10, 4, 8, true).unwrap();
    let ids = ArrayD::from_shape_vec(IxDyn(&[1, 2]), vec![3.0, 9.0]).unwrap();
    assert_eq!(emb.forward(ids).unwrap().shape(), &[1, 2, 4]);
    let bad = ArrayD::from_shape_vec(IxDyn(&[1, 1]), vec![10.0]).unwrap();
    assert!(emb.forward(bad).is_err());
}

#[cfg(feature = "transformers")]
#[test]
fn embeddings_reject_negative_fractional_and_nan_ids() {
    let mut src = WeightSource::seeded(3);
    let emb = Embeddings::new(&mut src, "emb", 10, 4, 8, true).unwrap();
    for &id in [-1.0, -0.5, 2.5, std::f32::NAN, std::f32::INFINITY].iter() {
        let ids = ArrayD::from_shape_vec(IxDyn(&[1, 1]), vec![id]).unwrap();
        match emb.forward(ids) {
            Err(BenchError::ShapeMismatch { layer, .. }) => assert_eq!(layer, "emb"),
            other => panic!(
                "expected ShapeMismatch for {}, got {:?}",
                id,
                other.map(|a| a.shape().to_vec())
            ),
        }
    }
}
