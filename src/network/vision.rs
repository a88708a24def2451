//! Image-classification architectures. Layer layouts and parameter names follow the common
//! reference definitions; every head has `NUM_CLASSES` outputs.
use super::*;
use crate::geometry::{ImageGeometry, Square, Window};
use crate::layers::*;
use crate::IMAGE_INPUT;

pub const NUM_CLASSES: usize = 1000;

const BN_EPS: f32 = 1e-5;
const BN_EPS_SMALL_BATCH: f32 = 1e-3;

/// Convolution without bias, frozen batch-norm and an optional activation.
fn conv_bn(
    src: &mut WeightSource,
    name: &str,
    channels: (usize, usize),
    window: Window,
    groups: usize,
    act: Option<Act>,
    eps: f32,
) -> Result<Sequential> {
    let (cin, cout) = channels;
    let mut seq = Sequential::new(name)
        .with(Conv2d::new(
            src,
            &format!("{}.conv", name),
            cin,
            cout,
            window,
            groups,
            false,
        )?)
        .with(BatchNorm2d::new(src, &format!("{}.bn", name), cout, eps)?);
    if let Some(act) = act {
        seq.push(Activate::new(act));
    }
    Ok(seq)
}

fn pointwise(stride: usize) -> Window {
    Window::new(1, stride, 0)
}

fn classifier(
    src: &mut WeightSource,
    seq: &mut Sequential,
    features: usize,
    dropout: f32,
) -> Result<()> {
    seq.push(GlobalAvgPool);
    seq.push(Dropout::new("classifier.dropout", dropout));
    seq.push(Linear::new(
        src,
        "classifier.fc",
        features,
        NUM_CLASSES,
        Init::Normal { std: 0.01 },
    )?);
    Ok(())
}

fn log_geometry(network: &str, stage: &str, geometry: &ImageGeometry) {
    trace!(
        "{}: {} produces {}x{}x{}.",
        network,
        stage,
        geometry.side(),
        geometry.side(),
        geometry.channels()
    );
}

/// MobileNetV2 with inverted residual blocks and ReLU6.
pub fn mobilenet_v2(src: &mut WeightSource, scale: Scale) -> Result<Network> {
    // (expansion, output channels, repeats, first stride)
    const SETTINGS: [(usize, usize, usize, usize); 7] = [
        (1, 16, 1, 1),
        (6, 24, 2, 2),
        (6, 32, 3, 2),
        (6, 64, 4, 2),
        (6, 96, 3, 1),
        (6, 160, 3, 2),
        (6, 320, 1, 1),
    ];
    let mut net = Sequential::new("mobilenet_v2");
    let mut geometry = IMAGE_INPUT;

    let mut cin = scale.ch(32);
    net.push(conv_bn(
        src,
        "features.0",
        (geometry.channels(), cin),
        Window::same(3, 2),
        1,
        Some(Act::Relu6),
        BN_EPS,
    )?);
    geometry = geometry.through(&Window::same(3, 2), cin);

    let mut index = 1;
    for &(t, c, n, s) in SETTINGS.iter() {
        let cout = scale.ch(c);
        for i in 0..n {
            let stride = if i == 0 { s } else { 1 };
            let name = format!("features.{}", index);
            let hidden = cin * t;

            let mut body = Sequential::new(format!("{}.body", name));
            if t != 1 {
                body.push(conv_bn(
                    src,
                    &format!("{}.expand", name),
                    (cin, hidden),
                    pointwise(1),
                    1,
                    Some(Act::Relu6),
                    BN_EPS,
                )?);
            }
            body.push(conv_bn(
                src,
                &format!("{}.dw", name),
                (hidden, hidden),
                Window::same(3, stride),
                hidden,
                Some(Act::Relu6),
                BN_EPS,
            )?);
            body.push(conv_bn(
                src,
                &format!("{}.project", name),
                (hidden, cout),
                pointwise(1),
                1,
                None,
                BN_EPS,
            )?);

            if stride == 1 && cin == cout {
                net.push(Residual::new(&name, body));
            } else {
                net.push(body);
            }
            geometry = geometry.through(&Window::same(3, stride), cout);
            log_geometry("mobilenet_v2", &name, &geometry);
            cin = cout;
            index += 1;
        }
    }

    let last = scale.ch(1280);
    net.push(conv_bn(
        src,
        &format!("features.{}", index),
        (cin, last),
        pointwise(1),
        1,
        Some(Act::Relu6),
        BN_EPS,
    )?);
    classifier(src, &mut net, last, 0.2)?;
    Ok(Network::new("mobilenet_v2", net))
}

/// ResNet-50: bottleneck blocks in four stages of 3, 4, 6 and 3.
pub fn resnet50(src: &mut WeightSource, scale: Scale) -> Result<Network> {
    const EXPANSION: usize = 4;
    const STAGES: [(usize, usize, usize); 4] = [(64, 3, 1), (128, 4, 2), (256, 6, 2), (512, 3, 2)];

    let mut net = Sequential::new("resnet50");
    let mut cin = scale.ch(64);
    net.push(conv_bn(
        src,
        "stem",
        (IMAGE_INPUT.channels(), cin),
        Window::new(7, 2, 3),
        1,
        Some(Act::Relu),
        BN_EPS,
    )?);
    net.push(Pool2d::max(Window::new(3, 2, 1)));

    for (stage, &(planes, blocks, first_stride)) in STAGES.iter().enumerate() {
        let width = scale.ch(planes);
        let cout = scale.ch(planes * EXPANSION);
        for block in 0..blocks {
            let stride = if block == 0 { first_stride } else { 1 };
            let name = format!("layer{}.{}", stage + 1, block);

            let n = |layer: &str| format!("{}.{}", name, layer);
            let relu = Some(Act::Relu);
            let body = Sequential::new(n("body"))
                .with(conv_bn(
                    src,
                    &n("conv1"),
                    (cin, width),
                    pointwise(1),
                    1,
                    relu,
                    BN_EPS,
                )?)
                .with(conv_bn(
                    src,
                    &n("conv2"),
                    (width, width),
                    Window::same(3, stride),
                    1,
                    relu,
                    BN_EPS,
                )?)
                .with(conv_bn(
                    src,
                    &n("conv3"),
                    (width, cout),
                    pointwise(1),
                    1,
                    None,
                    BN_EPS,
                )?);

            let mut residual = Residual::new(&name, body).with_post(Activate::new(Act::Relu));
            if stride != 1 || cin != cout {
                let downsample = conv_bn(
                    src,
                    &n("downsample"),
                    (cin, cout),
                    pointwise(stride),
                    1,
                    None,
                    BN_EPS,
                )?;
                residual = residual.with_shortcut(downsample);
            }
            net.push(residual);
            cin = cout;
        }
    }

    net.push(GlobalAvgPool);
    net.push(Linear::new(src, "fc", cin, NUM_CLASSES, Init::Normal { std: 0.01 })?);
    Ok(Network::new("resnet50", net))
}

/// VGG-16 (configuration D) without batch-norm.
pub fn vgg16(src: &mut WeightSource, scale: Scale) -> Result<Network> {
    // 0 marks a max-pooling layer
    const CONFIG: [usize; 18] = [
        64, 64, 0, 128, 128, 0, 256, 256, 256, 0, 512, 512, 512, 0, 512, 512, 512, 0,
    ];
    const POOLED_SIDE: usize = 7;

    let mut net = Sequential::new("vgg16");
    let mut cin = IMAGE_INPUT.channels();
    for (i, &c) in CONFIG.iter().enumerate() {
        if c == 0 {
            net.push(Pool2d::max(Window::new(2, 2, 0)));
            continue;
        }
        let cout = scale.ch(c);
        let window = Window::same(3, 1);
        net.push(Conv2d::new(src, &format!("features.{}", i), cin, cout, window, 1, true)?);
        net.push(Activate::new(Act::Relu));
        cin = cout;
    }

    let hidden = scale.ch(4096);
    let init = Init::Normal { std: 0.01 };
    net.push(AdaptiveAvgPool2d::new(POOLED_SIDE));
    net.push(Flatten);
    net.push(Linear::new(
        src,
        "classifier.0",
        cin * POOLED_SIDE * POOLED_SIDE,
        hidden,
        init,
    )?);
    net.push(Activate::new(Act::Relu));
    net.push(Dropout::new("classifier.2", 0.5));
    net.push(Linear::new(src, "classifier.3", hidden, hidden, init)?);
    net.push(Activate::new(Act::Relu));
    net.push(Dropout::new("classifier.5", 0.5));
    net.push(Linear::new(src, "classifier.6", hidden, NUM_CLASSES, init)?);
    Ok(Network::new("vgg16", net))
}

/// EfficientNet-B0: MBConv blocks with squeeze-and-excitation and SiLU.
pub fn efficientnet_b0(src: &mut WeightSource, scale: Scale) -> Result<Network> {
    // (expansion, kernel, first stride, output channels, repeats)
    const STAGES: [(usize, usize, usize, usize, usize); 7] = [
        (1, 3, 1, 16, 1),
        (6, 3, 2, 24, 2),
        (6, 5, 2, 40, 2),
        (6, 3, 2, 80, 3),
        (6, 5, 1, 112, 3),
        (6, 5, 2, 192, 4),
        (6, 3, 1, 320, 1),
    ];
    let mut net = Sequential::new("efficientnet_b0");
    let mut cin = scale.ch(32);
    net.push(conv_bn(
        src,
        "features.0",
        (IMAGE_INPUT.channels(), cin),
        Window::same(3, 2),
        1,
        Some(Act::Silu),
        BN_EPS_SMALL_BATCH,
    )?);

    for (stage, &(expand, kernel, first_stride, c, repeats)) in STAGES.iter().enumerate() {
        let cout = scale.ch(c);
        for i in 0..repeats {
            let stride = if i == 0 { first_stride } else { 1 };
            let name = format!("features.{}.{}", stage + 1, i);
            let expanded = cin * expand;
            let squeezed = (cin / 4).max(1);

            let mut body = Sequential::new(format!("{}.body", name));
            if expand != 1 {
                body.push(conv_bn(
                    src,
                    &format!("{}.expand", name),
                    (cin, expanded),
                    pointwise(1),
                    1,
                    Some(Act::Silu),
                    BN_EPS_SMALL_BATCH,
                )?);
            }
            body.push(conv_bn(
                src,
                &format!("{}.dw", name),
                (expanded, expanded),
                Window::same(kernel, stride),
                expanded,
                Some(Act::Silu),
                BN_EPS_SMALL_BATCH,
            )?);
            let se = format!("{}.se", name);
            body.push(SqueezeExcite::new(src, &se, expanded, squeezed, Act::Silu)?);
            body.push(conv_bn(
                src,
                &format!("{}.project", name),
                (expanded, cout),
                pointwise(1),
                1,
                None,
                BN_EPS_SMALL_BATCH,
            )?);

            if stride == 1 && cin == cout {
                net.push(Residual::new(&name, body));
            } else {
                net.push(body);
            }
            cin = cout;
        }
    }

    let last = scale.ch(1280);
    net.push(conv_bn(
        src,
        "features.8",
        (cin, last),
        pointwise(1),
        1,
        Some(Act::Silu),
        BN_EPS_SMALL_BATCH,
    )?);
    classifier(src, &mut net, last, 0.2)?;
    Ok(Network::new("efficientnet_b0", net))
}

/// Convolution + batch-norm + ReLU as used throughout Inception-v3.
fn basic(
    src: &mut WeightSource,
    name: &str,
    cin: usize,
    cout: usize,
    window: Window,
) -> Result<Sequential> {
    conv_bn(
        src,
        name,
        (cin, cout),
        window,
        1,
        Some(Act::Relu),
        BN_EPS_SMALL_BATCH,
    )
}

/// A branch of the given widths; returns it with its output width.
struct Branch {
    seq: Sequential,
    out: usize,
}

impl Branch {
    fn start(name: &str, cin: usize) -> Branch {
        Branch {
            seq: Sequential::new(name),
            out: cin,
        }
    }
    fn conv(
        mut self,
        src: &mut WeightSource,
        name: &str,
        cout: usize,
        window: Window,
    ) -> Result<Branch> {
        let cin = self.out;
        self.seq.push(basic(src, name, cin, cout, window)?);
        self.out = cout;
        Ok(self)
    }
    fn pool(mut self, pool: Pool2d) -> Branch {
        self.seq.push(pool);
        self
    }
}

fn mixed(name: &str, branches: Vec<Branch>) -> (Concat, usize) {
    let out = branches.iter().map(|b| b.out).sum();
    let concat = Concat::new(name, branches.into_iter().map(|b| b.seq).collect());
    (concat, out)
}

fn inception_a(
    src: &mut WeightSource,
    name: &str,
    cin: usize,
    pool_features: usize,
    s: Scale,
) -> Result<(Concat, usize)> {
    let n = |b: &str| format!("{}.{}", name, b);
    let branches = vec![
        Branch::start(&n("branch1x1"), cin).conv(src, &n("branch1x1"), s.ch(64), pointwise(1))?,
        Branch::start(&n("branch5x5"), cin)
            .conv(src, &n("branch5x5_1"), s.ch(48), pointwise(1))?
            .conv(src, &n("branch5x5_2"), s.ch(64), Window::same(5, 1))?,
        Branch::start(&n("branch3x3dbl"), cin)
            .conv(src, &n("branch3x3dbl_1"), s.ch(64), pointwise(1))?
            .conv(src, &n("branch3x3dbl_2"), s.ch(96), Window::same(3, 1))?
            .conv(src, &n("branch3x3dbl_3"), s.ch(96), Window::same(3, 1))?,
        Branch::start(&n("branch_pool"), cin)
            .pool(Pool2d::avg(Window::new(3, 1, 1)))
            .conv(src, &n("branch_pool"), s.ch(pool_features), pointwise(1))?,
    ];
    Ok(mixed(name, branches))
}

fn inception_b(
    src: &mut WeightSource,
    name: &str,
    cin: usize,
    s: Scale,
) -> Result<(Concat, usize)> {
    let n = |b: &str| format!("{}.{}", name, b);
    let branches = vec![
        Branch::start(&n("branch3x3"), cin).conv(
            src,
            &n("branch3x3"),
            s.ch(384),
            Window::new(3, 2, 0),
        )?,
        Branch::start(&n("branch3x3dbl"), cin)
            .conv(src, &n("branch3x3dbl_1"), s.ch(64), pointwise(1))?
            .conv(src, &n("branch3x3dbl_2"), s.ch(96), Window::same(3, 1))?
            .conv(src, &n("branch3x3dbl_3"), s.ch(96), Window::new(3, 2, 0))?,
        Branch::start(&n("branch_pool"), cin).pool(Pool2d::max(Window::new(3, 2, 0))),
    ];
    Ok(mixed(name, branches))
}

fn inception_c(
    src: &mut WeightSource,
    name: &str,
    cin: usize,
    c7: usize,
    s: Scale,
) -> Result<(Concat, usize)> {
    let n = |b: &str| format!("{}.{}", name, b);
    let c7 = s.ch(c7);
    let branches = vec![
        Branch::start(&n("branch1x1"), cin).conv(src, &n("branch1x1"), s.ch(192), pointwise(1))?,
        Branch::start(&n("branch7x7"), cin)
            .conv(src, &n("branch7x7_1"), c7, pointwise(1))?
            .conv(src, &n("branch7x7_2"), c7, Window::rect(1, 7))?
            .conv(src, &n("branch7x7_3"), s.ch(192), Window::rect(7, 1))?,
        Branch::start(&n("branch7x7dbl"), cin)
            .conv(src, &n("branch7x7dbl_1"), c7, pointwise(1))?
            .conv(src, &n("branch7x7dbl_2"), c7, Window::rect(7, 1))?
            .conv(src, &n("branch7x7dbl_3"), c7, Window::rect(1, 7))?
            .conv(src, &n("branch7x7dbl_4"), c7, Window::rect(7, 1))?
            .conv(src, &n("branch7x7dbl_5"), s.ch(192), Window::rect(1, 7))?,
        Branch::start(&n("branch_pool"), cin)
            .pool(Pool2d::avg(Window::new(3, 1, 1)))
            .conv(src, &n("branch_pool"), s.ch(192), pointwise(1))?,
    ];
    Ok(mixed(name, branches))
}

fn inception_d(
    src: &mut WeightSource,
    name: &str,
    cin: usize,
    s: Scale,
) -> Result<(Concat, usize)> {
    let n = |b: &str| format!("{}.{}", name, b);
    let branches = vec![
        Branch::start(&n("branch3x3"), cin)
            .conv(src, &n("branch3x3_1"), s.ch(192), pointwise(1))?
            .conv(src, &n("branch3x3_2"), s.ch(320), Window::new(3, 2, 0))?,
        Branch::start(&n("branch7x7x3"), cin)
            .conv(src, &n("branch7x7x3_1"), s.ch(192), pointwise(1))?
            .conv(src, &n("branch7x7x3_2"), s.ch(192), Window::rect(1, 7))?
            .conv(src, &n("branch7x7x3_3"), s.ch(192), Window::rect(7, 1))?
            .conv(src, &n("branch7x7x3_4"), s.ch(192), Window::new(3, 2, 0))?,
        Branch::start(&n("branch_pool"), cin).pool(Pool2d::max(Window::new(3, 2, 0))),
    ];
    Ok(mixed(name, branches))
}

/// A 1x3 / 3x1 split on top of `stem`, concatenated.
fn split_3x3(src: &mut WeightSource, name: &str, stem: Branch, s: Scale) -> Result<Branch> {
    let cin = stem.out;
    let (a, b) = (format!("{}a", name), format!("{}b", name));
    let a = Branch::start(&a, cin).conv(src, &a, s.ch(384), Window::rect(1, 3))?;
    let b = Branch::start(&b, cin).conv(src, &b, s.ch(384), Window::rect(3, 1))?;
    let (split, out) = mixed(&format!("{}.split", name), vec![a, b]);
    let mut seq = stem.seq;
    seq.push(split);
    Ok(Branch { seq, out })
}

fn inception_e(
    src: &mut WeightSource,
    name: &str,
    cin: usize,
    s: Scale,
) -> Result<(Concat, usize)> {
    let n = |b: &str| format!("{}.{}", name, b);
    let branch3x3 =
        Branch::start(&n("branch3x3"), cin).conv(src, &n("branch3x3_1"), s.ch(384), pointwise(1))?;
    let branch3x3dbl = Branch::start(&n("branch3x3dbl"), cin)
        .conv(src, &n("branch3x3dbl_1"), s.ch(448), pointwise(1))?
        .conv(src, &n("branch3x3dbl_2"), s.ch(384), Window::same(3, 1))?;
    let branches = vec![
        Branch::start(&n("branch1x1"), cin).conv(src, &n("branch1x1"), s.ch(320), pointwise(1))?,
        split_3x3(src, &n("branch3x3_2"), branch3x3, s)?,
        split_3x3(src, &n("branch3x3dbl_3"), branch3x3dbl, s)?,
        Branch::start(&n("branch_pool"), cin)
            .pool(Pool2d::avg(Window::new(3, 1, 1)))
            .conv(src, &n("branch_pool"), s.ch(192), pointwise(1))?,
    ];
    Ok(mixed(name, branches))
}

fn append(net: &mut Sequential, (block, out): (Concat, usize)) -> usize {
    net.push(block);
    out
}

/// Inception-v3 in inference configuration (no auxiliary head).
pub fn inception_v3(src: &mut WeightSource, scale: Scale) -> Result<Network> {
    let s = scale;
    let mut net = Sequential::new("inception_v3");
    let c = IMAGE_INPUT.channels();

    net.push(basic(src, "Conv2d_1a_3x3", c, s.ch(32), Window::new(3, 2, 0))?);
    net.push(basic(
        src,
        "Conv2d_2a_3x3",
        s.ch(32),
        s.ch(32),
        Window::from_side(3),
    )?);
    net.push(basic(src, "Conv2d_2b_3x3", s.ch(32), s.ch(64), Window::same(3, 1))?);
    net.push(Pool2d::max(Window::new(3, 2, 0)));
    net.push(basic(src, "Conv2d_3b_1x1", s.ch(64), s.ch(80), pointwise(1))?);
    net.push(basic(
        src,
        "Conv2d_4a_3x3",
        s.ch(80),
        s.ch(192),
        Window::from_side(3),
    )?);
    net.push(Pool2d::max(Window::new(3, 2, 0)));

    let mut cin = s.ch(192);
    cin = append(&mut net, inception_a(src, "Mixed_5b", cin, 32, s)?);
    cin = append(&mut net, inception_a(src, "Mixed_5c", cin, 64, s)?);
    cin = append(&mut net, inception_a(src, "Mixed_5d", cin, 64, s)?);
    cin = append(&mut net, inception_b(src, "Mixed_6a", cin, s)?);
    cin = append(&mut net, inception_c(src, "Mixed_6b", cin, 128, s)?);
    cin = append(&mut net, inception_c(src, "Mixed_6c", cin, 160, s)?);
    cin = append(&mut net, inception_c(src, "Mixed_6d", cin, 160, s)?);
    cin = append(&mut net, inception_c(src, "Mixed_6e", cin, 192, s)?);
    cin = append(&mut net, inception_d(src, "Mixed_7a", cin, s)?);
    cin = append(&mut net, inception_e(src, "Mixed_7b", cin, s)?);
    cin = append(&mut net, inception_e(src, "Mixed_7c", cin, s)?);

    classifier(src, &mut net, cin, 0.5)?;
    Ok(Network::new("inception_v3", net))
}
