use crate::geometry::Window;
use ndarray::{s, Array2, Array4, ArrayView1, ArrayView2, ArrayView3, ArrayView4, Axis, ShapeError};

fn invalid_window() -> ShapeError {
    ShapeError::from_kind(ndarray::ErrorKind::IncompatibleShape)
}

/// Unrolls the receptive fields of a (channels, height, width) image into the columns of a
/// (channels * window area) x (out_h * out_w) matrix. Padding is zero.
pub fn im2col(input: ArrayView3<f32>, window: &Window, out_h: usize, out_w: usize) -> Array2<f32> {
    let (channels, in_h, in_w) = input.dim();
    let (kh, kw) = (window.height(), window.width());
    let (pad_h, pad_w) = window.padding();
    let stride = window.stride();

    let mut cols = Array2::<f32>::zeros((channels * kh * kw, out_h * out_w));
    for ch in 0..channels {
        for ky in 0..kh {
            for kx in 0..kw {
                let mut row = cols.row_mut((ch * kh + ky) * kw + kx);
                for oy in 0..out_h {
                    let iy = (oy * stride + ky) as isize - pad_h as isize;
                    if iy < 0 || iy >= in_h as isize {
                        continue;
                    }
                    for ox in 0..out_w {
                        let ix = (ox * stride + kx) as isize - pad_w as isize;
                        if ix < 0 || ix >= in_w as isize {
                            continue;
                        }
                        row[oy * out_w + ox] = input[[ch, iy as usize, ix as usize]];
                    }
                }
            }
        }
    }
    cols
}

/// Grouped 2D cross-correlation of an NCHW batch.
///
/// `weights` is the filter bank flattened to (out_channels, in_channels / groups * window area),
/// i.e. the OIHW layout with the last three axes merged.
pub fn conv2d(
    input: ArrayView4<f32>,
    weights: ArrayView2<f32>,
    bias: Option<ArrayView1<f32>>,
    window: &Window,
    groups: usize,
) -> Result<Array4<f32>, ShapeError> {
    let (n, in_c, in_h, in_w) = input.dim();
    let out_c = weights.nrows();
    if groups == 0 || in_c % groups != 0 || out_c % groups != 0 {
        return Err(invalid_window());
    }
    let (in_per_group, out_per_group) = (in_c / groups, out_c / groups);
    if weights.ncols() != in_per_group * window.area() {
        return Err(ShapeError::from_kind(ndarray::ErrorKind::IncompatibleShape));
    }
    let (out_h, out_w) = window.output_hw(in_h, in_w).ok_or_else(invalid_window)?;

    if in_per_group == 1 && out_per_group == 1 {
        return Ok(depthwise(input, weights, bias, window, out_h, out_w));
    }

    let mut out = Array4::<f32>::zeros((n, out_c, out_h, out_w));
    for b in 0..n {
        for g in 0..groups {
            let in_range = g * in_per_group..(g + 1) * in_per_group;
            let out_range = g * out_per_group..(g + 1) * out_per_group;

            let cols = im2col(input.slice(s![b, in_range, .., ..]), window, out_h, out_w);
            let mut res = weights.slice(s![out_range.clone(), ..]).dot(&cols);
            if let Some(bias) = bias {
                for (i, mut row) in res.outer_iter_mut().enumerate() {
                    let bv = bias[out_range.start + i];
                    row.mapv_inplace(|x| x + bv);
                }
            }
            let res = res.into_shape((out_per_group, out_h, out_w))?;
            out.slice_mut(s![b, out_range, .., ..]).assign(&res);
        }
    }
    Ok(out)
}

/// One filter per channel; skips the im2col round trip.
fn depthwise(
    input: ArrayView4<f32>,
    weights: ArrayView2<f32>,
    bias: Option<ArrayView1<f32>>,
    window: &Window,
    out_h: usize,
    out_w: usize,
) -> Array4<f32> {
    let (n, channels, in_h, in_w) = input.dim();
    let (kh, kw) = (window.height(), window.width());
    let (pad_h, pad_w) = window.padding();
    let stride = window.stride();

    let mut out = Array4::<f32>::zeros((n, channels, out_h, out_w));
    for b in 0..n {
        for c in 0..channels {
            let filter = weights.row(c);
            let plane = input.slice(s![b, c, .., ..]);
            let init = bias.map(|bias| bias[c]).unwrap_or(0.0);
            let mut out_plane = out.slice_mut(s![b, c, .., ..]);
            for oy in 0..out_h {
                for ox in 0..out_w {
                    let mut acc = init;
                    for ky in 0..kh {
                        let iy = (oy * stride + ky) as isize - pad_h as isize;
                        if iy < 0 || iy >= in_h as isize {
                            continue;
                        }
                        for kx in 0..kw {
                            let ix = (ox * stride + kx) as isize - pad_w as isize;
                            if ix < 0 || ix >= in_w as isize {
                                continue;
                            }
                            acc += plane[[iy as usize, ix as usize]] * filter[ky * kw + kx];
                        }
                    }
                    out_plane[[oy, ox]] = acc;
                }
            }
        }
    }
    out
}

/// Max-pooling; padded positions never win.
pub fn max_pool2d(input: ArrayView4<f32>, window: &Window) -> Result<Array4<f32>, ShapeError> {
    pool2d(input, window, std::f32::NEG_INFINITY, f32::max, |acc, _| acc)
}

/// Average-pooling; padded positions count as zeros.
pub fn avg_pool2d(input: ArrayView4<f32>, window: &Window) -> Result<Array4<f32>, ShapeError> {
    let area = window.area() as f32;
    pool2d(input, window, 0.0, |acc, x| acc + x, |acc, _| acc / area)
}

fn pool2d<F, G>(
    input: ArrayView4<f32>,
    window: &Window,
    init: f32,
    fold: F,
    finish: G,
) -> Result<Array4<f32>, ShapeError>
where
    F: Fn(f32, f32) -> f32,
    G: Fn(f32, usize) -> f32,
{
    let (n, channels, in_h, in_w) = input.dim();
    let (out_h, out_w) = window.output_hw(in_h, in_w).ok_or_else(invalid_window)?;
    let (kh, kw) = (window.height(), window.width());
    let (pad_h, pad_w) = window.padding();
    let stride = window.stride();

    let mut out = Array4::<f32>::zeros((n, channels, out_h, out_w));
    for ((b, c, oy, ox), o) in out.indexed_iter_mut() {
        let mut acc = init;
        let mut count = 0;
        for ky in 0..kh {
            let iy = (oy * stride + ky) as isize - pad_h as isize;
            if iy < 0 || iy >= in_h as isize {
                continue;
            }
            for kx in 0..kw {
                let ix = (ox * stride + kx) as isize - pad_w as isize;
                if ix < 0 || ix >= in_w as isize {
                    continue;
                }
                acc = fold(acc, input[[b, c, iy as usize, ix as usize]]);
                count += 1;
            }
        }
        *o = finish(acc, count);
    }
    Ok(out)
}

/// Averages every feature map into a single value: (n, c, h, w) -> (n, c).
pub fn global_avg_pool(input: ArrayView4<f32>) -> Array2<f32> {
    let (_, _, h, w) = input.dim();
    let area = (h * w).max(1) as f32;
    input.sum_axis(Axis(3)).sum_axis(Axis(2)) / area
}
