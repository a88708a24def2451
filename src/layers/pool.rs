use super::*;
use crate::geometry::Window;
use crate::math::{avg_pool2d, global_avg_pool, max_pool2d};
use ndarray::{s, Axis};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolKind {
    Max,
    Avg,
}

pub struct Pool2d {
    name: String,
    kind: PoolKind,
    window: Window,
}

impl Pool2d {
    pub fn new(kind: PoolKind, window: Window) -> Pool2d {
        debug!(
            "Create {:?}-pool with window: {}x{}/{}.",
            kind,
            window.height(),
            window.width(),
            window.stride()
        );
        let name = match kind {
            PoolKind::Max => "max_pool",
            PoolKind::Avg => "avg_pool",
        };
        Pool2d {
            name: name.to_owned(),
            kind,
            window,
        }
    }
    pub fn max(window: Window) -> Pool2d {
        Pool2d::new(PoolKind::Max, window)
    }
    pub fn avg(window: Window) -> Pool2d {
        Pool2d::new(PoolKind::Avg, window)
    }
}

impl Layer for Pool2d {
    fn name(&self) -> &str {
        &self.name
    }
    fn forward(&self, input: Activation) -> Result<Activation> {
        let x = to_nchw(&self.name, input)?;
        let out = match self.kind {
            PoolKind::Max => max_pool2d(x.view(), &self.window)?,
            PoolKind::Avg => avg_pool2d(x.view(), &self.window)?,
        };
        Ok(out.into_dyn())
    }
}

/// Averages every feature map to a single value: (n, c, h, w) -> (n, c)
pub struct GlobalAvgPool;

impl Layer for GlobalAvgPool {
    fn name(&self) -> &str {
        "global_avg_pool"
    }
    fn forward(&self, input: Activation) -> Result<Activation> {
        let x = to_nchw(self.name(), input)?;
        Ok(global_avg_pool(x.view()).into_dyn())
    }
}

/// Average-pools to a fixed output side regardless of the input side.
pub struct AdaptiveAvgPool2d {
    out_side: usize,
}

impl AdaptiveAvgPool2d {
    pub fn new(out_side: usize) -> AdaptiveAvgPool2d {
        AdaptiveAvgPool2d { out_side }
    }
}

fn bin(i: usize, in_len: usize, out_len: usize) -> (usize, usize) {
    let start = i * in_len / out_len;
    let end = ((i + 1) * in_len + out_len - 1) / out_len;
    (start, end.max(start + 1))
}

impl Layer for AdaptiveAvgPool2d {
    fn name(&self) -> &str {
        "adaptive_avg_pool"
    }
    fn forward(&self, input: Activation) -> Result<Activation> {
        let x = to_nchw(self.name(), input)?;
        let (n, c, in_h, in_w) = x.dim();
        let side = self.out_side;
        if in_h == side && in_w == side {
            return Ok(x.into_dyn());
        }
        if in_h == 0 || in_w == 0 {
            return Err(BenchError::shape_mismatch(self.name(), "non-empty maps", x.shape()));
        }

        let mut out = ndarray::Array4::<f32>::zeros((n, c, side, side));
        for oy in 0..side {
            let (y0, y1) = bin(oy, in_h, side);
            for ox in 0..side {
                let (x0, x1) = bin(ox, in_w, side);
                let area = ((y1 - y0) * (x1 - x0)) as f32;
                let cell = x
                    .slice(s![.., .., y0..y1, x0..x1])
                    .sum_axis(Axis(3))
                    .sum_axis(Axis(2))
                    / area;
                out.slice_mut(s![.., .., oy, ox]).assign(&cell);
            }
        }
        Ok(out.into_dyn())
    }
}

/// Collapses every axis after the batch axis.
pub struct Flatten;

impl Layer for Flatten {
    fn name(&self) -> &str {
        "flatten"
    }
    fn forward(&self, input: Activation) -> Result<Activation> {
        let batch = input.shape().first().cloned().unwrap_or(0);
        let rest = if batch == 0 { 0 } else { input.len() / batch };
        let out = standard_layout(input).into_shape((batch, rest))?;
        Ok(out.into_dyn())
    }
}
