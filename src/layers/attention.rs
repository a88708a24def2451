use super::*;
use crate::math::softmax_last_axis;
use crate::network::{Init, WeightSource};
use ndarray::{s, Array3, Ix2, Ix3};

/// Multi-head scaled dot-product self-attention with a fused query/key/value projection.
pub struct SelfAttention {
    name: String,
    hidden: usize,
    heads: usize,
    causal: bool,
    qkv: Linear,
    out: Linear,
}

impl SelfAttention {
    pub fn new(
        src: &mut WeightSource,
        name: &str,
        hidden: usize,
        heads: usize,
        causal: bool,
    ) -> Result<SelfAttention> {
        if heads == 0 || hidden % heads != 0 {
            return Err(BenchError::shape_mismatch(
                name,
                format!("hidden size divisible by {} heads", heads),
                hidden,
            ));
        }
        debug!(
            "Create attention {} with hidden: {}, heads: {}, causal: {}.",
            name, hidden, heads, causal
        );
        let init = Init::Normal { std: 0.02 };
        Ok(SelfAttention {
            name: name.to_owned(),
            hidden,
            heads,
            causal,
            qkv: Linear::new(src, &format!("{}.qkv", name), hidden, 3 * hidden, init)?,
            out: Linear::new(src, &format!("{}.out", name), hidden, hidden, init)?,
        })
    }
}

impl Layer for SelfAttention {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, input: Activation) -> Result<Activation> {
        let shape = input.shape().to_vec();
        let qkv = self
            .qkv
            .forward(input)?
            .into_dimensionality::<Ix3>()
            .map_err(|_| {
                BenchError::shape_mismatch(&self.name, "[batch, sequence, hidden]", shape)
            })?;
        let (batch, seq, _) = qkv.dim();
        let head_dim = self.hidden / self.heads;
        let scale = 1.0 / (head_dim as f32).sqrt();

        let mut context = Array3::<f32>::zeros((batch, seq, self.hidden));
        for b in 0..batch {
            for h in 0..self.heads {
                let q_cols = h * head_dim..(h + 1) * head_dim;
                let k_cols = self.hidden + q_cols.start..self.hidden + q_cols.end;
                let v_cols = 2 * self.hidden + q_cols.start..2 * self.hidden + q_cols.end;

                let q = qkv.slice(s![b, .., q_cols.clone()]);
                let k = qkv.slice(s![b, .., k_cols]);
                let v = qkv.slice(s![b, .., v_cols]);

                let mut scores = (q.dot(&k.t()) * scale).into_dyn();
                if self.causal {
                    let mut square = scores.view_mut().into_dimensionality::<Ix2>()?;
                    for ((i, j), x) in square.indexed_iter_mut() {
                        if j > i {
                            *x = std::f32::NEG_INFINITY;
                        }
                    }
                }
                softmax_last_axis(&mut scores);
                let weights = scores.into_dimensionality::<Ix2>()?;
                context
                    .slice_mut(s![b, .., q_cols])
                    .assign(&weights.dot(&v));
            }
        }
        self.out.forward(context.into_dyn())
    }

    fn parameters(&self) -> Vec<&Param> {
        let mut params = self.qkv.parameters();
        params.extend(self.out.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Param> {
        let mut params = self.qkv.parameters_mut();
        params.extend(self.out.parameters_mut());
        params
    }

    fn place(&mut self, target: &Target) -> Result<()> {
        self.qkv.place(target)?;
        self.out.place(target)
    }
}
