use super::*;
use crate::network::{Init, WeightSource};
use ndarray::{s, Array3, Ix2, Ix3};

/// Token + position (+ segment) embeddings: (batch, seq) ids -> (batch, seq, hidden)
pub struct Embeddings {
    name: String,
    vocab: usize,
    hidden: usize,
    max_positions: usize,
    word: Param,
    position: Param,
    token_type: Option<Param>,
}

impl Embeddings {
    pub fn new(
        src: &mut WeightSource,
        name: &str,
        vocab: usize,
        hidden: usize,
        max_positions: usize,
        with_token_type: bool,
    ) -> Result<Embeddings> {
        debug!(
            "Create embeddings {} with vocabulary: {}, hidden: {}, positions: {}.",
            name, vocab, hidden, max_positions
        );
        let init = Init::Normal { std: 0.02 };
        let token_type = if with_token_type {
            Some(src.param(&format!("{}.token_type", name), &[2, hidden], init)?)
        } else {
            None
        };
        Ok(Embeddings {
            name: name.to_owned(),
            vocab,
            hidden,
            max_positions,
            word: src.param(&format!("{}.word", name), &[vocab, hidden], init)?,
            position: src.param(
                &format!("{}.position", name),
                &[max_positions, hidden],
                init,
            )?,
            token_type,
        })
    }
}

impl Layer for Embeddings {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, input: Activation) -> Result<Activation> {
        let shape = input.shape().to_vec();
        let ids = input
            .into_dimensionality::<Ix2>()
            .map_err(|_| BenchError::shape_mismatch(&self.name, "[batch, sequence]", &shape))?;
        let (batch, seq) = ids.dim();
        if seq > self.max_positions {
            return Err(BenchError::shape_mismatch(
                &self.name,
                format!("at most {} positions", self.max_positions),
                shape,
            ));
        }
        let word = self.word.value().view().into_dimensionality::<Ix2>()?;
        let position = self.position.value().view().into_dimensionality::<Ix2>()?;

        let mut out = Array3::<f32>::zeros((batch, seq, self.hidden));
        for ((b, t), &raw) in ids.indexed_iter() {
            // NaN fails every comparison
            if !(raw >= 0.0 && raw.fract() == 0.0 && raw < self.vocab as f32) {
                return Err(BenchError::shape_mismatch(
                    &self.name,
                    format!("integral token ids in 0..{}", self.vocab),
                    raw,
                ));
            }
            let id = raw as usize;
            let mut row = out.slice_mut(s![b, t, ..]);
            row.assign(&word.row(id));
            row += &position.row(t);
        }
        if let Some(ref token_type) = self.token_type {
            // Single-segment input: every token has type 0
            let segment = token_type.value().view().into_dimensionality::<Ix2>()?;
            out += &segment.row(0);
        }
        Ok(out.into_dyn())
    }

    fn parameters(&self) -> Vec<&Param> {
        let mut params = vec![&self.word, &self.position];
        params.extend(self.token_type.as_ref());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Param> {
        let mut params = vec![&mut self.word, &mut self.position];
        params.extend(self.token_type.as_mut());
        params
    }
}

/// Selects the first position of every sequence: (batch, seq, hidden) -> (batch, hidden)
pub struct FirstToken;

impl Layer for FirstToken {
    fn name(&self) -> &str {
        "first_token"
    }
    fn forward(&self, input: Activation) -> Result<Activation> {
        let shape = input.shape().to_vec();
        let x = input
            .into_dimensionality::<Ix3>()
            .ok()
            .filter(|x| x.dim().1 > 0)
            .ok_or_else(|| {
                BenchError::shape_mismatch(self.name(), "[batch, sequence, hidden]", shape)
            })?;
        Ok(x.slice(s![.., 0, ..]).to_owned().into_dyn())
    }
}
