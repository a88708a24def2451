//! Sequence models: a bidirectional encoder (BERT-base) and a causal decoder (GPT-2 small).
use super::*;
use crate::layers::*;

/// Sizes of a transformer stack before scaling.
#[derive(Clone, Copy, Debug)]
pub struct TransformerConfig {
    pub vocab: usize,
    pub max_positions: usize,
    pub hidden: usize,
    pub layers: usize,
    pub heads: usize,
    pub ln_eps: f32,
    pub dropout: f32,
}

pub const BERT_BASE: TransformerConfig = TransformerConfig {
    vocab: 30522,
    max_positions: 512,
    hidden: 768,
    layers: 12,
    heads: 12,
    ln_eps: 1e-12,
    dropout: 0.1,
};

pub const GPT2_SMALL: TransformerConfig = TransformerConfig {
    vocab: 50257,
    max_positions: 1024,
    hidden: 768,
    layers: 12,
    heads: 12,
    ln_eps: 1e-5,
    dropout: 0.1,
};

impl TransformerConfig {
    /// Hidden size after scaling, kept a multiple of the head count.
    pub fn scaled_hidden(&self, scale: Scale) -> usize {
        let per_head = (scale.ch(self.hidden) / self.heads).max(1);
        per_head * self.heads
    }
}

fn feed_forward(
    src: &mut WeightSource,
    name: &str,
    hidden: usize,
    dropout: f32,
) -> Result<Sequential> {
    let init = Init::Normal { std: 0.02 };
    Ok(Sequential::new(name)
        .with(Linear::new(src, &format!("{}.fc_in", name), hidden, 4 * hidden, init)?)
        .with(Activate::new(Act::Gelu))
        .with(Linear::new(src, &format!("{}.fc_out", name), 4 * hidden, hidden, init)?)
        .with(Dropout::new(&format!("{}.dropout", name), dropout)))
}

/// BERT encoder with post-layer-norm blocks; outputs the pooled first-token representation.
pub fn bert(src: &mut WeightSource, scale: Scale) -> Result<Network> {
    let cfg = BERT_BASE;
    let hidden = cfg.scaled_hidden(scale);
    let mut net = Sequential::new("bert")
        .with(Embeddings::new(
            src,
            "embeddings",
            cfg.vocab,
            hidden,
            cfg.max_positions,
            true,
        )?)
        .with(LayerNorm::new(src, "embeddings.norm", hidden, cfg.ln_eps)?)
        .with(Dropout::new("embeddings.dropout", cfg.dropout));

    for i in 0..cfg.layers {
        let name = format!("encoder.{}", i);
        let n = |part: &str| format!("{}.{}", name, part);
        let attention = Sequential::new(n("attention"))
            .with(SelfAttention::new(src, &n("attention"), hidden, cfg.heads, false)?)
            .with(Dropout::new(&n("attention.dropout"), cfg.dropout));
        net.push(
            Residual::new(&n("attention"), attention)
                .with_post(LayerNorm::new(src, &n("attention.norm"), hidden, cfg.ln_eps)?),
        );
        let ffn = feed_forward(src, &format!("{}.ffn", name), hidden, cfg.dropout)?;
        net.push(
            Residual::new(&format!("{}.ffn", name), ffn)
                .with_post(LayerNorm::new(src, &format!("{}.ffn.norm", name), hidden, cfg.ln_eps)?),
        );
    }

    net.push(FirstToken);
    net.push(Linear::new(src, "pooler", hidden, hidden, Init::Normal { std: 0.02 })?);
    net.push(Activate::new(Act::Tanh));
    Ok(Network::new("bert", net))
}

/// GPT-2 decoder with pre-layer-norm blocks; outputs the final hidden states.
pub fn gpt2(src: &mut WeightSource, scale: Scale) -> Result<Network> {
    let cfg = GPT2_SMALL;
    let hidden = cfg.scaled_hidden(scale);
    let mut net = Sequential::new("gpt2")
        .with(Embeddings::new(src, "wte", cfg.vocab, hidden, cfg.max_positions, false)?)
        .with(Dropout::new("drop", cfg.dropout));

    for i in 0..cfg.layers {
        let name = format!("h.{}", i);
        let attention = Sequential::new(format!("{}.attn", name))
            .with(LayerNorm::new(src, &format!("{}.ln_1", name), hidden, cfg.ln_eps)?)
            .with(SelfAttention::new(src, &format!("{}.attn", name), hidden, cfg.heads, true)?)
            .with(Dropout::new(&format!("{}.attn.dropout", name), cfg.dropout));
        net.push(Residual::new(&format!("{}.attn", name), attention));

        let mlp = Sequential::new(format!("{}.mlp", name))
            .with(LayerNorm::new(src, &format!("{}.ln_2", name), hidden, cfg.ln_eps)?)
            .with(feed_forward(src, &format!("{}.mlp", name), hidden, cfg.dropout)?);
        net.push(Residual::new(&format!("{}.mlp", name), mlp));
    }

    net.push(LayerNorm::new(src, "ln_f", hidden, cfg.ln_eps)?);
    Ok(Network::new("gpt2", net))
}
