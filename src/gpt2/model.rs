// GPT-2 Model - Reference GPT-2 forward pass on candle
//
// Weights follow the Hugging Face GPT-2 layout: `wte`, `wpe`, `h.{i}.*`,
// `ln_f`, optionally under a `transformer.` prefix. Projection weights are
// stored as Conv1D, i.e. `[in, out]`. The LM head is tied to `wte`.

use candle_core::{Device, IndexOp, Module, Result, Tensor};
use candle_nn::{embedding, layer_norm, Embedding, LayerNorm, VarBuilder};

use crate::gpt2::config::HParams;

const LAYER_NORM_EPS: f64 = 1e-5;

/// Dense projection with `[in, out]` weights
#[derive(Debug, Clone)]
struct Conv1D {
    weight: Tensor,
    bias: Tensor,
}

impl Conv1D {
    fn load(in_dim: usize, out_dim: usize, vb: VarBuilder) -> Result<Self> {
        let weight = vb.get((in_dim, out_dim), "weight")?;
        let bias = vb.get(out_dim, "bias")?;
        Ok(Self { weight, bias })
    }
}

impl Module for Conv1D {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let (b, t, c) = xs.dims3()?;
        let out_dim = self.weight.dim(1)?;
        xs.reshape((b * t, c))?
            .matmul(&self.weight)?
            .broadcast_add(&self.bias)?
            .reshape((b, t, out_dim))
    }
}

/// Self-attention keeping the keys and values of earlier positions
#[derive(Debug, Clone)]
struct Attention {
    c_attn: Conv1D,
    c_proj: Conv1D,
    n_head: usize,
    head_dim: usize,
    kv_cache: Option<(Tensor, Tensor)>,
}

impl Attention {
    fn load(vb: VarBuilder, hparams: &HParams) -> Result<Self> {
        let n_embd = hparams.n_embd;
        Ok(Self {
            c_attn: Conv1D::load(n_embd, 3 * n_embd, vb.pp("c_attn"))?,
            c_proj: Conv1D::load(n_embd, n_embd, vb.pp("c_proj"))?,
            n_head: hparams.n_head,
            head_dim: hparams.head_dim(),
            kv_cache: None,
        })
    }

    fn forward(&mut self, xs: &Tensor, mask: Option<&Tensor>) -> Result<Tensor> {
        let (b, t, c) = xs.dims3()?;
        let qkv = self.c_attn.forward(xs)?;

        let heads = |index: usize| -> Result<Tensor> {
            qkv.narrow(2, index * c, c)?
                .reshape((b, t, self.n_head, self.head_dim))?
                .transpose(1, 2)?
                .contiguous()
        };
        let q = heads(0)?;
        let k = heads(1)?;
        let v = heads(2)?;

        // (b, n_head, cached + t, head_dim)
        let (k, v) = match &self.kv_cache {
            Some((prev_k, prev_v)) => (
                Tensor::cat(&[prev_k, &k], 2)?,
                Tensor::cat(&[prev_v, &v], 2)?,
            ),
            None => (k, v),
        };
        self.kv_cache = Some((k.clone(), v.clone()));

        let scale = 1.0 / (self.head_dim as f64).sqrt();
        let scores = q.matmul(&k.t()?.contiguous()?)?.affine(scale, 0.0)?;
        let scores = match mask {
            Some(mask) => scores.broadcast_add(mask)?,
            None => scores,
        };
        let weights = candle_nn::ops::softmax_last_dim(&scores)?;

        let ys = weights
            .matmul(&v)?
            .transpose(1, 2)?
            .reshape((b, t, c))?;
        self.c_proj.forward(&ys)
    }

    fn clear_kv_cache(&mut self) {
        self.kv_cache = None;
    }
}

#[derive(Debug, Clone)]
struct Mlp {
    c_fc: Conv1D,
    c_proj: Conv1D,
}

impl Mlp {
    fn load(vb: VarBuilder, hparams: &HParams) -> Result<Self> {
        let n_embd = hparams.n_embd;
        Ok(Self {
            c_fc: Conv1D::load(n_embd, 4 * n_embd, vb.pp("c_fc"))?,
            c_proj: Conv1D::load(4 * n_embd, n_embd, vb.pp("c_proj"))?,
        })
    }
}

impl Module for Mlp {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        // GPT-2 uses the tanh approximation of GELU
        self.c_proj.forward(&self.c_fc.forward(xs)?.gelu()?)
    }
}

#[derive(Debug, Clone)]
struct Block {
    ln_1: LayerNorm,
    attn: Attention,
    ln_2: LayerNorm,
    mlp: Mlp,
}

impl Block {
    fn load(vb: VarBuilder, hparams: &HParams) -> Result<Self> {
        Ok(Self {
            ln_1: layer_norm(hparams.n_embd, LAYER_NORM_EPS, vb.pp("ln_1"))?,
            attn: Attention::load(vb.pp("attn"), hparams)?,
            ln_2: layer_norm(hparams.n_embd, LAYER_NORM_EPS, vb.pp("ln_2"))?,
            mlp: Mlp::load(vb.pp("mlp"), hparams)?,
        })
    }

    fn forward(&mut self, xs: &Tensor, mask: Option<&Tensor>) -> Result<Tensor> {
        let xs = (xs + self.attn.forward(&self.ln_1.forward(xs)?, mask)?)?;
        &xs + self.mlp.forward(&self.ln_2.forward(&xs)?)?
    }
}

/// GPT-2 language model returning next-token logits
#[derive(Debug, Clone)]
pub struct Gpt2Model {
    wte: Embedding,
    wpe: Embedding,
    blocks: Vec<Block>,
    ln_f: LayerNorm,
}

impl Gpt2Model {
    pub fn load(vb: VarBuilder, hparams: &HParams) -> Result<Self> {
        let vb = if vb.contains_tensor("wte.weight") {
            vb
        } else {
            vb.pp("transformer")
        };

        let blocks = (0..hparams.n_layer)
            .map(|i| Block::load(vb.pp(format!("h.{i}")), hparams))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            wte: embedding(hparams.n_vocab, hparams.n_embd, vb.pp("wte"))?,
            wpe: embedding(hparams.n_ctx, hparams.n_embd, vb.pp("wpe"))?,
            blocks,
            ln_f: layer_norm(hparams.n_embd, LAYER_NORM_EPS, vb.pp("ln_f"))?,
        })
    }

    /// Logits for the token following the last input position
    ///
    /// `input_ids` is `(batch, seq)` of `u32` starting at position
    /// `offset`; the result is `(batch, n_vocab)`. Keys and values of
    /// earlier calls are reused, so after the first call only new tokens
    /// need to be passed. The caller keeps `offset + seq` within `n_ctx`
    /// and clears the cache before starting a new context.
    pub fn forward(&mut self, input_ids: &Tensor, offset: usize) -> Result<Tensor> {
        let (_, seq_len) = input_ids.dims2()?;
        let device = input_ids.device().clone();

        let positions = Tensor::arange(offset as u32, (offset + seq_len) as u32, &device)?;
        let mut xs = self
            .wte
            .forward(input_ids)?
            .broadcast_add(&self.wpe.forward(&positions)?)?;

        // A single new token may attend to every cached position
        let mask = if seq_len > 1 {
            Some(causal_mask(seq_len, offset, &device)?)
        } else {
            None
        };
        for block in &mut self.blocks {
            xs = block.forward(&xs, mask.as_ref())?;
        }

        let last = self.ln_f.forward(&xs)?.i((.., seq_len - 1, ..))?;
        last.matmul(&self.wte.embeddings().t()?)
    }

    /// Forget cached keys and values in every layer
    pub fn clear_kv_cache(&mut self) {
        for block in &mut self.blocks {
            block.attn.clear_kv_cache();
        }
    }
}

/// `(seq_len, offset + seq_len)` mask hiding keys after each query position
fn causal_mask(seq_len: usize, offset: usize, device: &Device) -> Result<Tensor> {
    let mask: Vec<f32> = (0..seq_len)
        .flat_map(|i| {
            (0..offset + seq_len).map(move |j| {
                if j > offset + i {
                    f32::NEG_INFINITY
                } else {
                    0.0
                }
            })
        })
        .collect();
    Tensor::from_vec(mask, (seq_len, offset + seq_len), device)
}

/// Randomly initialised weights in the checkpoint layout
#[cfg(test)]
pub(crate) fn random_weights(
    hparams: &HParams,
    device: &Device,
) -> Result<std::collections::HashMap<String, Tensor>> {
    let (e, v, ctx) = (hparams.n_embd, hparams.n_vocab, hparams.n_ctx);
    let mut shapes: Vec<(String, Vec<usize>)> = vec![
        ("wte.weight".into(), vec![v, e]),
        ("wpe.weight".into(), vec![ctx, e]),
        ("ln_f.weight".into(), vec![e]),
        ("ln_f.bias".into(), vec![e]),
    ];
    for i in 0..hparams.n_layer {
        let layer = [
            ("ln_1.weight", vec![e]),
            ("ln_1.bias", vec![e]),
            ("attn.c_attn.weight", vec![e, 3 * e]),
            ("attn.c_attn.bias", vec![3 * e]),
            ("attn.c_proj.weight", vec![e, e]),
            ("attn.c_proj.bias", vec![e]),
            ("ln_2.weight", vec![e]),
            ("ln_2.bias", vec![e]),
            ("mlp.c_fc.weight", vec![e, 4 * e]),
            ("mlp.c_fc.bias", vec![4 * e]),
            ("mlp.c_proj.weight", vec![4 * e, e]),
            ("mlp.c_proj.bias", vec![e]),
        ];
        shapes.extend(
            layer
                .into_iter()
                .map(|(name, shape)| (format!("h.{i}.{name}"), shape)),
        );
    }

    shapes
        .into_iter()
        .map(|(name, shape)| Ok((name, Tensor::randn(0f32, 0.5, shape, device)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarMap;

    fn tiny_hparams() -> HParams {
        HParams {
            n_vocab: 16,
            n_ctx: 8,
            n_embd: 8,
            n_head: 2,
            n_layer: 2,
        }
    }

    fn random_model(hparams: &HParams) -> Gpt2Model {
        let weights = random_weights(hparams, &Device::Cpu).unwrap();
        let vb = VarBuilder::from_tensors(weights, DType::F32, &Device::Cpu);
        Gpt2Model::load(vb, hparams).unwrap()
    }

    fn max_abs_diff(a: &Tensor, b: &Tensor) -> f32 {
        (a - b)
            .unwrap()
            .abs()
            .unwrap()
            .flatten_all()
            .unwrap()
            .max(0)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap()
    }

    #[test]
    fn test_causal_mask() {
        let mask = causal_mask(3, 0, &Device::Cpu).unwrap();
        let rows = mask.to_vec2::<f32>().unwrap();
        assert_eq!(rows[0][0], 0.0);
        assert!(rows[0][1].is_infinite());
        assert_eq!(rows[2], vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_causal_mask_with_offset() {
        let mask = causal_mask(2, 3, &Device::Cpu).unwrap();
        assert_eq!(mask.dims(), &[2, 5]);
        let rows = mask.to_vec2::<f32>().unwrap();
        assert_eq!(rows[0][..4], [0.0, 0.0, 0.0, 0.0]);
        assert!(rows[0][4].is_infinite());
        assert_eq!(rows[1], vec![0.0; 5]);
    }

    #[test]
    fn test_forward_shape() {
        let hparams = tiny_hparams();
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let mut model = Gpt2Model::load(vb, &hparams).unwrap();

        let input = Tensor::new(&[[1u32, 2, 3, 4]], &Device::Cpu).unwrap();
        let logits = model.forward(&input, 0).unwrap();
        assert_eq!(logits.dims(), &[1, hparams.n_vocab]);
    }

    #[test]
    fn test_cached_forward_matches_full_pass() {
        let hparams = tiny_hparams();
        let mut model = random_model(&hparams);
        let ids = [1u32, 5, 3, 7, 2, 9];
        let tensor = |ids: &[u32]| Tensor::new(ids, &Device::Cpu).unwrap().unsqueeze(0).unwrap();

        let full = model.forward(&tensor(&ids), 0).unwrap();
        model.clear_kv_cache();

        // Prefix, then two tokens at once, then one at a time
        model.forward(&tensor(&ids[..3]), 0).unwrap();
        model.forward(&tensor(&ids[3..5]), 3).unwrap();
        let incremental = model.forward(&tensor(&ids[5..]), 5).unwrap();

        assert_eq!(incremental.dims(), &[1, hparams.n_vocab]);
        assert!(max_abs_diff(&full, &incremental) < 1e-4);
    }

    #[test]
    fn test_clear_kv_cache_restarts_context() {
        let hparams = tiny_hparams();
        let mut model = random_model(&hparams);
        let input = Tensor::new(&[[4u32, 2]], &Device::Cpu).unwrap();

        let first = model.forward(&input, 0).unwrap();
        model.clear_kv_cache();
        let second = model.forward(&input, 0).unwrap();
        assert!(max_abs_diff(&first, &second) < 1e-6);
    }
}
