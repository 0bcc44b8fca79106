//! ModernBERT encoder with a sequence-classification head.
//!
//! ModernBERT is an encoder-only transformer with rotary position
//! embeddings, alternating global and sliding-window attention layers and a
//! GeGLU feed-forward block. Only the classification head is built here; it
//! is what sentiment checkpoints such as
//! `clapAI/modernBERT-base-multilingual-sentiment` ship.

use std::collections::HashMap;
use std::sync::Arc;

use candle_core::{DType, Device, IndexOp, Tensor, D};
use candle_nn::{
    embedding, layer_norm_no_bias, linear, linear_no_bias, ops::softmax, Embedding, LayerNorm,
    Linear, Module, VarBuilder,
};
use serde::Deserialize;
use tokenizers::Tokenizer;

use crate::core::{AgentError, ModelOptions, Result};
use crate::loaders::{ClassifierFilesLoader, TokenizerLoader, WeightsFormat};
use crate::pipelines::sentiment::{RawSentiment, SentimentAnalysisModel};

const NEG_INF: f32 = f32::NEG_INFINITY;
const MIN_VALUE_F64: f64 = f32::MIN as f64;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub intermediate_size: usize,
    pub max_position_embeddings: usize,
    pub layer_norm_eps: f64,
    pub pad_token_id: u32,
    pub global_attn_every_n_layers: usize,
    pub global_rope_theta: f64,
    pub local_attention: usize,
    pub local_rope_theta: f64,
    #[serde(default)]
    pub id2label: HashMap<String, String>,
    #[serde(default)]
    pub classifier_pooling: ClassifierPooling,
}

impl Config {
    pub fn num_labels(&self) -> usize {
        self.id2label.len()
    }

    /// Class name for a logit index, `LABEL_<n>` when the config has none.
    pub fn label_for(&self, index: usize) -> String {
        self.id2label
            .get(&index.to_string())
            .cloned()
            .unwrap_or_else(|| format!("LABEL_{index}"))
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierPooling {
    #[default]
    Cls,
    Mean,
}

#[derive(Debug, Clone)]
struct RotaryEmbedding {
    sin: Tensor,
    cos: Tensor,
}

impl RotaryEmbedding {
    fn new(dtype: DType, config: &Config, rope_theta: f64, device: &Device) -> candle_core::Result<Self> {
        let dim = config.hidden_size / config.num_attention_heads;
        let inv_freq: Vec<f32> = (0..dim)
            .step_by(2)
            .map(|i| (1.0 / rope_theta.powf(i as f64 / dim as f64)) as f32)
            .collect();
        let half_dim = inv_freq.len();
        let inv_freq = Tensor::from_vec(inv_freq, (1, half_dim), device)?.to_dtype(dtype)?;

        let max_seq_len = config.max_position_embeddings;
        let positions = Tensor::arange(0u32, max_seq_len as u32, device)?
            .to_dtype(dtype)?
            .reshape((max_seq_len, 1))?;
        let angles = positions.matmul(&inv_freq)?;

        Ok(Self {
            sin: angles.sin()?,
            cos: angles.cos()?,
        })
    }

    /// Rotate `q` and `k`, shaped `(batch, heads, seq_len, head_dim)`.
    fn apply(&self, q: &Tensor, k: &Tensor) -> candle_core::Result<(Tensor, Tensor)> {
        let seq_len = q.dim(2)?;
        let cos = self.cos.narrow(0, 0, seq_len)?;
        let sin = self.sin.narrow(0, 0, seq_len)?;
        let q = candle_nn::rotary_emb::rope(&q.contiguous()?, &cos, &sin)?;
        let k = candle_nn::rotary_emb::rope(&k.contiguous()?, &cos, &sin)?;
        Ok((q, k))
    }
}

#[derive(Debug, Clone)]
struct Attention {
    qkv: Linear,
    proj: Linear,
    num_heads: usize,
    head_dim: usize,
    rotary: Arc<RotaryEmbedding>,
}

impl Attention {
    fn load(vb: VarBuilder, config: &Config, rotary: Arc<RotaryEmbedding>) -> candle_core::Result<Self> {
        let num_heads = config.num_attention_heads;
        let head_dim = config.hidden_size / num_heads;
        let qkv = linear_no_bias(config.hidden_size, config.hidden_size * 3, vb.pp("Wqkv"))?;
        let proj = linear_no_bias(config.hidden_size, config.hidden_size, vb.pp("Wo"))?;

        Ok(Self {
            qkv,
            proj,
            num_heads,
            head_dim,
            rotary,
        })
    }

    fn forward(&self, xs: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
        let (batch, seq_len, hidden_size) = xs.dims3()?;

        // (3, batch, heads, seq_len, head_dim)
        let qkv = xs
            .apply(&self.qkv)?
            .reshape((batch, seq_len, 3, self.num_heads, self.head_dim))?
            .permute((2, 0, 3, 1, 4))?;

        let (q, k) = self.rotary.apply(&qkv.get(0)?, &qkv.get(1)?)?;
        let v = qkv.get(2)?;

        let q = (q * (self.head_dim as f64).powf(-0.5))?;
        let scores = q
            .matmul(&k.transpose(D::Minus2, D::Minus1)?)?
            .broadcast_add(attention_mask)?;
        let probs = softmax(&scores, D::Minus1)?;

        probs
            .matmul(&v.contiguous()?)?
            .transpose(1, 2)?
            .reshape((batch, seq_len, hidden_size))?
            .apply(&self.proj)
    }
}

/// GeGLU feed-forward block.
#[derive(Debug, Clone)]
struct Mlp {
    wi: Linear,
    wo: Linear,
}

impl Mlp {
    fn load(vb: VarBuilder, config: &Config) -> candle_core::Result<Self> {
        let wi = linear_no_bias(config.hidden_size, config.intermediate_size * 2, vb.pp("Wi"))?;
        let wo = linear_no_bias(config.intermediate_size, config.hidden_size, vb.pp("Wo"))?;
        Ok(Self { wi, wo })
    }
}

impl Module for Mlp {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let xs = xs.apply(&self.wi)?;
        let halves = xs.chunk(2, D::Minus1)?;
        (&halves[0].gelu_erf()? * &halves[1])?.apply(&self.wo)
    }
}

#[derive(Debug, Clone)]
struct EncoderLayer {
    attn: Attention,
    mlp: Mlp,
    // The first layer has no attention norm; embeddings are already normed.
    attn_norm: Option<LayerNorm>,
    mlp_norm: LayerNorm,
    local: bool,
}

impl EncoderLayer {
    fn load(
        vb: VarBuilder,
        config: &Config,
        rotary: Arc<RotaryEmbedding>,
        local: bool,
    ) -> candle_core::Result<Self> {
        let attn = Attention::load(vb.pp("attn"), config, rotary)?;
        let mlp = Mlp::load(vb.pp("mlp"), config)?;
        let attn_norm =
            layer_norm_no_bias(config.hidden_size, config.layer_norm_eps, vb.pp("attn_norm")).ok();
        let mlp_norm =
            layer_norm_no_bias(config.hidden_size, config.layer_norm_eps, vb.pp("mlp_norm"))?;

        Ok(Self {
            attn,
            mlp,
            attn_norm,
            mlp_norm,
            local,
        })
    }

    fn forward(
        &self,
        xs: &Tensor,
        global_mask: &Tensor,
        local_mask: &Tensor,
    ) -> candle_core::Result<Tensor> {
        let normed = match &self.attn_norm {
            Some(norm) => xs.apply(norm)?,
            None => xs.clone(),
        };

        let attn_out = if self.local {
            let mask = global_mask.broadcast_add(local_mask)?;
            self.attn.forward(&normed, &mask)?
        } else {
            self.attn.forward(&normed, global_mask)?
        };
        let xs = (xs + attn_out)?;

        let mlp_out = xs.apply(&self.mlp_norm)?.apply(&self.mlp)?;
        xs + mlp_out
    }
}

#[derive(Debug, Clone)]
struct Encoder {
    embeddings: Embedding,
    embedding_norm: LayerNorm,
    layers: Vec<EncoderLayer>,
    final_norm: LayerNorm,
    local_window: usize,
    device: Device,
    dtype: DType,
}

impl Encoder {
    fn load(vb: VarBuilder, config: &Config) -> candle_core::Result<Self> {
        let embeddings = embedding(
            config.vocab_size,
            config.hidden_size,
            vb.pp("model.embeddings.tok_embeddings"),
        )?;
        let embedding_norm = layer_norm_no_bias(
            config.hidden_size,
            config.layer_norm_eps,
            vb.pp("model.embeddings.norm"),
        )?;

        let global_rotary = Arc::new(RotaryEmbedding::new(
            vb.dtype(),
            config,
            config.global_rope_theta,
            vb.device(),
        )?);
        let local_rotary = Arc::new(RotaryEmbedding::new(
            vb.dtype(),
            config,
            config.local_rope_theta,
            vb.device(),
        )?);

        let layers = (0..config.num_hidden_layers)
            .map(|idx| {
                let local = idx % config.global_attn_every_n_layers != 0;
                let rotary = if local {
                    local_rotary.clone()
                } else {
                    global_rotary.clone()
                };
                EncoderLayer::load(vb.pp(format!("model.layers.{idx}")), config, rotary, local)
            })
            .collect::<candle_core::Result<Vec<_>>>()?;

        let final_norm = layer_norm_no_bias(
            config.hidden_size,
            config.layer_norm_eps,
            vb.pp("model.final_norm"),
        )?;

        Ok(Self {
            embeddings,
            embedding_norm,
            layers,
            final_norm,
            local_window: config.local_attention,
            device: vb.device().clone(),
            dtype: vb.dtype(),
        })
    }

    /// Additive mask hiding padded positions, `(batch, 1, seq, seq)`.
    fn padding_mask(&self, mask: &Tensor) -> candle_core::Result<Tensor> {
        let (batch, seq_len) = mask.dims2()?;
        let expanded = mask
            .unsqueeze(1)?
            .unsqueeze(2)?
            .expand((batch, 1, seq_len, seq_len))?
            .to_dtype(self.dtype)?;
        ((1.0 - expanded)? * MIN_VALUE_F64)?.to_dtype(self.dtype)
    }

    /// Additive mask limiting attention to the sliding window, `(seq, seq)`.
    fn window_mask(&self, seq_len: usize) -> candle_core::Result<Tensor> {
        let mask = sliding_window_mask(self.local_window, seq_len);
        Tensor::from_slice(&mask, (seq_len, seq_len), &self.device)?.to_dtype(self.dtype)
    }

    fn forward(&self, input_ids: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
        let seq_len = input_ids.dim(1)?;
        let global_mask = self.padding_mask(attention_mask)?;
        let local_mask = self.window_mask(seq_len)?;

        let mut xs = input_ids
            .apply(&self.embeddings)?
            .apply(&self.embedding_norm)?;
        for layer in &self.layers {
            xs = layer.forward(&xs, &global_mask, &local_mask)?;
        }
        xs.apply(&self.final_norm)
    }
}

/// Row-major `(seq_len, seq_len)` additive mask for a sliding window of
/// `window` tokens centred on each position.
fn sliding_window_mask(window: usize, seq_len: usize) -> Vec<f32> {
    let half_window = window / 2;
    (0..seq_len)
        .flat_map(|i| {
            (0..seq_len).map(move |j| if i.abs_diff(j) > half_window { NEG_INF } else { 0.0 })
        })
        .collect()
}

#[derive(Debug, Clone)]
struct ClassificationHead {
    dense: Linear,
    norm: LayerNorm,
    classifier: Linear,
    pooling: ClassifierPooling,
}

impl ClassificationHead {
    fn load(vb: VarBuilder, config: &Config) -> candle_core::Result<Self> {
        let dense = linear_no_bias(config.hidden_size, config.hidden_size, vb.pp("head.dense"))?;
        let norm = layer_norm_no_bias(config.hidden_size, config.layer_norm_eps, vb.pp("head.norm"))?;
        let classifier = linear(config.hidden_size, config.num_labels(), vb.pp("classifier"))?;

        Ok(Self {
            dense,
            norm,
            classifier,
            pooling: config.classifier_pooling,
        })
    }

    fn forward(&self, hidden: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
        let pooled = match self.pooling {
            ClassifierPooling::Cls => hidden.i((.., 0, ..))?,
            ClassifierPooling::Mean => {
                let mask = attention_mask.unsqueeze(D::Minus1)?.to_dtype(hidden.dtype())?;
                let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
                let counts = attention_mask.sum_keepdim(1)?.to_dtype(hidden.dtype())?;
                summed.broadcast_div(&counts)?
            }
        };

        pooled
            .apply(&self.dense)?
            .gelu_erf()?
            .apply(&self.norm)?
            .apply(&self.classifier)
    }
}

/// ModernBERT encoder plus classification head.
#[derive(Debug, Clone)]
pub struct ModernBertForSequenceClassification {
    encoder: Arc<Encoder>,
    head: ClassificationHead,
}

impl ModernBertForSequenceClassification {
    pub fn load(vb: VarBuilder, config: &Config) -> candle_core::Result<Self> {
        let encoder = Arc::new(Encoder::load(vb.clone(), config)?);
        let head = ClassificationHead::load(vb, config)?;
        Ok(Self { encoder, head })
    }

    /// Logits shaped `(batch_size, num_labels)` for token ids and an
    /// attention mask shaped `(batch_size, seq_len)`.
    pub fn forward(&self, input_ids: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
        let hidden = self.encoder.forward(input_ids, attention_mask)?;
        self.head.forward(&hidden, attention_mask)
    }

    pub fn num_layers(&self) -> usize {
        self.encoder.layers.len()
    }
}

/*
Pipeline Implementations
*/

/// Published ModernBERT sentiment checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModernBertSize {
    Base,
    Large,
}

impl ModernBertSize {
    pub fn sentiment_repo(&self) -> &'static str {
        match self {
            ModernBertSize::Base => "clapAI/modernBERT-base-multilingual-sentiment",
            ModernBertSize::Large => "clapAI/modernBERT-large-multilingual-sentiment",
        }
    }
}

/// Which hub repository a sentiment classifier is loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierOptions {
    pub model_id: String,
}

impl From<ModernBertSize> for ClassifierOptions {
    fn from(size: ModernBertSize) -> Self {
        Self {
            model_id: size.sentiment_repo().to_string(),
        }
    }
}

impl ModelOptions for ClassifierOptions {
    fn cache_key(&self) -> String {
        format!("modernbert-sentiment:{}", self.model_id)
    }
}

/// Sentiment classifier backed by a ModernBERT checkpoint.
#[derive(Clone)]
pub struct SentimentModernBertModel {
    model: ModernBertForSequenceClassification,
    config: Arc<Config>,
    device: Device,
}

impl SentimentModernBertModel {
    pub fn new(options: ClassifierOptions, device: Device) -> Result<Self> {
        let files = ClassifierFilesLoader::new(&options.model_id).load()?;

        let raw = std::fs::read_to_string(&files.config)?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| {
            AgentError::ModelFormat(format!(
                "failed to parse {}: {e}",
                files.config.display()
            ))
        })?;
        if config.num_labels() == 0 {
            return Err(AgentError::ModelFormat(format!(
                "{} has no id2label entries; not a classification checkpoint",
                options.model_id
            )));
        }

        let dtype = DType::F32;
        let vb = match files.format {
            // SAFETY: the hub cache file is not modified while mapped.
            WeightsFormat::Safetensors => unsafe {
                VarBuilder::from_mmaped_safetensors(&[&files.weights], dtype, &device)?
            },
            WeightsFormat::Pytorch => VarBuilder::from_pth(&files.weights, dtype, &device)?,
        };
        let model = ModernBertForSequenceClassification::load(vb, &config)?;

        tracing::info!(
            model = %options.model_id,
            layers = model.num_layers(),
            labels = config.num_labels(),
            device = ?device.location(),
            "loaded sentiment classifier"
        );

        Ok(Self {
            model,
            config: Arc::new(config),
            device,
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn predict(&self, tokenizer: &Tokenizer, text: &str) -> Result<RawSentiment> {
        let encoding = tokenizer
            .encode(text, true)
            .map_err(|e| AgentError::Tokenization(e.to_string()))?;

        let input_ids = Tensor::new(encoding.get_ids(), &self.device)?.unsqueeze(0)?;
        let attention_mask = Tensor::new(encoding.get_attention_mask(), &self.device)?.unsqueeze(0)?;

        let logits = self.model.forward(&input_ids, &attention_mask)?;
        let probs: Vec<f32> = softmax(&logits, D::Minus1)?.squeeze(0)?.to_vec1()?;

        let (index, score) = probs
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .ok_or_else(|| AgentError::Inference("classifier returned no logits".into()))?;

        Ok(RawSentiment {
            label: self.config.label_for(index),
            score,
        })
    }
}

impl SentimentAnalysisModel for SentimentModernBertModel {
    type Options = ClassifierOptions;

    fn new(options: Self::Options, device: Device) -> Result<Self> {
        SentimentModernBertModel::new(options, device)
    }

    fn predict(&self, tokenizer: &Tokenizer, text: &str) -> Result<RawSentiment> {
        self.predict(tokenizer, text)
    }

    fn get_tokenizer(options: Self::Options) -> Result<Tokenizer> {
        TokenizerLoader::new(&options.model_id).load()
    }

    fn device(&self) -> &Device {
        self.device()
    }
}
