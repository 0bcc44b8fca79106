use tokenizers::Tokenizer;

use crate::core::Result;

/// Winning class straight from the classifier, before any label mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSentiment {
    /// Class name from the checkpoint's `id2label`, or `LABEL_<n>`.
    pub label: String,
    /// Softmax probability of `label`, in `[0, 1]`.
    pub score: f32,
}

pub trait SentimentAnalysisModel {
    type Options: std::fmt::Debug + Clone;

    fn new(options: Self::Options, device: candle_core::Device) -> Result<Self>
    where
        Self: Sized;

    fn predict(&self, tokenizer: &Tokenizer, text: &str) -> Result<RawSentiment>;

    fn predict_batch(&self, tokenizer: &Tokenizer, texts: &[&str]) -> Vec<Result<RawSentiment>> {
        texts
            .iter()
            .map(|text| self.predict(tokenizer, text))
            .collect()
    }

    fn get_tokenizer(options: Self::Options) -> Result<Tokenizer>;

    fn device(&self) -> &candle_core::Device;
}
