use tokenizers::Tokenizer;

use super::model::{RawSentiment, SentimentAnalysisModel};
use crate::core::Result;

/// Classifies text sentiment with a loaded model and its tokenizer.
///
/// Construct with [`SentimentAnalysisPipelineBuilder`](super::SentimentAnalysisPipelineBuilder).
pub struct SentimentAnalysisPipeline<M: SentimentAnalysisModel> {
    pub(crate) model: M,
    pub(crate) tokenizer: Tokenizer,
}

impl<M: SentimentAnalysisModel> SentimentAnalysisPipeline<M> {
    pub fn predict(&self, text: &str) -> Result<RawSentiment> {
        self.model.predict(&self.tokenizer, text)
    }

    /// One result per input, in order; a failure affects only its own entry.
    pub fn predict_batch(&self, texts: &[&str]) -> Vec<Result<RawSentiment>> {
        self.model.predict_batch(&self.tokenizer, texts)
    }

    pub fn device(&self) -> &candle_core::Device {
        self.model.device()
    }
}
