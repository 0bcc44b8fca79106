use super::model::SentimentAnalysisModel;
use super::pipeline::SentimentAnalysisPipeline;
use crate::core::{global_cache, ModelOptions, Result};
use crate::models::modernbert::{ClassifierOptions, ModernBertSize, SentimentModernBertModel};
use crate::pipelines::utils::{build_cache_key, DeviceRequest, DeviceSelectable};

pub struct SentimentAnalysisPipelineBuilder<M: SentimentAnalysisModel> {
    options: M::Options,
    device_request: DeviceRequest,
}

impl<M: SentimentAnalysisModel> SentimentAnalysisPipelineBuilder<M> {
    pub fn new(options: M::Options) -> Self {
        Self {
            options,
            device_request: DeviceRequest::Default,
        }
    }

    pub async fn build(self) -> Result<SentimentAnalysisPipeline<M>>
    where
        M: Clone + Send + Sync + 'static,
        M::Options: ModelOptions,
    {
        let device = self.device_request.resolve()?;
        let key = build_cache_key(&self.options, &device);
        tracing::debug!(%key, "building sentiment pipeline");

        let options = self.options.clone();
        let model = global_cache()
            .get_or_create(&key, || M::new(options, device.clone()))
            .await?;
        let tokenizer = M::get_tokenizer(self.options)?;

        Ok(SentimentAnalysisPipeline { model, tokenizer })
    }
}

impl<M: SentimentAnalysisModel> DeviceSelectable for SentimentAnalysisPipelineBuilder<M> {
    fn device_request_mut(&mut self) -> &mut DeviceRequest {
        &mut self.device_request
    }
}

impl SentimentAnalysisPipelineBuilder<SentimentModernBertModel> {
    pub fn modernbert(size: ModernBertSize) -> Self {
        Self::new(size.into())
    }

    /// Any ModernBERT sequence-classification checkpoint on the hub.
    pub fn modernbert_repo(model_id: &str) -> Self {
        Self::new(ClassifierOptions {
            model_id: model_id.to_string(),
        })
    }
}
