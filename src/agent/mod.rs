//! The two reasoning components: sentiment classification and next-action
//! advice from a hosted LLM.

pub mod llm;
pub mod sentiment;

pub use llm::{build_prompt, AgentLlm, CompletionProvider, OpenAiCompatibleProvider};
pub use sentiment::{
    confidence_percent, map_label, Prediction, Sentiment, SentimentClassifier, SentimentService,
};
