pub mod agent;
pub mod chat;
pub mod core;
pub mod evaluation;
mod loaders;
pub mod models;
pub mod pipelines;
pub mod server;

// Re-export core types
pub use core::{AgentError, Message, MessageVecExt, Result, Settings};

// Re-export the types most callers start from
pub use agent::{AgentLlm, Prediction, Sentiment, SentimentService};
pub use models::modernbert::{ModernBertSize, SentimentModernBertModel};
