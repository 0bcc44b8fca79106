//! Sentiment analysis pipeline.
//!
//! Runs a pretrained sequence classifier over a piece of text and returns the
//! winning class name together with its softmax probability.
//!
//! ```rust,no_run
//! use sentiment_agent::pipelines::sentiment::*;
//!
//! # async fn run() -> sentiment_agent::core::Result<()> {
//! let pipeline = SentimentAnalysisPipelineBuilder::modernbert(ModernBertSize::Base)
//!     .cpu()
//!     .build()
//!     .await?;
//!
//! let result = pipeline.predict("I love this product!")?;
//! println!("{} ({:.4})", result.label, result.score);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod model;
pub mod pipeline;

pub use builder::SentimentAnalysisPipelineBuilder;
pub use model::{RawSentiment, SentimentAnalysisModel};
pub use pipeline::SentimentAnalysisPipeline;

pub use crate::models::modernbert::{ClassifierOptions, ModernBertSize, SentimentModernBertModel};
pub use crate::pipelines::utils::DeviceSelectable;
