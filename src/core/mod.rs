pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod message;

pub use cache::{global_cache, ModelCache, ModelOptions};
pub use config::{DeviceChoice, LabelNames, Settings};
pub use error::{AgentError, Result};
pub use message::{Message, MessageVecExt, Role};
