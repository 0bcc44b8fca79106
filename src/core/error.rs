use thiserror::Error;

/// Error type shared by every component of the crate.
#[derive(Debug, Error)]
pub enum AgentError {
    // Configuration
    #[error("config error: {0}")]
    Config(String),

    // Model loading
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Invalid model format: {0}")]
    ModelFormat(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Device error: {0}")]
    Device(String),

    // Inference
    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    // Remote services
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("LLM response error: {0}")]
    LlmResponse(String),

    #[error("agent response error: {0}")]
    AgentResponse(String),

    // Evaluation
    #[error("evaluation data error: {0}")]
    Dataset(String),

    // Pass-through from dependencies
    #[error(transparent)]
    Candle(#[from] candle_core::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;

impl From<hf_hub::api::sync::ApiError> for AgentError {
    fn from(value: hf_hub::api::sync::ApiError) -> Self {
        AgentError::Download(value.to_string())
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            AgentError::Http(format!("request timed out: {value}"))
        } else {
            AgentError::Http(value.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let e = AgentError::Config("MAX_TOKENS must be a positive integer".into());
        assert_eq!(
            e.to_string(),
            "config error: MAX_TOKENS must be a positive integer"
        );
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let e: AgentError = io_err.into();
        assert!(matches!(e, AgentError::Io(_)));
        assert!(e.to_string().contains("file missing"));
    }

    #[test]
    fn json_error_converts() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let e: AgentError = parse_err.into();
        assert!(matches!(e, AgentError::SerdeJson(_)));
    }
}
