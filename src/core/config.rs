//! Runtime settings read from the environment.
//!
//! Every field has a default, so an empty environment yields a working
//! configuration. `.env` in the working directory is loaded first (when
//! present) and real environment variables take precedence over it.

use std::path::PathBuf;
use std::str::FromStr;

use super::error::{AgentError, Result};
use crate::pipelines::utils::DeviceRequest;

pub const DEFAULT_MODEL_NAME: &str = "clapAI/modernBERT-base-multilingual-sentiment";
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_LLM_MODEL: &str = "llama3-8b-8192";
pub const DEFAULT_AGENT_API_URL: &str = "http://localhost:8001/agent/run";

/// Where inference should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceChoice {
    /// CUDA device 0 when available, otherwise CPU.
    #[default]
    Auto,
    Cpu,
    Cuda,
}

impl DeviceChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceChoice::Auto => "auto",
            DeviceChoice::Cpu => "cpu",
            DeviceChoice::Cuda => "cuda",
        }
    }

    pub fn to_request(self) -> DeviceRequest {
        match self {
            DeviceChoice::Auto => DeviceRequest::Default,
            DeviceChoice::Cpu => DeviceRequest::Cpu,
            DeviceChoice::Cuda => DeviceRequest::Cuda(0),
        }
    }
}

impl FromStr for DeviceChoice {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(DeviceChoice::Auto),
            "cpu" => Ok(DeviceChoice::Cpu),
            "cuda" => Ok(DeviceChoice::Cuda),
            other => Err(AgentError::Config(format!(
                "DEVICE must be one of auto, cpu, cuda (got '{other}')"
            ))),
        }
    }
}

/// Output names for the three sentiment classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelNames {
    pub negative: String,
    pub neutral: String,
    pub positive: String,
}

impl Default for LabelNames {
    fn default() -> Self {
        Self {
            negative: "negative".into(),
            neutral: "neutral".into(),
            positive: "positive".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    // App
    pub app_name: String,
    pub debug: bool,
    pub api_prefix: String,
    pub version: String,
    pub description: String,
    pub bind_addr: String,
    pub log_level: String,

    // Model
    pub model_name: String,
    pub device: DeviceChoice,
    pub max_tokens: usize,
    pub labels: LabelNames,

    // LLM
    pub groq_api_key: Option<String>,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_temperature: f32,

    // Chat client
    pub agent_api_url: String,
    pub agent_user_id: String,
    pub agent_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "Sentiment Analysis API".into(),
            debug: false,
            api_prefix: "/sentiment".into(),
            version: "1.0.0".into(),
            description: "ModernBERT-based Sentiment Analysis Service".into(),
            bind_addr: "127.0.0.1:8000".into(),
            log_level: "info".into(),
            model_name: DEFAULT_MODEL_NAME.into(),
            device: DeviceChoice::Auto,
            max_tokens: 512,
            labels: LabelNames::default(),
            groq_api_key: None,
            llm_base_url: DEFAULT_LLM_BASE_URL.into(),
            llm_model: DEFAULT_LLM_MODEL.into(),
            llm_temperature: 0.2,
            agent_api_url: DEFAULT_AGENT_API_URL.into(),
            agent_user_id: "demo_user".into(),
            agent_timeout_secs: 10,
        }
    }
}

/// Load `.env` from the working directory or its parents into the process
/// environment. Returns the file that was loaded, if any.
pub fn load_dotenv() -> Result<Option<PathBuf>> {
    dotenv_outcome(dotenvy::dotenv())
}

fn dotenv_outcome(result: dotenvy::Result<PathBuf>) -> Result<Option<PathBuf>> {
    match result {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(AgentError::Config(format!("failed to load .env: {e}"))),
    }
}

impl Settings {
    /// Build settings from an arbitrary key lookup, applying defaults for
    /// missing or blank keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Settings::default();

        let debug = match get("DEBUG") {
            Some(v) => parse_bool("DEBUG", &v)?,
            None => defaults.debug,
        };

        let api_prefix = get("API_PREFIX").unwrap_or(defaults.api_prefix);
        if !api_prefix.starts_with('/') {
            return Err(AgentError::Config(format!(
                "API_PREFIX must start with '/' (got '{api_prefix}')"
            )));
        }
        let api_prefix = match api_prefix.trim_end_matches('/') {
            "" => return Err(AgentError::Config("API_PREFIX must not be '/'".into())),
            trimmed => trimmed.to_string(),
        };

        let device = match get("DEVICE") {
            Some(v) => v.parse()?,
            None => defaults.device,
        };

        let max_tokens = match get("MAX_TOKENS") {
            Some(v) => parse_number::<usize>("MAX_TOKENS", &v)?,
            None => defaults.max_tokens,
        };
        if max_tokens == 0 {
            return Err(AgentError::Config("MAX_TOKENS must be greater than zero".into()));
        }

        let llm_temperature = match get("LLM_TEMPERATURE") {
            Some(v) => parse_number::<f32>("LLM_TEMPERATURE", &v)?,
            None => defaults.llm_temperature,
        };
        if !(0.0..=2.0).contains(&llm_temperature) {
            return Err(AgentError::Config(format!(
                "LLM_TEMPERATURE must be within [0, 2] (got {llm_temperature})"
            )));
        }

        let agent_timeout_secs = match get("AGENT_TIMEOUT_SECS") {
            Some(v) => parse_number::<u64>("AGENT_TIMEOUT_SECS", &v)?,
            None => defaults.agent_timeout_secs,
        };

        let log_level = get("LOG_LEVEL").unwrap_or_else(|| {
            if debug {
                "debug".to_string()
            } else {
                defaults.log_level.clone()
            }
        });
        super::logging::parse_level(&log_level)?;

        Ok(Self {
            app_name: get("APP_NAME").unwrap_or(defaults.app_name),
            debug,
            api_prefix,
            version: get("VERSION").unwrap_or(defaults.version),
            description: get("DESCRIPTION").unwrap_or(defaults.description),
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            log_level,
            model_name: get("MODEL_NAME").unwrap_or(defaults.model_name),
            device,
            max_tokens,
            labels: LabelNames {
                negative: get("LABEL_NEGATIVE").unwrap_or(defaults.labels.negative),
                neutral: get("LABEL_NEUTRAL").unwrap_or(defaults.labels.neutral),
                positive: get("LABEL_POSITIVE").unwrap_or(defaults.labels.positive),
            },
            groq_api_key: get("GROQ_API_KEY"),
            llm_base_url: get("LLM_BASE_URL").unwrap_or(defaults.llm_base_url),
            llm_model: get("LLM_MODEL").unwrap_or(defaults.llm_model),
            llm_temperature,
            agent_api_url: get("AGENT_API_URL").unwrap_or(defaults.agent_api_url),
            agent_user_id: get("AGENT_USER_ID").unwrap_or(defaults.agent_user_id),
            agent_timeout_secs,
        })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AgentError::Config(format!(
            "{key} must be a boolean (got '{value}')"
        ))),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| AgentError::Config(format!("{key} must be a number (got '{value}')")))
}
