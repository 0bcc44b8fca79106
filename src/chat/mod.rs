//! Chat client for the agent-run endpoint.
//!
//! A [`ChatSession`] keeps the conversation in memory and turns each
//! submission into one POST against the agent service. The terminal front end
//! lives in [`terminal`].

pub mod terminal;

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::core::{AgentError, Message, Result, Settings};

/// Keys a reply must carry to be rendered.
pub const REPLY_KEYS: [&str; 5] = [
    "action",
    "sentiment",
    "confidence_score",
    "next_message",
    "reasoning",
];

/// Transport to the agent-run endpoint.
#[allow(async_fn_in_trait)]
pub trait AgentApi {
    async fn run(&self, user_id: &str, message: &str) -> Result<Value>;
}

#[derive(Debug, Serialize)]
struct RunRequest<'a> {
    user_id: &'a str,
    message: &'a str,
}

#[derive(Debug, Clone)]
pub struct HttpAgentApi {
    client: Client,
    url: String,
}

impl HttpAgentApi {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            settings.agent_api_url.clone(),
            Duration::from_secs(settings.agent_timeout_secs),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl AgentApi for HttpAgentApi {
    async fn run(&self, user_id: &str, message: &str) -> Result<Value> {
        debug!(url = %self.url, chars = message.chars().count(), "posting to agent");
        let response = self
            .client
            .post(&self.url)
            .json(&RunRequest { user_id, message })
            .send()
            .await?;

        // Any status is accepted; the body decides whether the reply is usable.
        response
            .json::<Value>()
            .await
            .map_err(|e| AgentError::AgentResponse(format!("response is not JSON: {e}")))
    }
}

/// Why a submission produced no assistant entry.
#[derive(Debug, Error, PartialEq)]
pub enum ChatError {
    #[error("API Error: {0}")]
    Request(String),

    /// `raw` is the reply body as received.
    #[error("Unexpected response format. Response keys: {keys:?}")]
    UnexpectedFormat { keys: Vec<String>, raw: Value },
}

impl ChatError {
    /// The reply body, when one arrived.
    pub fn raw(&self) -> Option<&Value> {
        match self {
            Self::Request(_) => None,
            Self::UnexpectedFormat { raw, .. } => Some(raw),
        }
    }
}

/// A well-formed agent reply.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentReply {
    pub action: String,
    pub sentiment: String,
    pub confidence_score: String,
    pub next_message: String,
    pub reasoning: String,
}

impl AgentReply {
    pub fn from_value(value: &Value) -> std::result::Result<Self, ChatError> {
        let Some(object) = value.as_object() else {
            return Err(ChatError::UnexpectedFormat {
                keys: Vec::new(),
                raw: value.clone(),
            });
        };
        if !REPLY_KEYS.iter().all(|key| object.contains_key(*key)) {
            return Err(ChatError::UnexpectedFormat {
                keys: object.keys().cloned().collect(),
                raw: value.clone(),
            });
        }

        let field = |key: &str| object.get(key).map(plain_text).unwrap_or_default();
        Ok(Self {
            action: field("action"),
            sentiment: field("sentiment"),
            confidence_score: field("confidence_score"),
            next_message: field("next_message"),
            reasoning: field("reasoning"),
        })
    }

    /// Markdown block stored as the assistant entry.
    pub fn render(&self) -> String {
        format!(
            "**Action:** {}\n\
             \n\
             **Sentiment:** {}\n\
             **Confidence:** {}%\n\
             \n\
             **Agent Reply:**\n\
             {}\n\
             \n\
             **Reasoning:**\n\
             _{}_",
            self.action, self.sentiment, self.confidence_score, self.next_message, self.reasoning
        )
    }
}

// Strings print bare; anything else as compact JSON.
fn plain_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Outcome of one successful submission.
#[derive(Debug, Clone)]
pub struct Exchange {
    /// The reply body exactly as received.
    pub raw: Value,
    pub reply: AgentReply,
}

pub struct ChatSession<A> {
    api: A,
    user_id: String,
    history: Vec<Message>,
}

impl<A: AgentApi> ChatSession<A> {
    pub fn new(api: A, user_id: impl Into<String>) -> Self {
        Self {
            api,
            user_id: user_id.into(),
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Record `text`, ask the agent, and record its rendered reply.
    ///
    /// The user entry is kept even when the call fails; the assistant entry
    /// is only added for a well-formed reply.
    pub async fn submit(&mut self, text: &str) -> std::result::Result<Exchange, ChatError> {
        self.history.push(Message::user(text));

        let raw = self
            .api
            .run(&self.user_id, text)
            .await
            .map_err(|e| ChatError::Request(e.to_string()))?;
        let reply = AgentReply::from_value(&raw)?;

        self.history.push(Message::assistant(&reply.render()));
        Ok(Exchange { raw, reply })
    }
}
