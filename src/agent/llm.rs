//! Next-action reasoning through a hosted chat-completion API.
//!
//! [`AgentLlm`] owns the prompt; [`CompletionProvider`] is the transport.
//! One request per call: no retries, no streaming. Errors are returned to the
//! caller untouched.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::core::{AgentError, Result, Settings};

/// A single-turn text completion backend.
#[allow(async_fn_in_trait)]
pub trait CompletionProvider {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Build the support-agent prompt for one classified message.
pub fn build_prompt(sentiment: &str, confidence: f64, user_message: &str) -> String {
    format!(
        "\nYou are a customer support agent.\n\
         \n\
         User message:\n\
         \"{user_message}\"\n\
         \n\
         Sentiment: {sentiment}\n\
         Confidence: {confidence:?}\n\
         \n\
         Explain briefly what the agent should do next.\n"
    )
}

pub struct AgentLlm<P> {
    provider: P,
}

impl<P: CompletionProvider> AgentLlm<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Ask the model what to do next; returns its trimmed answer.
    pub async fn reason(&self, sentiment: &str, confidence: f64, user_message: &str) -> Result<String> {
        let prompt = build_prompt(sentiment, confidence, user_message);
        debug!(sentiment, confidence, prompt_len = prompt.len(), "requesting next action");
        let answer = self.provider.complete(&prompt).await?;
        Ok(answer.trim().to_string())
    }
}

/// Client for any endpoint speaking the OpenAI `/chat/completions` format.
///
/// Groq is the default; the base URL and model come from [`Settings`].
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    api_url: String,
    model: String,
    temperature: f32,
    api_key: Option<String>,
}

impl OpenAiCompatibleProvider {
    pub fn new(api_url: String, model: String, temperature: f32, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| AgentError::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url,
            model,
            temperature,
            api_key,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        if settings.groq_api_key.is_none() {
            tracing::warn!("GROQ_API_KEY is not set; LLM requests will be unauthenticated");
        }
        Self::new(
            settings.llm_base_url.clone(),
            settings.llm_model.clone(),
            settings.llm_temperature,
            settings.groq_api_key.clone(),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl CompletionProvider for OpenAiCompatibleProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let payload = ChatCompletionRequest {
            model: &self.model,
            messages: vec![WireMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };

        debug!(model = %self.model, temperature = self.temperature, "sending LLM request");
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full LLM request payload");
        }

        let mut request = self.client.post(&self.api_url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            error!(url = %self.api_url, error = %e, "LLM request failed (transport)");
            AgentError::from(e)
        })?;
        let response = check_status(response).await?;

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AgentError::LlmResponse(format!("failed to parse response body: {e}")))?;
        debug!(choices = parsed.choices.len(), "received LLM response");

        first_choice_text(parsed)
    }
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// Error envelope used by OpenAI-compatible APIs.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

fn first_choice_text(response: ChatCompletionResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AgentError::LlmResponse("empty or missing content in response".into()))
}

fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => format!("HTTP {status}: {}", envelope.error.message),
        Err(_) => format!("HTTP {status}: {body}"),
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());
    let message = error_message(status, &body);
    error!(%status, %message, "LLM request returned HTTP error");
    Err(AgentError::LlmResponse(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingProvider {
        reply: Result<String>,
        prompts: Mutex<Vec<String>>,
    }

    impl CompletionProvider for RecordingProvider {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(AgentError::Http(e.to_string())),
            }
        }
    }

    #[test]
    fn prompt_contains_message_and_sentiment() {
        let prompt = build_prompt("negative", 97.12, "My order never arrived");
        assert!(prompt.contains("You are a customer support agent."));
        assert!(prompt.contains("User message:\n\"My order never arrived\""));
        assert!(prompt.contains("Sentiment: negative\nConfidence: 97.12"));
        assert!(prompt
            .trim_end()
            .ends_with("Explain briefly what the agent should do next."));
    }

    #[test]
    fn whole_confidences_keep_a_decimal() {
        assert!(build_prompt("neutral", 0.0, "hi").contains("Confidence: 0.0\n"));
        assert!(build_prompt("positive", 100.0, "hi").contains("Confidence: 100.0\n"));
    }

    #[tokio::test]
    async fn reason_trims_answer() {
        let llm = AgentLlm::new(RecordingProvider {
            reply: Ok("  Apologise and offer a refund.\n".into()),
            prompts: Mutex::new(Vec::new()),
        });
        let answer = llm.reason("negative", 91.0, "Broken on arrival").await.unwrap();
        assert_eq!(answer, "Apologise and offer a refund.");
        assert_eq!(llm.provider.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reason_propagates_provider_errors() {
        let llm = AgentLlm::new(RecordingProvider {
            reply: Err(AgentError::Http("connection refused".into())),
            prompts: Mutex::new(Vec::new()),
        });
        let err = llm.reason("neutral", 0.0, "hello").await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn first_choice_is_extracted() {
        let parsed: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"  Escalate.  "}}]}"#,
        )
        .unwrap();
        assert_eq!(first_choice_text(parsed).unwrap(), "Escalate.");
    }

    #[test]
    fn missing_content_is_an_error() {
        let parsed: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            first_choice_text(parsed),
            Err(AgentError::LlmResponse(_))
        ));
    }

    #[test]
    fn error_envelope_is_unwrapped() {
        let msg = error_message(
            reqwest::StatusCode::UNAUTHORIZED,
            r#"{"error":{"message":"Invalid API Key","type":"invalid_request_error"}}"#,
        );
        assert_eq!(msg, "HTTP 401 Unauthorized: Invalid API Key");

        let msg = error_message(reqwest::StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(msg, "HTTP 502 Bad Gateway: upstream down");
    }

    #[test]
    fn request_payload_shape() {
        let payload = ChatCompletionRequest {
            model: "llama3-8b-8192",
            messages: vec![WireMessage {
                role: "user",
                content: "hi",
            }],
            temperature: 0.2,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["model"], "llama3-8b-8192");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hi");
    }
}
