//! Chat-completion transport for the classifier.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use filingscan_shared::{FilingScanError, OpenAiConfig, Result};

use crate::classifier::ClassifyError;

/// One classifier call: the prompt plus generation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub model: String,
    pub temperature: f64,
}

/// A service that turns a prompt into raw reply text.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> std::result::Result<String, ClassifyError>;
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessageResponse>,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// OpenAiChat
// ---------------------------------------------------------------------------

/// OpenAI-compatible `/chat/completions` client. The prompt is sent as a
/// single system message.
pub struct OpenAiChat {
    client: Client,
    endpoint: String,
    api_key: String,
    json_mode: bool,
}

impl OpenAiChat {
    /// Build a client from config and an already-resolved API key.
    pub fn new(config: &OpenAiConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FilingScanError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            json_mode: config.json_mode,
        })
    }
}

#[async_trait]
impl CompletionService for OpenAiChat {
    async fn complete(&self, request: &CompletionRequest) -> std::result::Result<String, ClassifyError> {
        let body = ChatRequest {
            model: &request.model,
            messages: vec![ChatMessage {
                role: "system",
                content: &request.prompt,
            }],
            temperature: request.temperature,
            response_format: self.json_mode.then_some(ResponseFormat {
                r#type: "json_object",
            }),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClassifyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifyError::Transport(format!("HTTP {status}: {body}")));
        }

        let data: ChatResponse = response
            .json()
            .await
            .map_err(|e| ClassifyError::Format(format!("invalid completion body: {e}")))?;

        let content = data
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .ok_or_else(|| ClassifyError::Format("completion has no message content".into()))?;

        debug!(reply_chars = content.chars().count(), "completion received");
        Ok(content)
    }
}
