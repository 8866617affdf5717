//! OpenAI-compatible chat completions client.
//!
//! # API Reference
//!
//! - Endpoint: `POST {base_url}/chat/completions`
//! - Messages: system instructions, trailing window, latest user utterance
//! - Output: `choices[0].message.content`

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::base::{GenerationError, GenerationRequest, GenerationResult, ResponseGenerator};
use crate::config::ServerConfig;
use crate::core::session::TurnRole;

/// Maximum tokens requested per reply; phone replies are one or two sentences
pub const MAX_REPLY_TOKENS: u32 = 100;

/// Sampling temperature for replies
pub const REPLY_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completions client used for reply generation
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    timeout: Duration,
    degraded_reply: String,
}

impl ChatCompletionsClient {
    /// Create a new client
    pub fn new(
        api_key: Option<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        degraded_reply: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.into(),
            model: model.into(),
            timeout: Duration::from_secs(crate::config::DEFAULT_GENERATION_TIMEOUT_SECONDS),
            degraded_reply: degraded_reply.into(),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.openai_api_key.clone(),
            config.openai_base_url.clone(),
            config.openai_model.clone(),
            config.agent.degraded_reply.clone(),
        )
        .with_timeout(config.generation_timeout())
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Completions endpoint URL
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_body<'a>(&'a self, request: &'a GenerationRequest) -> ChatCompletionRequest<'a> {
        let mut messages = Vec::with_capacity(request.window.len() + 2);
        messages.push(ChatMessage {
            role: "system",
            content: &request.system_prompt,
        });
        for turn in &request.window {
            let role = match turn.role {
                TurnRole::User => "user",
                TurnRole::Assistant => "assistant",
            };
            messages.push(ChatMessage {
                role,
                content: &turn.text,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.user_text,
        });

        ChatCompletionRequest {
            model: &self.model,
            messages,
            max_tokens: MAX_REPLY_TOKENS,
            temperature: REPLY_TEMPERATURE,
        }
    }
}

#[async_trait]
impl ResponseGenerator for ChatCompletionsClient {
    async fn generate(&self, request: &GenerationRequest) -> GenerationResult<String> {
        let Some(api_key) = &self.api_key else {
            debug!("No generation credential configured, returning degraded reply");
            return Ok(self.degraded_reply.clone());
        };

        let url = self.endpoint();
        debug!(
            url = %url,
            model = %self.model,
            window = request.window.len(),
            "Chat completion request"
        );

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&self.build_body(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(self.timeout.as_secs())
                } else {
                    GenerationError::RequestFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Chat completion rejected");
            return Err(GenerationError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout(self.timeout.as_secs())
            } else {
                GenerationError::MalformedResponse(e.to_string())
            }
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(GenerationError::EmptyReply)
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}
