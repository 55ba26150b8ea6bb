pub mod openai;

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{LlmConfig, ProviderKind};
use crate::db::models::Message;

/// Output budget for a chat reply.
pub const CHAT_MAX_TOKENS: u32 = 500;
/// Output budget for a page-range summary.
pub const SUMMARY_MAX_TOKENS: u32 = 2000;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

impl From<&Message> for ChatMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.as_str().to_string(),
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    /// `None` when the upstream returned no content.
    pub content: Option<String>,
    pub model: String,
}

/// A chat-completion backend.
pub trait ChatModel: Send + Sync {
    fn chat(
        &self,
        request: &ChatRequest,
    ) -> impl Future<Output = Result<ChatResponse, LlmError>> + Send;
}

/// OpenAI-compatible endpoints the client can talk to.
#[derive(Debug, Clone)]
pub enum Provider {
    OpenAi(openai::OpenAiConfig),
    Ollama(openai::OpenAiConfig),
}

impl Provider {
    pub fn openai(api_key: String) -> Self {
        Provider::OpenAi(openai::OpenAiConfig {
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
        })
    }

    pub fn ollama(host: String) -> Self {
        Provider::Ollama(openai::OpenAiConfig {
            api_key: String::new(),
            base_url: format!("{}/v1", host.trim_end_matches('/')),
        })
    }

    fn config(&self) -> &openai::OpenAiConfig {
        match self {
            Provider::OpenAi(config) | Provider::Ollama(config) => config,
        }
    }
}

/// Completion client with a fixed model and temperature.
///
/// Built once at startup; the inner HTTP client pools connections across
/// requests.
#[derive(Debug, Clone)]
pub struct CompletionClient {
    http: Client,
    provider: Provider,
    model: String,
    temperature: f32,
}

impl CompletionClient {
    pub fn new(
        provider: Provider,
        model: impl Into<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            provider,
            model: model.into(),
            temperature,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let mut provider = match config.provider {
            ProviderKind::OpenAi => Provider::openai(config.api_key.clone().unwrap_or_default()),
            ProviderKind::Ollama => Provider::ollama(config.ollama_host.clone()),
        };
        if let Some(base_url) = &config.base_url {
            match &mut provider {
                Provider::OpenAi(c) | Provider::Ollama(c) => c.base_url = base_url.clone(),
            }
        }
        Self::new(
            provider,
            config.model.clone(),
            config.temperature,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl ChatModel for CompletionClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        openai::chat(
            &self.http,
            self.provider.config(),
            &self.model,
            self.temperature,
            request,
        )
        .await
    }
}

/// One completion call: system prompt, prior turns, optional new user turn.
#[derive(Debug, Clone, Copy)]
pub struct Completion<'a> {
    pub system_prompt: &'a str,
    /// Oldest first.
    pub history: &'a [ChatMessage],
    pub user_turn: Option<&'a str>,
    pub max_tokens: u32,
    /// Returned in place of an empty reply.
    pub fallback: &'a str,
}

pub async fn complete<M: ChatModel>(
    model: &M,
    completion: Completion<'_>,
) -> Result<String, LlmError> {
    let mut messages = Vec::with_capacity(completion.history.len() + 2);
    messages.push(ChatMessage::system(completion.system_prompt));
    messages.extend_from_slice(completion.history);
    if let Some(turn) = completion.user_turn {
        messages.push(ChatMessage::user(turn));
    }

    let request = ChatRequest {
        messages,
        max_tokens: completion.max_tokens,
    };
    debug!(
        history = completion.history.len(),
        max_tokens = completion.max_tokens,
        "requesting completion"
    );

    let response = model.chat(&request).await?;
    debug!(model = %response.model, empty = response.content.is_none(), "completion received");
    Ok(response
        .content
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| completion.fallback.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
}
