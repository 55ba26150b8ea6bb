use super::{ChatMessage, ChatRequest, ChatResponse, LlmError};
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiReply,
}

#[derive(Deserialize)]
struct OpenAiReply {
    content: Option<String>,
}

pub async fn chat(
    client: &Client,
    config: &OpenAiConfig,
    model: &str,
    temperature: f32,
    request: &ChatRequest,
) -> Result<ChatResponse, LlmError> {
    let body = OpenAiRequest {
        model,
        messages: &request.messages,
        temperature,
        max_tokens: request.max_tokens,
        stream: false,
    };

    let mut req = client
        .post(format!("{}/chat/completions", config.base_url))
        .header("Content-Type", "application/json")
        .json(&body);

    if !config.api_key.is_empty() {
        req = req.header("Authorization", format!("Bearer {}", config.api_key));
    }

    let resp = req.send().await?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        return Err(LlmError::Api {
            status,
            message: text,
        });
    }

    let text = resp.text().await?;
    Ok(ChatResponse {
        content: parse_content(&text)?,
        model: model.to_string(),
    })
}

/// Content of the first choice, if any.
fn parse_content(body: &str) -> Result<Option<String>, LlmError> {
    let data: OpenAiResponse =
        serde_json::from_str(body).map_err(|e| LlmError::Parse(e.to_string()))?;
    Ok(data
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content))
}
