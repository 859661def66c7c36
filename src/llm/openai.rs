use crate::config::{HttpConfig, Secret};
use crate::http::{body_excerpt, build_client};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Secret,
    pub model: String,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key: Secret::default(),
            model: "gpt-4o-mini".into(),
            temperature: 0.2,
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("missing generation backend api key")]
    MissingApiKey,
    #[error("http error: {0}")]
    Http(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct LlmMessage {
    pub role: String,
    pub content: String,
}

impl LlmMessage {
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

/// A text-generation backend that answers a conversation with one message.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// `json_mode` asks the backend to constrain its answer to a JSON object.
    async fn chat(&self, messages: &[LlmMessage], json_mode: bool) -> Result<String, LlmError>;
}

pub struct LlmClient {
    http: Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig, http: &HttpConfig) -> Self {
        Self {
            http: build_client(http),
            config,
        }
    }
}

#[async_trait]
impl ChatBackend for LlmClient {
    async fn chat(&self, messages: &[LlmMessage], json_mode: bool) -> Result<String, LlmError> {
        if self.config.api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }
        let base = self.config.base_url.trim().trim_end_matches('/');

        let body = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            response_format: json_mode.then_some(ResponseFormat {
                r#type: "json_object",
            }),
        };

        let response = self
            .http
            .post(format!("{base}/chat/completions"))
            .bearer_auth(self.config.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|err| LlmError::Http(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .map_err(|err| LlmError::Http(err.to_string()))?;
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: body_excerpt(&text),
            });
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|err| LlmError::InvalidResponse(err.to_string()))?;

        if let Some(usage) = &payload.usage {
            debug!(
                target = "lister.llm",
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "chat_usage"
            );
        }

        payload
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| LlmError::InvalidResponse("missing message content".into()))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [LlmMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
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

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScannedCode;

    #[tokio::test]
    async fn missing_key_fails_before_network() {
        let client = LlmClient::new(LlmConfig::default(), &HttpConfig::default());
        let err = client
            .chat(&[LlmMessage::user("hi")], true)
            .await
            .expect_err("no key");
        assert!(matches!(err, LlmError::MissingApiKey));
    }

    #[test]
    fn request_body_shape() {
        let code = ScannedCode::parse("012345678905").expect("code");
        let messages = [LlmMessage::user(format!("barcode {code}"))];
        let body = ChatRequest {
            model: "gpt-4o-mini",
            messages: &messages,
            temperature: 0.2,
            response_format: Some(ResponseFormat {
                r#type: "json_object",
            }),
        };
        let value = serde_json::to_value(&body).expect("serialize");
        assert_eq!(value["model"], "gpt-4o-mini");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["response_format"]["type"], "json_object");
    }

    #[test]
    fn response_content_is_extracted() {
        let raw = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"{\"title\":\"Mug\"}"}}],"usage":{"prompt_tokens":10,"completion_tokens":5}}"#;
        let payload: ChatResponse = serde_json::from_str(raw).expect("decode");
        let content = payload
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .expect("content");
        assert_eq!(content, r#"{"title":"Mug"}"#);
    }
}
