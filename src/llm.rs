use crate::config::Config;
use crate::error::CompletionError;
use crate::message::{ChatMessage, ChatRole};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::time::Duration;

/// Message in the shape the completion endpoint expects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiMessage {
    pub role: String,
    pub content: String,
}

impl ApiMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

impl From<&ChatMessage> for ApiMessage {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role.to_string(),
            content: message.content.clone(),
        }
    }
}

/// Build the request body for one exchange: the persona instruction first,
/// then the whole conversation in order.
pub fn build_request(system_prompt: &str, history: &[ChatMessage]) -> Vec<ApiMessage> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    if !system_prompt.is_empty() {
        messages.push(ApiMessage::system(system_prompt));
    }
    messages.extend(history.iter().map(ApiMessage::from));
    messages
}

/// Port for the remote chat-completion service.
///
/// Uses native async fn in traits; the returned future must be `Send` so
/// the orchestrator can run it on a spawned task.
pub trait CompletionClient: Send + Sync + 'static {
    /// Send the conversation and return the text of the first choice.
    fn complete(
        &self,
        messages: &[ApiMessage],
    ) -> impl Future<Output = Result<String, CompletionError>> + Send;
}

#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ApiMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
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

/// Pull the first choice's text out of a raw response body
pub fn parse_completion(body: &str) -> Result<String, CompletionError> {
    let response: CompletionResponse = serde_json::from_str(body)
        .map_err(|e| CompletionError::Malformed(e.to_string()))?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| CompletionError::Malformed("response has no choices".to_string()))
}

/// HTTP client for an OpenAI-compatible `/chat/completions` endpoint
///
/// Does not derive Debug so the API key can't end up in logs.
#[derive(Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl LlmClient {
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config.require_api_key()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send(&self, messages: &[ApiMessage]) -> Result<String, CompletionError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = CompletionBody {
            model: &self.model,
            messages,
            temperature: self.temperature,
        };

        tracing::debug!(url = %url, model = %self.model, messages = messages.len(), "completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            tracing::warn!(status = %status, body = %text, "completion API error response");
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        parse_completion(&text)
    }
}

impl CompletionClient for LlmClient {
    fn complete(
        &self,
        messages: &[ApiMessage],
    ) -> impl Future<Output = Result<String, CompletionError>> + Send {
        self.send(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_prepends_system() {
        let history = vec![
            ChatMessage::user("what is 2+2?", None),
            ChatMessage::assistant("4", None),
            ChatMessage::user("and 3+3?", None),
        ];
        let request = build_request("be nice", &history);
        assert_eq!(request.len(), 4);
        assert_eq!(request[0], ApiMessage::system("be nice"));
        assert_eq!(request[1].role, "user");
        assert_eq!(request[2].role, "assistant");
        assert_eq!(request[3].content, "and 3+3?");
    }

    #[test]
    fn test_build_request_without_system() {
        let history = vec![ChatMessage::user("hi", None)];
        assert_eq!(build_request("", &history).len(), 1);
    }

    #[test]
    fn test_body_serialization() {
        let messages = vec![ApiMessage::system("s")];
        let body = CompletionBody {
            model: "deepseek-chat",
            messages: &messages,
            temperature: 0.5,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["model"], "deepseek-chat");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["temperature"], 0.5);
    }

    #[test]
    fn test_parse_first_choice() {
        let body = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"💡 hi"}},{"index":1,"message":{"role":"assistant","content":"other"}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "💡 hi");
    }

    #[test]
    fn test_parse_rejects_missing_choices() {
        assert!(matches!(
            parse_completion(r#"{"choices":[]}"#),
            Err(CompletionError::Malformed(_))
        ));
        assert!(matches!(
            parse_completion(r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#),
            Err(CompletionError::Malformed(_))
        ));
        assert!(matches!(parse_completion("<html>"), Err(CompletionError::Malformed(_))));
    }

    #[test]
    fn test_client_requires_api_key() {
        let mut config = Config::default();
        config.api_key = Some("sk-test".into());
        config.base_url = "http://localhost:9/v1/".into();
        let client = LlmClient::new(&config).unwrap();
        assert_eq!(client.base_url, "http://localhost:9/v1");
        assert_eq!(client.model(), "deepseek-chat");
    }
}
