use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Result of one chat completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub total_tokens: u32,
}

/// Chat-completion backend for summary generation.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_content: &str) -> Result<Completion>;

    /// Model identifier recorded alongside stored summaries.
    fn model(&self) -> &str;
}

pub struct OpenAiClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
    ) -> Result<Self> {
        // Long transcripts take a while to summarise; generous timeout.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(600))
            .build()
            .context("failed to build chat completion client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Usage,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: u32,
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn complete(&self, system_prompt: &str, user_content: &str) -> Result<Completion> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_content,
                },
            ],
            stream: false,
            temperature: self.temperature,
        };

        let response: ChatResponse = self
            .client
            .post(&self.endpoint)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .context("chat completion request failed")?
            .error_for_status()
            .context("chat completion request rejected")?
            .json()
            .await
            .context("malformed chat completion response")?;

        let Some(choice) = response.choices.into_iter().next() else {
            bail!("chat completion returned no choices");
        };
        info!(
            model = %self.model,
            total_tokens = response.usage.total_tokens,
            "chat completion finished"
        );
        Ok(Completion {
            text: choice.message.content,
            total_tokens: response.usage.total_tokens,
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn sends_system_and_user_messages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "stream": false,
                "messages": [
                    {"role": "system", "content": "summarise the lecture"},
                    {"role": "user", "content": "transcript text"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "a summary"}}],
                "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(server.uri(), "sk-test", "gpt-4o-mini", 0.3).unwrap();
        let completion = client
            .complete("summarise the lecture", "transcript text")
            .await
            .unwrap();

        assert_eq!(
            completion,
            Completion {
                text: "a summary".to_string(),
                total_tokens: 15,
            }
        );
    }

    #[tokio::test]
    async fn empty_choices_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [],
                "usage": {"total_tokens": 0}
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(server.uri(), "sk-test", "gpt-4o-mini", 0.3).unwrap();
        assert!(client.complete("p", "t").await.is_err());
    }
}
