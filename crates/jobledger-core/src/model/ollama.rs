//! Ollama chat client.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatMessage, ChatModel, ModelError};
use crate::Result;

/// Client for the Ollama `/api/chat` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http_client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

impl OllamaClient {
    /// Create a client for the server at `host` (e.g. `http://localhost:11434`).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(host: &str, request_timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            http_client,
            endpoint: chat_endpoint(host),
        })
    }

    /// The chat endpoint this client posts to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ChatModel for OllamaClient {
    async fn send(
        &self,
        messages: &[ChatMessage],
        model: &str,
        temperature: Option<f32>,
    ) -> std::result::Result<String, ModelError> {
        let request = ChatRequest {
            model,
            messages,
            stream: false,
            options: ChatOptions { temperature },
        };

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(timeout_or_http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response.json().await.map_err(timeout_or_http)?;
        let content = chat.message.map(|m| m.content).unwrap_or_default();
        debug!(model, chars = content.len(), "Model response received");

        if content.trim().is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        Ok(content)
    }
}

fn timeout_or_http(err: reqwest::Error) -> ModelError {
    if err.is_timeout() {
        ModelError::Timeout
    } else {
        ModelError::Http(err)
    }
}

fn chat_endpoint(host: &str) -> String {
    format!("{}/api/chat", host.trim_end_matches('/'))
}
