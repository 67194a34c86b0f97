//! Text-generation model client.
//!
//! Extraction talks to the model through [`ChatModel`], so the consensus loop
//! can be driven by the HTTP client in production and by a scripted model in
//! tests.

mod ollama;

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use ollama::OllamaClient;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions for the model.
    System,
    /// Content supplied by the user.
    User,
}

/// One message of a chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message author.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// A system instruction.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// A user turn.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Errors returned by a model client.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The model server answered with an error status.
    #[error("Model API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The request did not complete in time.
    #[error("Model request timed out")]
    Timeout,

    /// The response carried no text.
    #[error("Model returned an empty response")]
    EmptyResponse,
}

/// A chat-style text-generation model.
pub trait ChatModel: Send + Sync {
    /// Send `messages` to `model` and return the generated text.
    ///
    /// `temperature` of `None` leaves the model's default sampling in place.
    fn send(
        &self,
        messages: &[ChatMessage],
        model: &str,
        temperature: Option<f32>,
    ) -> impl Future<Output = Result<String, ModelError>> + Send;
}

impl<T: ChatModel> ChatModel for Arc<T> {
    fn send(
        &self,
        messages: &[ChatMessage],
        model: &str,
        temperature: Option<f32>,
    ) -> impl Future<Output = Result<String, ModelError>> + Send {
        (**self).send(messages, model, temperature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serializes_lowercase_role() {
        let json = serde_json::to_string(&ChatMessage::system("hi")).unwrap_or_default();
        assert_eq!(json, r#"{"role":"system","content":"hi"}"#);
    }
}
