//! Operator notifications.
//!
//! Notifications are fire-and-forget: callers log a failed delivery and carry
//! on, so a missing or broken webhook never stalls mail processing.

mod embed;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::Result;

pub use embed::{
    DEFAULT_COLOR, EXCERPT_CHARS, Embed, EmbedAuthor, EmbedField, EmbedFooter, FOOTER_TEXT,
    classification_embed, job_update_embed, mail_embed,
};

/// Destination for operator notifications.
pub trait Notifier: Send + Sync {
    /// Deliver one embed.
    fn notify(&self, embed: &Embed) -> impl Future<Output = Result<()>> + Send;
}

impl<T: Notifier> Notifier for Arc<T> {
    fn notify(&self, embed: &Embed) -> impl Future<Output = Result<()>> + Send {
        (**self).notify(embed)
    }
}

/// Notifier that drops every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    async fn notify(&self, embed: &Embed) -> Result<()> {
        debug!(title = %embed.title, "Notification discarded");
        Ok(())
    }
}

/// Posts embeds to a Discord-compatible webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    http_client: reqwest::Client,
    url: String,
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    embeds: [&'a Embed; 1],
}

impl WebhookNotifier {
    /// Create a notifier posting to `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            http_client,
            url: url.into(),
        })
    }
}

impl Notifier for WebhookNotifier {
    async fn notify(&self, embed: &Embed) -> Result<()> {
        self.http_client
            .post(&self.url)
            .json(&WebhookPayload { embeds: [embed] })
            .send()
            .await?
            .error_for_status()?;

        debug!(title = %embed.title, "Notification delivered");
        Ok(())
    }
}

/// Either a webhook or nothing, chosen at start-up.
#[derive(Debug, Clone)]
pub enum AnyNotifier {
    /// Deliver to a webhook.
    Webhook(WebhookNotifier),
    /// Drop notifications.
    Noop(NoopNotifier),
}

impl Notifier for AnyNotifier {
    async fn notify(&self, embed: &Embed) -> Result<()> {
        match self {
            Self::Webhook(notifier) => notifier.notify(embed).await,
            Self::Noop(notifier) => notifier.notify(embed).await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_notifier_accepts_everything() {
        let notifier = Arc::new(NoopNotifier);
        assert!(notifier.notify(&Embed::new("title", "body")).await.is_ok());
    }

    #[test]
    fn test_webhook_payload_wraps_embed() {
        let embed = Embed::new("title", "body");
        let json = serde_json::to_value(WebhookPayload { embeds: [&embed] }).unwrap();
        assert_eq!(json["embeds"][0]["title"], "title");
        assert_eq!(json["embeds"][0]["color"], DEFAULT_COLOR);
    }
}
