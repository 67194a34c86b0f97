//! Mail data models.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::text;
use crate::job::JobKey;
use crate::{Error, Result};

/// What a mail is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Classification {
    /// Not classified yet.
    #[default]
    Unknown,
    /// Ordinary mail, not about a job application.
    RegularMail,
    /// Mail announcing a change in a job application.
    JobUpdate,
}

impl Classification {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "RegularMail" => Self::RegularMail,
            "JobUpdate" => Self::JobUpdate,
            _ => Self::Unknown,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::RegularMail => "RegularMail",
            Self::JobUpdate => "JobUpdate",
        }
    }

    /// Human-readable display name.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::RegularMail => "Regular Mail",
            Self::JobUpdate => "Job Update",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content hash identifying a mail: hex SHA-256 of sender, recipient,
/// subject and body text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MailHash(String);

impl MailHash {
    /// Hash the identifying parts of a mail.
    #[must_use]
    pub fn compute(from: &str, to: &str, subject: &str, text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(from.as_bytes());
        hasher.update(to.as_bytes());
        hasher.update(subject.as_bytes());
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();

        Self(digest.iter().map(|byte| format!("{byte:02x}")).collect())
    }

    /// Wrap an already computed hex digest (as read back from storage).
    #[must_use]
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// The hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short display id: the first 20 hex characters grouped `8-4-4-4`.
    ///
    /// Looks like a UUID but carries no version or variant bits.
    #[must_use]
    pub fn short_id(&self) -> String {
        let h = &self.0;
        if h.len() < 20 {
            return h.clone();
        }
        format!("{}-{}-{}-{}", &h[..8], &h[8..12], &h[12..16], &h[16..20])
    }
}

impl fmt::Display for MailHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A received mail and its classification state.
#[derive(Debug, Clone)]
pub struct Mail {
    /// Content hash.
    pub hash: MailHash,
    /// Sender address.
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub text: String,
    /// Raw HTML body, if the message had one.
    pub html: Option<String>,
    /// When the mail was received.
    pub received_at: DateTime<Utc>,
    /// Current label.
    pub classification: Classification,
    /// Whether the label was confirmed by a human.
    pub verified: bool,
    /// Whether extraction concluded for this mail.
    pub parsed: bool,
    /// Job record this mail produced, if known.
    pub job: Option<JobKey>,
}

impl Mail {
    /// Build a newly observed mail.
    ///
    /// When `text` is empty the body text is derived from `html`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMail`] if neither body has any content.
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        text: impl Into<String>,
        html: Option<String>,
        received_at: DateTime<Utc>,
    ) -> Result<Self> {
        let from = from.into();
        let to = to.into();
        let subject = subject.into();
        let mut body = text.into();

        if body.trim().is_empty() {
            if let Some(html) = html.as_deref() {
                body = htmd::convert(html).unwrap_or_else(|_| text::strip_html(html));
            }
        }
        if body.trim().is_empty() {
            return Err(Error::InvalidMail(format!(
                "no text or html body in mail from {from}"
            )));
        }

        Ok(Self {
            hash: MailHash::compute(&from, &to, &subject, &body),
            from,
            to,
            subject,
            text: body,
            html: html.filter(|h| !h.is_empty()),
            received_at,
            classification: Classification::Unknown,
            verified: false,
            parsed: false,
            job: None,
        })
    }

    /// Short display id derived from the hash.
    #[must_use]
    pub fn short_id(&self) -> String {
        self.hash.short_id()
    }

    /// Body text with markup, links and personal details removed.
    #[must_use]
    pub fn sanitized_text(&self) -> String {
        text::sanitize(&self.text)
    }

    /// The user turn sent to the extraction model.
    #[must_use]
    pub fn for_processing(&self) -> String {
        text::escape_prompt_tokens(&format!(
            "From: {} To: {} Subject: {} Text: {}",
            self.from,
            self.to,
            self.subject,
            text::strip_html(&self.text)
        ))
    }
}

impl fmt::Display for Mail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "From: {} To: {} Subject: {} Date: {}",
            self.from,
            self.to,
            self.subject,
            self.received_at.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

/// A mail as handed over by the ingestion side, before hashing.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMail {
    /// Sender address.
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// Subject line.
    #[serde(default)]
    pub subject: String,
    /// Plain-text body.
    #[serde(default)]
    pub text: String,
    /// HTML body.
    #[serde(default)]
    pub html: Option<String>,
    /// Receive time; defaults to now.
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

impl TryFrom<IncomingMail> for Mail {
    type Error = Error;

    fn try_from(incoming: IncomingMail) -> Result<Self> {
        Self::new(
            incoming.from,
            incoming.to,
            incoming.subject,
            incoming.text,
            incoming.html,
            incoming.date.unwrap_or_else(Utc::now),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_classification_roundtrip() {
        for label in [
            Classification::Unknown,
            Classification::RegularMail,
            Classification::JobUpdate,
        ] {
            assert_eq!(Classification::parse(label.as_str()), label);
        }
    }

    #[test]
    fn test_hash_ignores_markup_and_timestamp() {
        let a = Mail::new(
            "jobs@acme.io",
            "me@example.com",
            "Your application",
            "Thanks for applying",
            Some("<p>Thanks for applying</p>".into()),
            at(1),
        )
        .unwrap();
        let b = Mail::new(
            "jobs@acme.io",
            "me@example.com",
            "Your application",
            "Thanks for applying",
            Some("<div><b>Thanks</b> for applying</div>".into()),
            at(999_999),
        )
        .unwrap();

        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn test_hash_differs_on_subject() {
        let a = MailHash::compute("a", "b", "subject one", "body");
        let b = MailHash::compute("a", "b", "subject two", "body");
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        // sha256("") with all parts empty
        let hash = MailHash::compute("", "", "", "");
        assert_eq!(
            hash.as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_short_id_format() {
        let hash = MailHash::compute("", "", "", "");
        assert_eq!(hash.short_id(), "e3b0c442-98fc-1c14-9afb");
    }

    #[test]
    fn test_new_mail_falls_back_to_html() {
        let mail = Mail::new(
            "a@b.c",
            "d@e.f",
            "s",
            "",
            Some("<p>Interview invitation</p>".into()),
            at(0),
        )
        .unwrap();
        assert!(mail.text.contains("Interview invitation"));
        assert_eq!(mail.classification, Classification::Unknown);
        assert!(!mail.verified);
        assert!(!mail.parsed);
    }

    #[test]
    fn test_new_mail_without_body_is_rejected() {
        let result = Mail::new("a@b.c", "d@e.f", "s", " ", None, at(0));
        assert!(matches!(result, Err(Error::InvalidMail(_))));
    }

    #[test]
    fn test_for_processing_strips_markup() {
        let mail = Mail::new(
            "a@b.c",
            "d@e.f",
            "Offer",
            "<b>We are happy</b> to offer",
            None,
            at(0),
        )
        .unwrap();
        assert_eq!(
            mail.for_processing(),
            "From: a@b.c To: d@e.f Subject: Offer Text: We are happy to offer"
        );
    }

    #[test]
    fn test_incoming_mail_deserializes() {
        let incoming: IncomingMail = serde_json::from_str(
            r#"{"from":"a@b.c","to":"d@e.f","subject":"Hi","text":"Body"}"#,
        )
        .unwrap();
        let mail = Mail::try_from(incoming).unwrap();
        assert_eq!(mail.subject, "Hi");
        assert!(mail.html.is_none());
    }
}
