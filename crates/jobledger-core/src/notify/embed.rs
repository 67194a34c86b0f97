//! Discord-style message embeds.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::extract::StatusCandidate;
use crate::mail::{Mail, text};

/// Footer text on every embed.
pub const FOOTER_TEXT: &str = "Job Tracker";
/// Colour of embeds that do not carry a job status.
pub const DEFAULT_COLOR: u32 = 0x0099ff;
/// Longest mail excerpt shown in a new-mail embed.
pub const EXCERPT_CHARS: usize = 255;

/// A rich message for the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Embed {
    /// Headline.
    pub title: String,
    /// Body text under the headline.
    pub description: String,
    /// Side-bar colour as `0xRRGGBB`.
    pub color: u32,
    /// Shown above the title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,
    /// Labelled values.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    /// Footer line.
    pub footer: EmbedFooter,
    /// Time the embed refers to.
    pub timestamp: DateTime<Utc>,
}

/// Embed author line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedAuthor {
    /// Author name.
    pub name: String,
}

/// Embed footer line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedFooter {
    /// Footer text.
    pub text: String,
}

/// One labelled value of an embed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedField {
    /// Label.
    pub name: String,
    /// Value.
    pub value: String,
    /// Whether the field may share a row with its neighbours.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub inline: bool,
}

impl Embed {
    /// An embed with the default colour and footer, stamped now.
    #[must_use]
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            color: DEFAULT_COLOR,
            author: None,
            fields: Vec::new(),
            footer: EmbedFooter {
                text: FOOTER_TEXT.to_string(),
            },
            timestamp: Utc::now(),
        }
    }

    /// Set the side-bar colour.
    #[must_use]
    pub const fn with_color(mut self, color: u32) -> Self {
        self.color = color;
        self
    }

    /// Set the author line.
    #[must_use]
    pub fn with_author(mut self, name: impl Into<String>) -> Self {
        self.author = Some(EmbedAuthor { name: name.into() });
        self
    }

    /// Append a full-width field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline: false,
        });
        self
    }

    /// Append an inline field.
    #[must_use]
    pub fn inline_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline: true,
        });
        self
    }

    /// Value of the first field called `name`.
    #[must_use]
    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

/// Embed announcing a mail, with a redacted excerpt of its text.
#[must_use]
pub fn mail_embed(mail: &Mail, title: &str) -> Embed {
    let excerpt = mail.sanitized_text();

    Embed::new(title, mail.subject.as_str())
        .with_author(mail.from.as_str())
        .field("Classification", mail.classification.display_name())
        .inline_field("To", mail.to.as_str())
        .inline_field("From", mail.from.as_str())
        .inline_field("Date", format_date(&mail.received_at))
        .field("Text", text::truncate_chars(&excerpt, EXCERPT_CHARS))
}

/// Embed reporting the label a mail was given.
#[must_use]
pub fn classification_embed(mail: &Mail, title: &str) -> Embed {
    Embed::new(title, mail.subject.as_str())
        .field("Classification", mail.classification.display_name())
        .inline_field("From", mail.from.as_str())
}

/// Embed reporting a recorded job status, coloured by status.
#[must_use]
pub fn job_update_embed(candidate: &StatusCandidate, mail: &Mail) -> Embed {
    let embed = Embed::new(
        format!("Job Update: {} ({})", candidate.key(), candidate.status),
        mail.subject.as_str(),
    )
    .with_color(candidate.status.color())
    .inline_field("From", mail.from.as_str())
    .inline_field("To", mail.to.as_str())
    .inline_field("Date", format_date(&mail.received_at));

    match candidate.link.as_deref() {
        Some(link) => embed.field("Link", link),
        None => embed,
    }
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::job::AppStatus;

    fn mail(text: &str) -> Mail {
        Mail::new(
            "jobs@acme.io",
            "me@example.com",
            "Your application",
            text,
            None,
            Utc::now(),
        )
        .unwrap()
    }

    fn candidate(status: AppStatus, link: Option<&str>) -> StatusCandidate {
        StatusCandidate {
            status,
            job: "Engineer".into(),
            company: "Acme".into(),
            job_id: None,
            link: link.map(Into::into),
            reason: None,
        }
    }

    #[test]
    fn test_mail_embed_redacts_and_truncates() {
        let body = format!(
            "Call us at\n555-123-4567\nor write to hr@acme.io {}",
            "x".repeat(400)
        );
        let embed = mail_embed(&mail(&body), "New mail");

        let excerpt = embed.field_value("Text").unwrap();
        assert_eq!(excerpt.chars().count(), EXCERPT_CHARS);
        assert!(excerpt.contains("[PHONE]"));
        assert!(excerpt.contains("[EMAIL]"));
        assert!(!excerpt.contains("hr@acme.io"));
        assert_eq!(embed.field_value("Classification"), Some("Unknown"));
        assert_eq!(embed.footer.text, FOOTER_TEXT);
    }

    #[test]
    fn test_job_update_embed_colour_and_link() {
        let m = mail("We received your application");

        let applied = job_update_embed(&candidate(AppStatus::Applied, None), &m);
        assert_eq!(applied.color, 0x00ff00);
        assert_eq!(applied.title, "Job Update: Engineer - Acme (applied)");
        assert!(applied.field_value("Link").is_none());

        let rejected = job_update_embed(
            &candidate(AppStatus::Rejected, Some("https://acme.io/jobs/1")),
            &m,
        );
        assert_eq!(rejected.color, 0xff0000);
        assert_eq!(rejected.field_value("Link"), Some("https://acme.io/jobs/1"));

        let interview = job_update_embed(&candidate(AppStatus::Interview, None), &m);
        assert_eq!(interview.color, 0xffff00);
    }

    #[test]
    fn test_embed_serializes_discord_shape() {
        let embed = classification_embed(&mail("hello"), "Mail classified as Regular Mail");
        let json = serde_json::to_value(&embed).unwrap();

        assert_eq!(json["footer"]["text"], "Job Tracker");
        assert_eq!(json["fields"][0]["name"], "Classification");
        assert!(json["fields"][0].get("inline").is_none());
        assert_eq!(json["fields"][1]["inline"], true);
        assert!(json.get("author").is_none());
    }
}
