//! Validating parse of one model answer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::vote::{FieldVote, majority};
use crate::job::{AppStatus, JobKey};

/// Phrase the model is told to answer with for unrelated mails.
pub const NOT_APPLICABLE_MARKER: &str = "Not a Job Update or Job Application";

/// One successful, validated model answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCandidate {
    /// Application status.
    pub status: AppStatus,
    /// Job title.
    pub job: String,
    /// Company name.
    pub company: String,
    /// Posting id, if mentioned.
    pub job_id: Option<String>,
    /// Posting link, if mentioned.
    pub link: Option<String>,
    /// Model's explanation, if it gave one.
    pub reason: Option<String>,
}

impl StatusCandidate {
    /// The job record key this candidate refers to.
    #[must_use]
    pub fn key(&self) -> JobKey {
        JobKey::new(self.job.clone(), self.company.clone())
    }
}

impl FieldVote for StatusCandidate {
    fn elect(ballots: &[Self]) -> Option<Self> {
        Some(Self {
            status: *majority(ballots.iter().map(|c| &c.status))?,
            job: majority(ballots.iter().map(|c| &c.job))?.clone(),
            company: majority(ballots.iter().map(|c| &c.company))?.clone(),
            job_id: majority(ballots.iter().map(|c| &c.job_id))?.clone(),
            link: majority(ballots.iter().map(|c| &c.link))?.clone(),
            reason: majority(ballots.iter().map(|c| &c.reason))?.clone(),
        })
    }
}

/// Why a single extraction attempt did not produce a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ExtractionError {
    /// The model could not be reached or returned no text.
    #[error("model query error")]
    TransportFailure,
    /// The answer was not a JSON object.
    #[error("JSON parsing error")]
    MalformedOutput,
    /// Status, job or company was missing.
    #[error("invalid JSON keys")]
    MissingFields,
    /// Status was outside the allowed set.
    #[error("status is not valid")]
    InvalidStatus,
    /// The model said the mail is not about a job application.
    #[error("not a job update or job application")]
    NotApplicable,
}

impl FieldVote for ExtractionError {
    fn elect(ballots: &[Self]) -> Option<Self> {
        majority(ballots).copied()
    }
}

/// Turn one model answer into a candidate or a tagged failure.
///
/// # Errors
///
/// Returns the [`ExtractionError`] describing the first check the answer failed.
pub fn parse_response(answer: &str) -> Result<StatusCandidate, ExtractionError> {
    if answer.trim().is_empty() {
        return Err(ExtractionError::TransportFailure);
    }
    if answer
        .to_lowercase()
        .contains(&NOT_APPLICABLE_MARKER.to_lowercase())
    {
        return Err(ExtractionError::NotApplicable);
    }

    let Ok(Value::Object(object)) = serde_json::from_str::<Value>(strip_code_fence(answer)) else {
        return Err(ExtractionError::MalformedOutput);
    };

    let (Some(status), Some(job), Some(company)) = (
        text_field(&object, "status"),
        text_field(&object, "job"),
        text_field(&object, "company"),
    ) else {
        return Err(ExtractionError::MissingFields);
    };

    let status = AppStatus::parse(&status).ok_or(ExtractionError::InvalidStatus)?;

    Ok(StatusCandidate {
        status,
        job,
        company,
        job_id: text_field(&object, "jobId"),
        link: text_field(&object, "link"),
        reason: text_field(&object, "reason"),
    })
}

/// Read a non-blank string (or number) field.
fn text_field(object: &Map<String, Value>, name: &str) -> Option<String> {
    match object.get(name)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Remove a surrounding Markdown code fence, if any.
fn strip_code_fence(answer: &str) -> &str {
    let trimmed = answer.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an info string such as `json`
    let inner = inner.split_once('\n').map_or(inner, |(_, rest)| rest);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
