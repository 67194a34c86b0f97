//! Job record data models.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mail::MailHash;

/// Status of a job application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppStatus {
    /// Application was submitted.
    Applied,
    /// An interview was scheduled or took place.
    Interview,
    /// An offer was extended.
    Offer,
    /// The application was declined.
    Rejected,
    /// The applicant was hired.
    Hired,
}

impl AppStatus {
    /// Every allowed status, in prompt order.
    pub const ALL: [Self; 5] = [
        Self::Applied,
        Self::Interview,
        Self::Offer,
        Self::Rejected,
        Self::Hired,
    ];

    /// Parse from the wire/database representation.
    ///
    /// Returns `None` for anything outside the fixed set.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "applied" => Some(Self::Applied),
            "interview" => Some(Self::Interview),
            "offer" => Some(Self::Offer),
            "rejected" => Some(Self::Rejected),
            "hired" => Some(Self::Hired),
            _ => None,
        }
    }

    /// Convert to the wire/database representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Interview => "interview",
            Self::Offer => "offer",
            Self::Rejected => "rejected",
            Self::Hired => "hired",
        }
    }

    /// Embed colour used when notifying about this status.
    #[must_use]
    pub const fn color(&self) -> u32 {
        match self {
            Self::Applied => 0x00_ff_00,
            Self::Rejected => 0xff_00_00,
            Self::Interview | Self::Offer | Self::Hired => 0xff_ff_00,
        }
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a tracked application: exact job title and company.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobKey {
    /// Job title as extracted.
    pub title: String,
    /// Company name as extracted.
    pub company: String,
}

impl JobKey {
    /// Create a new key.
    #[must_use]
    pub fn new(title: impl Into<String>, company: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            company: company.into(),
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.title, self.company)
    }
}

/// A tracked job application.
#[derive(Debug, Clone)]
pub struct JobRecord {
    /// Store row id.
    pub id: Option<i64>,
    /// Title and company.
    pub key: JobKey,
    /// Latest known status.
    pub status: AppStatus,
    /// Posting id, if the mail mentioned one.
    pub job_id: Option<String>,
    /// Posting link, if the mail mentioned one.
    pub link: Option<String>,
    /// When the record was first created.
    pub created_at: DateTime<Utc>,
    /// When the status was last written.
    pub last_updated: DateTime<Utc>,
    /// Hashes of every mail that contributed to this record.
    pub mail_hashes: BTreeSet<MailHash>,
}

impl fmt::Display for JobRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.key, self.status)
    }
}
