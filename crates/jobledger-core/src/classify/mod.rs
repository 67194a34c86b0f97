//! Mail classification state machine.
//!
//! A mail starts out `Unknown`. Automatic triage may propose a label; only a
//! human confirmation makes it verified, and only confirmations trigger job
//! extraction or job removal.

mod service;

use std::fmt;

use crate::extract::ExtractionError;
use crate::job::{JobKey, UpsertOutcome};
use crate::mail::Classification;

pub use service::{ClassificationService, DEFAULT_MAX_SESSIONS};

/// Label suggested by automatic triage for a newly received mail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Triage {
    /// Suggested label, if triage produced one.
    pub label: Option<Classification>,
    /// Whether the suggestion is reliable enough to skip extraction for
    /// regular mail.
    pub trusted: bool,
}

impl Triage {
    /// A suggestion of `label`.
    #[must_use]
    pub const fn suggest(label: Classification) -> Self {
        Self {
            label: Some(label),
            trusted: false,
        }
    }

    /// Mark the suggestion as trusted.
    #[must_use]
    pub const fn trusted(mut self) -> Self {
        self.trusted = true;
        self
    }

    /// Whether extraction can be skipped for this mail.
    #[must_use]
    pub fn skips_extraction(&self) -> bool {
        self.trusted && self.label == Some(Classification::RegularMail)
    }
}

/// Side effect of a classification event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The label changed; nothing else happened.
    LabelOnly,
    /// The event was dropped, e.g. a proposal against a verified label.
    Ignored,
    /// A job status was extracted and written.
    JobRecorded {
        /// Record the status was written to.
        key: JobKey,
        /// Whether the record was new.
        outcome: UpsertOutcome,
    },
    /// Every extraction session failed.
    ExtractionFailed {
        /// Sessions run.
        sessions: usize,
        /// Failure kind of the last session.
        error: ExtractionError,
    },
    /// The job record this mail produced was deleted.
    JobRemoved {
        /// Deleted record.
        key: JobKey,
    },
    /// No record for the key contained this mail.
    JobNotFound {
        /// Key that was looked up.
        key: JobKey,
    },
    /// The job key to remove could not be determined.
    Unresolved,
    /// The job store failed.
    ReconcileFailed {
        /// Whether the failure was transient and persisted through retries.
        transient: bool,
    },
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LabelOnly => f.write_str("label updated"),
            Self::Ignored => f.write_str("no change"),
            Self::JobRecorded {
                key,
                outcome: UpsertOutcome::Created,
            } => write!(f, "job recorded: {key}"),
            Self::JobRecorded {
                key,
                outcome: UpsertOutcome::Updated,
            } => write!(f, "job updated: {key}"),
            Self::ExtractionFailed { sessions, error } => {
                write!(f, "extraction failed after {sessions} session(s): {error}")
            }
            Self::JobRemoved { key } => write!(f, "job removed: {key}"),
            Self::JobNotFound { key } => write!(f, "no job to remove for {key}"),
            Self::Unresolved => f.write_str("job to remove could not be determined"),
            Self::ReconcileFailed { transient: true } => {
                f.write_str("job store unavailable, try again later")
            }
            Self::ReconcileFailed { transient: false } => f.write_str("job store error"),
        }
    }
}
