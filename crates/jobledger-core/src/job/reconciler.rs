//! Applies extraction results to the job store.

use chrono::Utc;
use tracing::{info, warn};

use super::model::JobKey;
use super::repository::{JobRepository, StatusChange, UpsertOutcome};
use crate::Result;
use crate::extract::StatusCandidate;
use crate::mail::{Mail, MailHash};

/// Keeps job records in step with extracted status changes.
#[derive(Debug, Clone)]
pub struct JobReconciler {
    jobs: JobRepository,
}

impl JobReconciler {
    /// Create a reconciler writing to `jobs`.
    #[must_use]
    pub const fn new(jobs: JobRepository) -> Self {
        Self { jobs }
    }

    /// The underlying job store.
    #[must_use]
    pub const fn jobs(&self) -> &JobRepository {
        &self.jobs
    }

    /// Record the status a mail reported.
    ///
    /// An existing record for the same (title, company) gets the new status, a
    /// fresh `last_updated` and the mail's hash. Repeating an identical status
    /// still rewrites `last_updated`. Otherwise a new record is created.
    ///
    /// # Errors
    ///
    /// Returns an error if the job store fails.
    pub async fn upsert(&self, candidate: &StatusCandidate, mail: &Mail) -> Result<UpsertOutcome> {
        let key = candidate.key();
        let outcome = self
            .jobs
            .record(&StatusChange {
                key: &key,
                status: candidate.status,
                job_id: candidate.job_id.as_deref(),
                link: candidate.link.as_deref(),
                mail_hash: &mail.hash,
                at: Utc::now(),
            })
            .await?;

        match outcome {
            UpsertOutcome::Created => info!(job = %key, status = %candidate.status, "Job status inserted"),
            UpsertOutcome::Updated => info!(job = %key, status = %candidate.status, "Job status updated"),
        }
        Ok(outcome)
    }

    /// Remove the record for `key`.
    ///
    /// With `mail_hash`, only a record that this mail contributed to is removed.
    /// A missing record is logged and treated as a no-op. Returns whether a
    /// record was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the job store fails.
    pub async fn delete(&self, key: &JobKey, mail_hash: Option<&MailHash>) -> Result<bool> {
        let removed = self.jobs.delete(key, mail_hash).await?;
        if removed {
            info!(job = %key, "Job deleted");
        } else {
            warn!(job = %key, "No matching job to delete");
        }
        Ok(removed)
    }
}
