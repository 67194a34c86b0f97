//! Classification events and their effect on job records.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::{Transition, Triage};
use crate::extract::{ConsensusExtractor, ExtractionError, StatusCandidate};
use crate::job::JobReconciler;
use crate::mail::{Classification, Mail, MailRepository};
use crate::model::ChatModel;
use crate::notify::{Embed, Notifier, classification_embed, job_update_embed, mail_embed};

/// Extraction sessions run for one confirmed job update before giving up.
pub const DEFAULT_MAX_SESSIONS: usize = 10;

/// Attempts made for a job store write that keeps failing transiently.
const STORE_ATTEMPTS: u32 = 3;

/// Pause before the first retry of a job store write; grows linearly.
const STORE_BACKOFF: Duration = Duration::from_millis(100);

/// Applies classification events to mails and keeps job records in step.
///
/// Failures of the model, the stores or the notifier are logged and reported
/// through the returned [`Transition`]; none of them are propagated.
#[derive(Debug)]
pub struct ClassificationService<M, N> {
    extractor: ConsensusExtractor<M>,
    reconciler: JobReconciler,
    mails: MailRepository,
    notifier: N,
    max_sessions: usize,
}

impl<M: ChatModel, N: Notifier> ClassificationService<M, N> {
    /// Create a service from its collaborators.
    #[must_use]
    pub const fn new(
        extractor: ConsensusExtractor<M>,
        reconciler: JobReconciler,
        mails: MailRepository,
        notifier: N,
    ) -> Self {
        Self {
            extractor,
            reconciler,
            mails,
            notifier,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }

    /// Set how many extraction sessions a confirmation may run (at least one).
    #[must_use]
    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }

    /// The extractor.
    #[must_use]
    pub const fn extractor(&self) -> &ConsensusExtractor<M> {
        &self.extractor
    }

    /// The job reconciler.
    #[must_use]
    pub const fn reconciler(&self) -> &JobReconciler {
        &self.reconciler
    }

    /// The mail store.
    #[must_use]
    pub const fn mails(&self) -> &MailRepository {
        &self.mails
    }

    /// The notification sink.
    #[must_use]
    pub const fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Apply an unverified label, e.g. from automatic triage.
    ///
    /// A verified label is never overwritten. Never extracts or touches job
    /// records.
    pub async fn propose(&self, mail: &mut Mail, label: Classification) -> Transition {
        if mail.verified {
            debug!(
                mail = %mail.short_id(),
                current = %mail.classification,
                proposed = %label,
                "Proposal ignored for verified mail"
            );
            return Transition::Ignored;
        }

        mail.classification = label;
        self.persist(mail).await;
        Transition::LabelOnly
    }

    /// Apply a human-confirmed label.
    ///
    /// Confirming a job update for a mail not yet parsed runs extraction until
    /// it succeeds or the session limit is reached, then records the result.
    /// Confirming regular mail for a parsed job update deletes the job record
    /// the mail contributed to.
    pub async fn confirm(&self, mail: &mut Mail, label: Classification) -> Transition {
        let previous = mail.classification;
        mail.classification = label;
        mail.verified = true;
        info!(mail = %mail, %previous, confirmed = %label, "Mail classification confirmed");

        let transition = match (previous, label) {
            (previous, Classification::JobUpdate)
                if previous != Classification::JobUpdate && !mail.parsed =>
            {
                self.record_with_retries(mail).await
            }
            (Classification::JobUpdate, Classification::RegularMail) if mail.parsed => {
                self.remove_job(mail).await
            }
            _ => Transition::LabelOnly,
        };

        if let Err(err) = self.mails.save_confirmed(mail).await {
            error!(mail = %mail.short_id(), error = %err, "Failed to save confirmed mail");
        }

        let title = format!("Mail classified as {}", label.display_name());
        self.send(&classification_embed(mail, &title)).await;

        transition
    }

    /// Handle a newly received mail.
    ///
    /// Restores the stored state of a mail seen before, applies the triage
    /// label, announces the mail and, unless triage trusts it to be regular
    /// mail, runs one extraction session.
    pub async fn ingest(&self, mail: &mut Mail, triage: Triage) -> Transition {
        info!(mail = %mail, "New mail received");

        match self.mails.find_by_hash(&mail.hash).await {
            Ok(Some(stored)) => {
                debug!(mail = %mail.short_id(), "Mail already known, restoring state");
                mail.classification = stored.classification;
                mail.verified = stored.verified;
                mail.parsed = stored.parsed;
                mail.job = stored.job;
            }
            Ok(None) => self.persist(mail).await,
            Err(err) => {
                error!(mail = %mail.short_id(), error = %err, "Failed to look up mail");
            }
        }

        let proposed = match triage.label {
            Some(label) => self.propose(mail, label).await,
            None => Transition::Ignored,
        };

        self.send(&mail_embed(mail, "Is this a job update?")).await;

        if triage.skips_extraction() {
            debug!(mail = %mail.short_id(), "Trusted regular mail, skipping extraction");
            return proposed;
        }

        self.parse_for_job_status(mail).await
    }

    /// One extraction session for a mail that is not yet parsed.
    async fn parse_for_job_status(&self, mail: &mut Mail) -> Transition {
        if mail.parsed {
            debug!(mail = %mail.short_id(), "Mail already parsed");
            return Transition::Ignored;
        }

        debug!(mail = %mail, "Parsing for job status");
        let candidate = match self.extractor.extract(mail).await {
            Ok(candidate) => candidate,
            Err(kind) => {
                warn!(mail = %mail, error = %kind, "Failed to parse mail for job status");
                return Transition::ExtractionFailed {
                    sessions: 1,
                    error: kind,
                };
            }
        };

        if mail.verified && mail.classification != Classification::JobUpdate {
            debug!(
                mail = %mail.short_id(),
                job = %candidate.key(),
                "Mail confirmed as {}, not recording job",
                mail.classification.display_name()
            );
            return Transition::Ignored;
        }

        let transition = self.record(mail, &candidate).await;
        self.persist(mail).await;
        transition
    }

    async fn record_with_retries(&self, mail: &mut Mail) -> Transition {
        let mut last_error = ExtractionError::TransportFailure;

        for session in 1..=self.max_sessions {
            match self.extractor.extract(mail).await {
                Ok(candidate) => {
                    info!(mail = %mail, session, "Mail parsed for job status");
                    return self.record(mail, &candidate).await;
                }
                Err(kind) => {
                    warn!(mail = %mail, session, error = %kind, "Failed to parse mail for job status");
                    last_error = kind;
                }
            }
        }

        error!(
            mail = %mail,
            sessions = self.max_sessions,
            "Giving up on job status extraction"
        );
        Transition::ExtractionFailed {
            sessions: self.max_sessions,
            error: last_error,
        }
    }

    /// Write `candidate` and link the mail to the job.
    async fn record(&self, mail: &mut Mail, candidate: &StatusCandidate) -> Transition {
        let source: &Mail = mail;
        let written = retry_store("Recording job status", move || {
            self.reconciler.upsert(candidate, source)
        })
        .await;

        match written {
            Ok(outcome) => {
                mail.parsed = true;
                mail.job = Some(candidate.key());
                self.send(&job_update_embed(candidate, mail)).await;
                Transition::JobRecorded {
                    key: candidate.key(),
                    outcome,
                }
            }
            Err(err) => {
                let transient = err.is_transient();
                if transient {
                    warn!(mail = %mail.short_id(), job = %candidate.key(), error = %err, "Job store busy, job status not recorded");
                } else {
                    error!(mail = %mail.short_id(), job = %candidate.key(), error = %err, "Failed to record job status");
                }
                Transition::ReconcileFailed { transient }
            }
        }
    }

    /// Delete the job record a parsed mail contributed to.
    async fn remove_job(&self, mail: &mut Mail) -> Transition {
        let key = match mail.job.clone() {
            Some(key) => key,
            None => match self.extractor.extract(mail).await {
                Ok(candidate) => candidate.key(),
                Err(kind) => {
                    warn!(mail = %mail, error = %kind, "Unable to resolve job to remove");
                    return Transition::Unresolved;
                }
            },
        };

        info!(mail = %mail, job = %key, "Mail classified as Regular Mail, deleting job");
        let (job, hash) = (&key, &mail.hash);
        let removed = retry_store("Deleting job", move || {
            self.reconciler.delete(job, Some(hash))
        })
        .await;

        match removed {
            Ok(true) => {
                mail.parsed = false;
                mail.job = None;
                Transition::JobRemoved { key }
            }
            Ok(false) => Transition::JobNotFound { key },
            Err(err) => {
                let transient = err.is_transient();
                if transient {
                    warn!(mail = %mail.short_id(), job = %key, error = %err, "Job store busy, job not deleted");
                } else {
                    error!(mail = %mail.short_id(), job = %key, error = %err, "Failed to delete job");
                }
                Transition::ReconcileFailed { transient }
            }
        }
    }

    async fn persist(&self, mail: &Mail) {
        if let Err(err) = self.mails.save(mail).await {
            error!(mail = %mail.short_id(), error = %err, "Failed to save mail");
        }
    }

    async fn send(&self, embed: &Embed) {
        if let Err(err) = self.notifier.notify(embed).await {
            warn!(title = %embed.title, error = %err, "Failed to send notification");
        }
    }
}

/// Run a job store operation, retrying while it fails transiently.
async fn retry_store<T, F, Fut>(what: &str, mut op: F) -> crate::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(err) if err.is_transient() && attempt < STORE_ATTEMPTS => {
                warn!(attempt, error = %err, "{what} failed, retrying");
                tokio::time::sleep(STORE_BACKOFF * attempt).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::job::JobRepository;
    use crate::model::{ChatMessage, ModelError};
    use crate::notify::NoopNotifier;
    use crate::Error;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Model that is never reachable.
    struct Offline;

    impl ChatModel for Offline {
        async fn send(
            &self,
            _messages: &[ChatMessage],
            _model: &str,
            _temperature: Option<f32>,
        ) -> Result<String, ModelError> {
            Err(ModelError::Timeout)
        }
    }

    async fn service() -> ClassificationService<Offline, NoopNotifier> {
        let mails = MailRepository::in_memory().await.unwrap();
        let jobs = JobRepository::in_memory().await.unwrap();
        ClassificationService::new(
            ConsensusExtractor::new(Offline, "test"),
            JobReconciler::new(jobs),
            mails,
            NoopNotifier,
        )
    }

    fn mail() -> Mail {
        Mail::new("hr@acme.io", "me@example.com", "Hello", "Just saying hi", None, Utc::now())
            .unwrap()
    }

    #[tokio::test]
    async fn test_propose_sets_unverified_label() {
        let service = service().await;
        let mut mail = mail();

        let transition = service.propose(&mut mail, Classification::JobUpdate).await;

        assert_eq!(transition, Transition::LabelOnly);
        assert_eq!(mail.classification, Classification::JobUpdate);
        assert!(!mail.verified);
        let stored = service.mails().find_by_hash(&mail.hash).await.unwrap().unwrap();
        assert_eq!(stored.classification, Classification::JobUpdate);
    }

    #[tokio::test]
    async fn test_confirm_regular_mail_is_label_only() {
        let service = service().await;
        let mut mail = mail();

        let transition = service.confirm(&mut mail, Classification::RegularMail).await;

        assert_eq!(transition, Transition::LabelOnly);
        assert!(mail.verified);
        let stored = service.mails().find_by_hash(&mail.hash).await.unwrap().unwrap();
        assert_eq!(stored.classification, Classification::RegularMail);
        assert!(stored.verified);
    }

    #[tokio::test]
    async fn test_confirm_job_update_respects_session_limit() {
        let service = service().await.with_max_sessions(2);
        let mut mail = mail();

        let transition = service.confirm(&mut mail, Classification::JobUpdate).await;

        assert_eq!(
            transition,
            Transition::ExtractionFailed {
                sessions: 2,
                error: ExtractionError::TransportFailure
            }
        );
        assert!(!mail.parsed);
        assert!(mail.job.is_none());
    }

    #[tokio::test]
    async fn test_removal_without_cached_key_unresolved_when_model_down() {
        let service = service().await;
        let mut mail = mail();
        mail.classification = Classification::JobUpdate;
        mail.verified = true;
        mail.parsed = true;

        let transition = service.confirm(&mut mail, Classification::RegularMail).await;

        assert_eq!(transition, Transition::Unresolved);
        assert!(mail.parsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_retries_transient_failures() {
        let calls = AtomicU32::new(0);

        let result: crate::Result<()> = retry_store("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Database(sqlx::Error::PoolTimedOut)) }
        })
        .await;

        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), STORE_ATTEMPTS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_recovers_after_transient_failure() {
        let calls = AtomicU32::new(0);

        let result = retry_store("test", || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(Error::Database(sqlx::Error::PoolTimedOut))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_store_gives_up_on_fatal_failure() {
        let calls = AtomicU32::new(0);

        let result: crate::Result<()> = retry_store("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Database(sqlx::Error::RowNotFound)) }
        })
        .await;

        assert!(!result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
