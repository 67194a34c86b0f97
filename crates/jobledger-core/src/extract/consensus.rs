//! Repeated model queries collapsed into one answer by majority vote.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use super::candidate::{ExtractionError, StatusCandidate, parse_response};
use super::prompt::build_messages;
use super::vote::aggregate;
use crate::mail::Mail;
use crate::model::{ChatMessage, ChatModel, ModelError};

/// Default number of agreeing answers required.
pub const DEFAULT_QUORUM: usize = 6;
/// Default number of failed answers tolerated; one more ends the session.
pub const DEFAULT_ERROR_CAP: usize = 3;

/// Limits for one extraction session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsensusPolicy {
    /// Successful answers needed before voting.
    pub quorum: usize,
    /// Failures tolerated; exceeding this ends the session with an error.
    pub error_cap: usize,
    /// Upper bound for a single model call.
    pub query_timeout: Option<Duration>,
    /// Upper bound for the whole session.
    pub session_deadline: Option<Duration>,
}

impl Default for ConsensusPolicy {
    fn default() -> Self {
        Self {
            quorum: DEFAULT_QUORUM,
            error_cap: DEFAULT_ERROR_CAP,
            query_timeout: None,
            session_deadline: None,
        }
    }
}

impl ConsensusPolicy {
    /// Most model calls a session can make.
    #[must_use]
    pub const fn max_attempts(&self) -> usize {
        self.quorum + self.error_cap + 1
    }
}

/// Per-call bookkeeping, dropped once a terminal result is produced.
#[derive(Debug, Default)]
struct ExtractionSession {
    successes: Vec<StatusCandidate>,
    errors: Vec<ExtractionError>,
    attempts: usize,
}

/// Extracts a job status from a mail by polling the model until a quorum of
/// valid answers agrees or too many attempts fail.
#[derive(Debug, Clone)]
pub struct ConsensusExtractor<M> {
    client: M,
    model: String,
    policy: ConsensusPolicy,
}

impl<M: ChatModel> ConsensusExtractor<M> {
    /// Create an extractor querying `model` through `client` with the default policy.
    #[must_use]
    pub fn new(client: M, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            policy: ConsensusPolicy::default(),
        }
    }

    /// Replace the session limits. A quorum below one is raised to one.
    #[must_use]
    pub fn with_policy(mut self, policy: ConsensusPolicy) -> Self {
        self.policy = ConsensusPolicy {
            quorum: policy.quorum.max(1),
            ..policy
        };
        self
    }

    /// The model client.
    #[must_use]
    pub const fn client(&self) -> &M {
        &self.client
    }

    /// The session limits in use.
    #[must_use]
    pub const fn policy(&self) -> &ConsensusPolicy {
        &self.policy
    }

    /// Run one extraction session for `mail`.
    ///
    /// Every iteration adds exactly one success or one error, so the session
    /// ends after at most [`ConsensusPolicy::max_attempts`] model calls.
    ///
    /// # Errors
    ///
    /// Returns the majority failure kind once failures exceed the error cap,
    /// or when the session deadline passes.
    pub async fn extract(&self, mail: &Mail) -> Result<StatusCandidate, ExtractionError> {
        let started = Instant::now();
        let messages = build_messages(mail);
        let mut session = ExtractionSession::default();

        loop {
            if session.errors.len() > self.policy.error_cap {
                warn!(
                    mail = %mail.hash.short_id(),
                    attempts = session.attempts,
                    successes = session.successes.len(),
                    errors = session.errors.len(),
                    "Unable to extract job status"
                );
                return Err(aggregate(&session.errors).unwrap_or(ExtractionError::TransportFailure));
            }

            if session.successes.len() >= self.policy.quorum {
                if let Some(candidate) = aggregate(&session.successes) {
                    debug!(
                        mail = %mail.hash.short_id(),
                        attempts = session.attempts,
                        errors = session.errors.len(),
                        job = %candidate.key(),
                        status = %candidate.status,
                        "Extraction reached quorum"
                    );
                    return Ok(candidate);
                }
            }

            if let Some(deadline) = self.policy.session_deadline {
                if started.elapsed() >= deadline {
                    warn!(
                        mail = %mail.hash.short_id(),
                        attempts = session.attempts,
                        "Extraction session deadline passed"
                    );
                    return Err(aggregate(&session.errors).unwrap_or(ExtractionError::TransportFailure));
                }
            }

            // Only the answer that can close the quorum is sampled deterministically
            let temperature = (session.successes.len() + 1 == self.policy.quorum).then_some(0.0);

            session.attempts += 1;
            debug!(
                mail = %mail.hash.short_id(),
                attempt = session.attempts,
                ?temperature,
                "Querying model for job status"
            );

            match self.query(&messages, temperature).await.and_then(|answer| {
                parse_response(&answer).inspect_err(|kind| {
                    debug!(%kind, answer = %answer, "Rejected model answer");
                })
            }) {
                Ok(candidate) => session.successes.push(candidate),
                Err(kind) => session.errors.push(kind),
            }
        }
    }

    async fn query(
        &self,
        messages: &[ChatMessage],
        temperature: Option<f32>,
    ) -> Result<String, ExtractionError> {
        let request = self.client.send(messages, &self.model, temperature);
        let result = match self.policy.query_timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .unwrap_or(Err(ModelError::Timeout)),
            None => request.await,
        };

        result.map_err(|err| {
            debug!(error = %err, "Model query failed");
            ExtractionError::TransportFailure
        })
    }
}
