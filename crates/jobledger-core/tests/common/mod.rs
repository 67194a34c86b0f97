//! Shared test doubles.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use jobledger_core::{
    ChatMessage, ChatModel, ClassificationService, ConsensusExtractor, Embed, JobReconciler,
    JobRepository, Mail, MailRepository, ModelError, Notifier,
};

/// Valid answer reporting `status` for Engineer at Acme.
pub fn answer(status: &str) -> Option<String> {
    Some(format!(
        r#"{{"status":"{status}","job":"Engineer","company":"Acme","link":"https://acme.io/jobs/1","jobId":"R-42"}}"#
    ))
}

/// Answer that is not JSON.
pub fn malformed() -> Option<String> {
    Some("I think this mail is about a job.".to_string())
}

/// A model that replays scripted answers in order. `None` entries, and calls
/// past the end of the script, fail as if the server were unreachable.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<Option<String>>>,
    calls: AtomicUsize,
    temperatures: Mutex<Vec<Option<f32>>>,
}

impl ScriptedModel {
    pub fn new(script: impl IntoIterator<Item = Option<String>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    /// The same answer for every call.
    pub fn repeating(answer: Option<String>, times: usize) -> Self {
        Self::new(std::iter::repeat_n(answer, times))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn temperatures(&self) -> Vec<Option<f32>> {
        self.temperatures.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

impl ChatModel for ScriptedModel {
    async fn send(
        &self,
        _messages: &[ChatMessage],
        _model: &str,
        temperature: Option<f32>,
    ) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.temperatures.lock().unwrap().push(temperature);
        let next = self.script.lock().unwrap().pop_front().flatten();
        next.ok_or(ModelError::EmptyResponse)
    }
}

/// A notifier that keeps every embed it is given.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Embed>>,
}

impl RecordingNotifier {
    pub fn titles(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|embed| embed.title.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    async fn notify(&self, embed: &Embed) -> jobledger_core::Result<()> {
        self.sent.lock().unwrap().push(embed.clone());
        Ok(())
    }
}

pub fn job_mail() -> Mail {
    Mail::new(
        "careers@acme.io",
        "me@example.com",
        "Thank you for applying to Acme",
        "We received your application for the Engineer position.",
        None,
        Utc::now(),
    )
    .unwrap()
}

pub fn regular_mail() -> Mail {
    Mail::new(
        "newsletter@shop.example",
        "me@example.com",
        "Weekly deals",
        "Everything is 20% off this week.",
        None,
        Utc::now(),
    )
    .unwrap()
}

pub type TestService = ClassificationService<Arc<ScriptedModel>, Arc<RecordingNotifier>>;

/// A service over in-memory stores sharing one pool.
pub async fn service(model: &Arc<ScriptedModel>, notifier: &Arc<RecordingNotifier>) -> TestService {
    let mails = MailRepository::in_memory().await.unwrap();
    let jobs = JobRepository::with_pool(mails.pool().clone()).await.unwrap();
    service_with(model, notifier, mails, jobs)
}

/// A service over the given stores.
pub fn service_with(
    model: &Arc<ScriptedModel>,
    notifier: &Arc<RecordingNotifier>,
    mails: MailRepository,
    jobs: JobRepository,
) -> TestService {
    ClassificationService::new(
        ConsensusExtractor::new(Arc::clone(model), "test-model"),
        JobReconciler::new(jobs),
        mails,
        Arc::clone(notifier),
    )
}
