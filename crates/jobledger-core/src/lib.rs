//! # jobledger-core
//!
//! Core logic for `JobLedger`, a job-application tracker fed by email.
//!
//! This crate provides:
//! - Mail identity, text clean-up and storage (`SQLite`)
//! - **Consensus extraction** - repeated model queries merged by per-field
//!   majority vote into one job status
//! - **Classification state machine** - human-confirmed labels drive job
//!   record creation and removal
//! - Job record storage and reconciliation
//! - Ollama chat client and Discord webhook notifications
//! - Configuration

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod classify;
pub mod config;
mod error;
pub mod extract;
pub mod job;
pub mod mail;
pub mod model;
pub mod notify;

pub use classify::{ClassificationService, Transition, Triage};
pub use config::Config;
pub use error::{Error, Result};
pub use extract::{
    ConsensusExtractor, ConsensusPolicy, ExtractionError, FieldVote, StatusCandidate, aggregate,
};
pub use job::{AppStatus, JobKey, JobReconciler, JobRecord, JobRepository, UpsertOutcome};
pub use mail::{Classification, IncomingMail, Mail, MailHash, MailRepository};
pub use model::{ChatMessage, ChatModel, ModelError, OllamaClient};
pub use notify::{AnyNotifier, Embed, NoopNotifier, Notifier, WebhookNotifier};
