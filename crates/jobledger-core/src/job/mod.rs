//! Tracked job applications.
//!
//! A job record is identified by the exact (title, company) pair the model
//! extracted. Records are created by the first mail reporting on a job,
//! updated by later ones, and removed when a human decides the mail that
//! produced them was not a job update after all.

mod model;
mod reconciler;
mod repository;

pub use model::{AppStatus, JobKey, JobRecord};
pub use reconciler::JobReconciler;
pub use repository::{JobRepository, StatusChange, UpsertOutcome};
