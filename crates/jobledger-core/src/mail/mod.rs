//! Mails and their classification state.
//!
//! A mail is identified by a SHA-256 digest of its sender, recipient, subject
//! and body text, so observing the same message twice (with different markup
//! or timestamps) yields the same record.

mod model;
mod repository;
pub mod text;

pub use model::{Classification, IncomingMail, Mail, MailHash};
pub(crate) use repository::parse_timestamp;
pub use repository::MailRepository;
