//! Job status extraction.
//!
//! A mail is sent to the model repeatedly. Each answer is validated into a
//! [`StatusCandidate`] or an [`ExtractionError`], and the session result is
//! the per-field majority of whichever side reached its limit first.

mod candidate;
mod consensus;
mod prompt;
mod vote;

pub use candidate::{ExtractionError, NOT_APPLICABLE_MARKER, StatusCandidate, parse_response};
pub use consensus::{ConsensusExtractor, ConsensusPolicy, DEFAULT_ERROR_CAP, DEFAULT_QUORUM};
pub use prompt::{build_messages, schema_instruction, task_instruction};
pub use vote::{FieldVote, aggregate, majority};
