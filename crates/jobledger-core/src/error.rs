//! Error types for the core library.

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A mail could not be built from the given parts.
    #[error("Invalid mail: {0}")]
    InvalidMail(String),

    /// A stored timestamp could not be parsed.
    #[error("Invalid timestamp {value:?}: {source}")]
    Timestamp {
        /// The raw stored value.
        value: String,
        /// Parse failure.
        source: chrono::ParseError,
    },

    /// A stored row holds a value outside its domain.
    #[error("Invalid stored record: {0}")]
    InvalidRecord(String),

    /// A short id matched more than one mail.
    #[error("Short id {0} matches more than one mail")]
    AmbiguousId(String),

    /// Record not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether retrying the same operation later may succeed.
    ///
    /// Pool exhaustion, I/O failures and `SQLite` busy/locked conditions are
    /// transient. A closed pool, constraint violations, schema errors and
    /// decoding failures are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Database(err) => match err {
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
                sqlx::Error::Database(db) => db
                    .code()
                    .is_some_and(|code| matches!(code.as_ref(), "5" | "6" | "261" | "517")),
                _ => false,
            },
            Self::Io(_) => true,
            Self::Http(err) => err.is_timeout() || err.is_connect(),
            _ => false,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_transient() {
        assert!(Error::Database(sqlx::Error::PoolTimedOut).is_transient());
    }

    #[test]
    fn test_domain_errors_are_fatal() {
        assert!(!Error::InvalidMail("empty".into()).is_transient());
        assert!(!Error::NotFound("mail 1a2b".into()).is_transient());
        assert!(!Error::Database(sqlx::Error::RowNotFound).is_transient());
        assert!(!Error::Database(sqlx::Error::PoolClosed).is_transient());
    }
}
