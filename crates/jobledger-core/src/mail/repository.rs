//! Mail repository keyed by content hash.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use super::model::{Classification, Mail, MailHash};
use crate::job::JobKey;
use crate::{Error, Result};

const MAIL_COLUMNS: &str = "hash, sender, recipient, subject, body_text, body_html, received_at, \
                            classification, verified, parsed, job_title, job_company";

/// Repository for observed mails and their classification state.
#[derive(Debug, Clone)]
pub struct MailRepository {
    pool: SqlitePool,
}

impl MailRepository {
    /// Create a new repository with the given database path.
    ///
    /// Creates the database and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;
        Self::with_pool(pool).await
    }

    /// Create an in-memory repository for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    /// Create a repository on an existing pool, sharing it with other repositories.
    ///
    /// # Errors
    ///
    /// Returns an error if schema creation fails.
    pub async fn with_pool(pool: SqlitePool) -> Result<Self> {
        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// The connection pool, for repositories sharing the same database.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS mails (
                hash TEXT PRIMARY KEY NOT NULL,
                sender TEXT NOT NULL,
                recipient TEXT NOT NULL,
                subject TEXT NOT NULL,
                body_text TEXT NOT NULL,
                body_html TEXT,
                received_at TEXT NOT NULL,
                classification TEXT NOT NULL DEFAULT 'Unknown',
                verified INTEGER NOT NULL DEFAULT 0,
                parsed INTEGER NOT NULL DEFAULT 0,
                job_title TEXT,
                job_company TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        // Index for the pending-confirmation listing
        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_mails_unverified
            ON mails(received_at) WHERE verified = 0
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get a mail by its full hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or a stored row is malformed.
    pub async fn find_by_hash(&self, hash: &MailHash) -> Result<Option<Mail>> {
        let row = sqlx::query(&format!("SELECT {MAIL_COLUMNS} FROM mails WHERE hash = ?"))
            .bind(hash.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_mail).transpose()
    }

    /// Get a mail by its short display id (`8-4-4-4`, dashes optional).
    ///
    /// # Errors
    ///
    /// Returns [`Error::AmbiguousId`] if the id prefixes more than one stored
    /// hash, or an error if the database query fails.
    pub async fn find_by_short_id(&self, short_id: &str) -> Result<Option<Mail>> {
        let prefix: String = short_id
            .chars()
            .filter(|c| *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(None);
        }

        let rows = sqlx::query(&format!(
            "SELECT {MAIL_COLUMNS} FROM mails WHERE substr(hash, 1, ?) = ? LIMIT 2"
        ))
        .bind(i64::try_from(prefix.len()).unwrap_or(i64::MAX))
        .bind(&prefix)
        .fetch_all(&self.pool)
        .await?;

        match rows.as_slice() {
            [] => Ok(None),
            [row] => row_to_mail(row).map(Some),
            _ => Err(Error::AmbiguousId(short_id.to_string())),
        }
    }

    /// Insert a mail or update the stored copy.
    ///
    /// Re-saving never creates a duplicate. If the stored copy carries a
    /// human-verified label, that label and the verified flag are kept and the
    /// incoming classification is ignored. A stored `parsed` flag and job link
    /// are never cleared by this call.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn save(&self, mail: &Mail) -> Result<()> {
        self.upsert(mail, false).await
    }

    /// Insert or update a mail whose label was just confirmed by a human.
    ///
    /// The incoming classification, verified flag and extraction state always
    /// win, so this is also how a removed job link is cleared.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn save_confirmed(&self, mail: &Mail) -> Result<()> {
        self.upsert(mail, true).await
    }

    async fn upsert(&self, mail: &Mail, confirmed: bool) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO mails
                (hash, sender, recipient, subject, body_text, body_html, received_at,
                 classification, verified, parsed, job_title, job_company)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(hash) DO UPDATE SET
                body_html = COALESCE(excluded.body_html, mails.body_html),
                classification = CASE
                    WHEN mails.verified = 1 AND ?13 = 0 THEN mails.classification
                    ELSE excluded.classification
                END,
                verified = CASE
                    WHEN mails.verified = 1 AND ?13 = 0 THEN 1
                    ELSE excluded.verified
                END,
                parsed = CASE
                    WHEN ?13 = 0 THEN MAX(mails.parsed, excluded.parsed)
                    ELSE excluded.parsed
                END,
                job_title = CASE
                    WHEN ?13 = 0 AND excluded.job_title IS NULL THEN mails.job_title
                    ELSE excluded.job_title
                END,
                job_company = CASE
                    WHEN ?13 = 0 AND excluded.job_title IS NULL THEN mails.job_company
                    ELSE excluded.job_company
                END,
                updated_at = CURRENT_TIMESTAMP
            ",
        )
        .bind(mail.hash.as_str())
        .bind(&mail.from)
        .bind(&mail.to)
        .bind(&mail.subject)
        .bind(&mail.text)
        .bind(&mail.html)
        .bind(mail.received_at.to_rfc3339())
        .bind(mail.classification.as_str())
        .bind(mail.verified)
        .bind(mail.parsed)
        .bind(mail.job.as_ref().map(|k| k.title.as_str()))
        .bind(mail.job.as_ref().map(|k| k.company.as_str()))
        .bind(confirmed)
        .execute(&self.pool)
        .await?;

        tracing::debug!(hash = %mail.hash, confirmed, "Saved mail");
        Ok(())
    }

    /// Get mails still waiting for a human confirmation, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or a stored row is malformed.
    pub async fn list_unverified(&self, limit: u32) -> Result<Vec<Mail>> {
        let rows = sqlx::query(&format!(
            "SELECT {MAIL_COLUMNS} FROM mails WHERE verified = 0 ORDER BY received_at ASC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_mail).collect()
    }

    /// Count stored mails.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mails")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

/// Parse an RFC 3339 timestamp column.
pub(crate) fn parse_timestamp(value: String) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|source| Error::Timestamp { value, source })
}

/// Convert a database row to a `Mail`.
fn row_to_mail(row: &sqlx::sqlite::SqliteRow) -> Result<Mail> {
    let job_title: Option<String> = row.get("job_title");
    let job_company: Option<String> = row.get("job_company");

    Ok(Mail {
        hash: MailHash::from_hex(row.get::<String, _>("hash")),
        from: row.get("sender"),
        to: row.get("recipient"),
        subject: row.get("subject"),
        text: row.get("body_text"),
        html: row.get("body_html"),
        received_at: parse_timestamp(row.get("received_at"))?,
        classification: Classification::parse(row.get("classification")),
        verified: row.get("verified"),
        parsed: row.get("parsed"),
        job: job_title
            .zip(job_company)
            .map(|(title, company)| JobKey { title, company }),
    })
}
