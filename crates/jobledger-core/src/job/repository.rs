//! Job repository keyed by exact (title, company).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use super::model::{AppStatus, JobKey, JobRecord};
use crate::mail::{MailHash, parse_timestamp};
use crate::{Error, Result};

/// Whether a write created a record or updated an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No record existed for the key; one was inserted.
    Created,
    /// The existing record was updated.
    Updated,
}

/// Fields written for one observed status change.
#[derive(Debug, Clone)]
pub struct StatusChange<'a> {
    /// Record identity.
    pub key: &'a JobKey,
    /// New status.
    pub status: AppStatus,
    /// Posting id, stored only when the record is created.
    pub job_id: Option<&'a str>,
    /// Posting link, stored only when the record is created.
    pub link: Option<&'a str>,
    /// Mail that reported the change.
    pub mail_hash: &'a MailHash,
    /// Write time.
    pub at: DateTime<Utc>,
}

/// Repository for tracked job applications.
#[derive(Debug, Clone)]
pub struct JobRepository {
    pool: SqlitePool,
}

impl JobRepository {
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

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                company TEXT NOT NULL,
                status TEXT NOT NULL,
                job_id TEXT,
                link TEXT,
                created_at TEXT NOT NULL,
                last_updated TEXT NOT NULL,
                UNIQUE(title, company)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS job_mail_hashes (
                job INTEGER NOT NULL,
                mail_hash TEXT NOT NULL,
                PRIMARY KEY (job, mail_hash)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        // Index for resolving a mail back to its job
        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_job_mail_hashes_hash
            ON job_mail_hashes(mail_hash)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get a job by its exact key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or a stored row is malformed.
    pub async fn find(&self, key: &JobKey) -> Result<Option<JobRecord>> {
        let row = sqlx::query(
            r"
            SELECT id, title, company, status, job_id, link, created_at, last_updated
            FROM jobs
            WHERE title = ? AND company = ?
            ",
        )
        .bind(&key.title)
        .bind(&key.company)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.load(&row).await?)),
            None => Ok(None),
        }
    }

    /// Record a status change for a job.
    ///
    /// Updates status and `last_updated` of an existing record, or inserts a
    /// new one, then adds the mail hash to the record's hash set. Runs in one
    /// transaction so concurrent writers to the same key serialize.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn record(&self, change: &StatusChange<'_>) -> Result<UpsertOutcome> {
        let mut tx = self.pool.begin().await?;
        let at = change.at.to_rfc3339();

        // Write first so the transaction holds the lock before reading back the id
        let updated = sqlx::query(
            r"
            UPDATE jobs
            SET status = ?, last_updated = ?
            WHERE title = ? AND company = ?
            ",
        )
        .bind(change.status.as_str())
        .bind(&at)
        .bind(&change.key.title)
        .bind(&change.key.company)
        .execute(&mut *tx)
        .await?;

        let outcome = if updated.rows_affected() == 0 {
            sqlx::query(
                r"
                INSERT INTO jobs (title, company, status, job_id, link, created_at, last_updated)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(&change.key.title)
            .bind(&change.key.company)
            .bind(change.status.as_str())
            .bind(change.job_id)
            .bind(change.link)
            .bind(&at)
            .bind(&at)
            .execute(&mut *tx)
            .await?;
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Updated
        };

        sqlx::query(
            r"
            INSERT OR IGNORE INTO job_mail_hashes (job, mail_hash)
            SELECT id, ? FROM jobs WHERE title = ? AND company = ?
            ",
        )
        .bind(change.mail_hash.as_str())
        .bind(&change.key.title)
        .bind(&change.key.company)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(outcome)
    }

    /// Delete a job and its hash set.
    ///
    /// With `mail_hash`, the record is only deleted if that hash is one of its
    /// contributing mails. Returns whether a record was deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn delete(&self, key: &JobKey, mail_hash: Option<&MailHash>) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        // Write first so the transaction holds the write lock from the start
        let id: Option<i64> = sqlx::query_scalar(
            r"
            DELETE FROM jobs
            WHERE title = ? AND company = ?
              AND (?3 IS NULL OR EXISTS (
                  SELECT 1 FROM job_mail_hashes
                  WHERE job_mail_hashes.job = jobs.id AND mail_hash = ?3
              ))
            RETURNING id
            ",
        )
        .bind(&key.title)
        .bind(&key.company)
        .bind(mail_hash.map(MailHash::as_str))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(id) = id else {
            return Ok(false);
        };

        sqlx::query("DELETE FROM job_mail_hashes WHERE job = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Get one page of jobs, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or a stored row is malformed.
    pub async fn list(&self, page: u32, page_size: u32) -> Result<Vec<JobRecord>> {
        let rows = sqlx::query(
            r"
            SELECT id, title, company, status, job_id, link, created_at, last_updated
            FROM jobs
            ORDER BY last_updated DESC, id DESC
            LIMIT ? OFFSET ?
            ",
        )
        .bind(page_size)
        .bind(i64::from(page) * i64::from(page_size))
        .fetch_all(&self.pool)
        .await?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in &rows {
            jobs.push(self.load(row).await?);
        }
        Ok(jobs)
    }

    /// Count tracked jobs.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Get the most recently updated job.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails or a stored row is malformed.
    pub async fn latest(&self) -> Result<Option<JobRecord>> {
        Ok(self.list(0, 1).await?.into_iter().next())
    }

    /// Build a `JobRecord` from a row, loading its hash set.
    async fn load(&self, row: &sqlx::sqlite::SqliteRow) -> Result<JobRecord> {
        let id: i64 = row.get("id");
        let hashes: Vec<String> =
            sqlx::query_scalar("SELECT mail_hash FROM job_mail_hashes WHERE job = ?")
                .bind(id)
                .fetch_all(&self.pool)
                .await?;

        let status: String = row.get("status");
        Ok(JobRecord {
            id: Some(id),
            key: JobKey {
                title: row.get("title"),
                company: row.get("company"),
            },
            status: AppStatus::parse(&status)
                .ok_or_else(|| Error::InvalidRecord(format!("unknown job status {status:?}")))?,
            job_id: row.get("job_id"),
            link: row.get("link"),
            created_at: parse_timestamp(row.get("created_at"))?,
            last_updated: parse_timestamp(row.get("last_updated"))?,
            mail_hashes: hashes.into_iter().map(MailHash::from_hex).collect::<BTreeSet<_>>(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn change<'a>(
        key: &'a JobKey,
        status: AppStatus,
        hash: &'a MailHash,
        at: DateTime<Utc>,
    ) -> StatusChange<'a> {
        StatusChange {
            key,
            status,
            job_id: Some("R-42"),
            link: None,
            mail_hash: hash,
            at,
        }
    }

    #[tokio::test]
    async fn test_record_creates_then_updates() {
        let repo = JobRepository::in_memory().await.unwrap();
        let key = JobKey::new("Engineer", "Acme");
        let first = MailHash::from_hex("aa");
        let second = MailHash::from_hex("bb");

        let created = repo
            .record(&change(&key, AppStatus::Applied, &first, t(0)))
            .await
            .unwrap();
        let updated = repo
            .record(&change(&key, AppStatus::Interview, &second, t(60)))
            .await
            .unwrap();

        assert_eq!(created, UpsertOutcome::Created);
        assert_eq!(updated, UpsertOutcome::Updated);

        let job = repo.find(&key).await.unwrap().unwrap();
        assert_eq!(job.status, AppStatus::Interview);
        assert_eq!(job.created_at, t(0));
        assert_eq!(job.last_updated, t(60));
        assert_eq!(job.job_id.as_deref(), Some("R-42"));
        assert_eq!(job.mail_hashes.len(), 2);
    }

    #[tokio::test]
    async fn test_record_same_mail_twice_keeps_one_hash() {
        let repo = JobRepository::in_memory().await.unwrap();
        let key = JobKey::new("Engineer", "Acme");
        let hash = MailHash::from_hex("aa");

        repo.record(&change(&key, AppStatus::Applied, &hash, t(0)))
            .await
            .unwrap();
        repo.record(&change(&key, AppStatus::Applied, &hash, t(10)))
            .await
            .unwrap();

        assert_eq!(repo.count().await.unwrap(), 1);
        let job = repo.find(&key).await.unwrap().unwrap();
        assert_eq!(job.mail_hashes.len(), 1);
        // Identical status still rewrites the timestamp
        assert_eq!(job.last_updated, t(10));
    }

    #[tokio::test]
    async fn test_key_is_exact_match() {
        let repo = JobRepository::in_memory().await.unwrap();
        let hash = MailHash::from_hex("aa");

        repo.record(&change(&JobKey::new("Engineer", "Acme"), AppStatus::Applied, &hash, t(0)))
            .await
            .unwrap();
        repo.record(&change(&JobKey::new("engineer", "Acme"), AppStatus::Applied, &hash, t(0)))
            .await
            .unwrap();

        assert_eq!(repo.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete_with_hash_filter() {
        let repo = JobRepository::in_memory().await.unwrap();
        let key = JobKey::new("Engineer", "Acme");
        let hash = MailHash::from_hex("aa");
        repo.record(&change(&key, AppStatus::Applied, &hash, t(0)))
            .await
            .unwrap();

        let other = MailHash::from_hex("zz");
        assert!(!repo.delete(&key, Some(&other)).await.unwrap());
        assert_eq!(repo.count().await.unwrap(), 1);

        assert!(repo.delete(&key, Some(&hash)).await.unwrap());
        assert!(repo.find(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_without_filter_and_missing() {
        let repo = JobRepository::in_memory().await.unwrap();
        let key = JobKey::new("Engineer", "Acme");
        let hash = MailHash::from_hex("aa");

        assert!(!repo.delete(&key, None).await.unwrap());

        repo.record(&change(&key, AppStatus::Offer, &hash, t(0)))
            .await
            .unwrap();
        assert!(repo.delete(&key, None).await.unwrap());
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_removes_hash_set() {
        let repo = JobRepository::in_memory().await.unwrap();
        let key = JobKey::new("Engineer", "Acme");
        let first = MailHash::from_hex("aa");
        let second = MailHash::from_hex("bb");
        repo.record(&change(&key, AppStatus::Applied, &first, t(0)))
            .await
            .unwrap();
        repo.record(&change(&key, AppStatus::Interview, &second, t(10)))
            .await
            .unwrap();

        assert!(repo.delete(&key, Some(&second)).await.unwrap());

        let orphans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job_mail_hashes")
            .fetch_one(&repo.pool)
            .await
            .unwrap();
        assert_eq!(orphans, 0);

        repo.record(&change(&key, AppStatus::Applied, &first, t(20)))
            .await
            .unwrap();
        let job = repo.find(&key).await.unwrap().unwrap();
        assert_eq!(job.mail_hashes.len(), 1);
        assert_eq!(job.created_at, t(20));
    }

    #[tokio::test]
    async fn test_list_pages_and_latest() {
        let repo = JobRepository::in_memory().await.unwrap();
        let hash = MailHash::from_hex("aa");
        let base = t(0);
        for (i, company) in ["A", "B", "C"].into_iter().enumerate() {
            let key = JobKey::new("Engineer", company);
            let at = base + Duration::seconds(i64::try_from(i).unwrap());
            repo.record(&change(&key, AppStatus::Applied, &hash, at))
                .await
                .unwrap();
        }

        let first = repo.list(0, 2).await.unwrap();
        let second = repo.list(1, 2).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].key.company, "C");
        assert_eq!(second[0].key.company, "A");

        let latest = repo.latest().await.unwrap().unwrap();
        assert_eq!(latest.key.company, "C");
    }
}
