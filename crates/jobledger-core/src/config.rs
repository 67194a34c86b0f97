//! Runtime configuration.
//!
//! Read from `<config_dir>/jobledger/config.json` (or an explicit path), then
//! overridden by environment variables. Every field has a default, so a
//! missing file or a partial one is fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classify::DEFAULT_MAX_SESSIONS;
use crate::extract::{ConsensusPolicy, DEFAULT_ERROR_CAP, DEFAULT_QUORUM};
use crate::{Error, Result};

/// Overrides [`Config::ollama_host`].
pub const ENV_OLLAMA_HOST: &str = "OLLAMA_HOST";
/// Overrides [`Config::model`].
pub const ENV_MODEL: &str = "JOBLEDGER_MODEL";
/// Overrides [`Config::database_path`].
pub const ENV_DATABASE: &str = "JOBLEDGER_DATABASE";
/// Overrides [`Config::webhook_url`].
pub const ENV_WEBHOOK_URL: &str = "DISCORD_WEBHOOK_URL";

const APP_DIR: &str = "jobledger";

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the Ollama server.
    pub ollama_host: String,
    /// Model name passed with every chat request.
    pub model: String,
    /// `SQLite` database file.
    pub database_path: PathBuf,
    /// Discord webhook for operator notifications; none disables them.
    pub webhook_url: Option<String>,
    /// HTTP request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Agreeing answers required per extraction session.
    pub quorum: usize,
    /// Failed answers tolerated per extraction session.
    pub error_cap: usize,
    /// Per-query timeout in seconds.
    pub query_timeout_secs: Option<u64>,
    /// Whole-session timeout in seconds.
    pub session_deadline_secs: Option<u64>,
    /// Extraction sessions run for one confirmed job update.
    pub max_sessions: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama_host: "http://localhost:11434".to_string(),
            model: "llama3.2:latest".to_string(),
            database_path: default_database_path(),
            webhook_url: None,
            request_timeout_secs: 120,
            quorum: DEFAULT_QUORUM,
            error_cap: DEFAULT_ERROR_CAP,
            query_timeout_secs: None,
            session_deadline_secs: None,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

impl Config {
    /// Default location of the configuration file.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.json")
    }

    /// Load from `path` (or the default location) and apply environment
    /// overrides. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map_or_else(Self::default_path, Path::to_path_buf);

        let config = if tokio::fs::try_exists(&path).await? {
            let contents = tokio::fs::read_to_string(&path).await?;
            debug!(path = %path.display(), "Loaded configuration");
            Self::from_json(&contents)?
        } else {
            debug!(path = %path.display(), "No configuration file, using defaults");
            Self::default()
        };

        Ok(config.with_overrides(|name| std::env::var(name).ok()))
    }

    /// Parse a JSON document; absent fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid configuration JSON.
    pub fn from_json(contents: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides looked up by environment variable name. Blank values
    /// are ignored.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(host) = var(ENV_OLLAMA_HOST) {
            self.ollama_host = host;
        }
        if let Some(model) = var(ENV_MODEL) {
            self.model = model;
        }
        if let Some(path) = var(ENV_DATABASE) {
            self.database_path = PathBuf::from(path);
        }
        if let Some(url) = var(ENV_WEBHOOK_URL) {
            self.webhook_url = Some(url);
        }
        self
    }

    /// Session limits for the extractor.
    #[must_use]
    pub fn consensus_policy(&self) -> ConsensusPolicy {
        ConsensusPolicy {
            quorum: self.quorum,
            error_cap: self.error_cap,
            query_timeout: self.query_timeout_secs.map(Duration::from_secs),
            session_deadline: self.session_deadline_secs.map(Duration::from_secs),
        }
    }

    /// HTTP request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.quorum == 0 {
            return Err(Error::Config("quorum must be at least 1".to_string()));
        }
        if self.max_sessions == 0 {
            return Err(Error::Config("max_sessions must be at least 1".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(Error::Config("model must not be empty".to_string()));
        }
        Ok(())
    }
}

fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("jobledger.db")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.ollama_host, "http://localhost:11434");
        assert_eq!(config.model, "llama3.2:latest");
        assert_eq!(config.request_timeout(), Duration::from_secs(120));
        assert_eq!(config.consensus_policy(), ConsensusPolicy::default());
        assert_eq!(config.max_sessions, 10);
        assert!(config.database_path.ends_with("jobledger/jobledger.db"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_json(r#"{"model":"mistral","query_timeout_secs":30}"#).unwrap();
        assert_eq!(config.model, "mistral");
        assert_eq!(config.quorum, 6);
        assert_eq!(
            config.consensus_policy().query_timeout,
            Some(Duration::from_secs(30))
        );
        assert_eq!(config.consensus_policy().session_deadline, None);
    }

    #[test]
    fn test_rejects_zero_quorum() {
        assert!(matches!(
            Config::from_json(r#"{"quorum":0}"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(Config::from_json("not json"), Err(Error::Serde(_))));
    }

    #[test]
    fn test_environment_overrides() {
        let config = Config::default().with_overrides(|name| match name {
            ENV_OLLAMA_HOST => Some("http://gpu-box:11434".to_string()),
            ENV_DATABASE => Some("/tmp/jobs.db".to_string()),
            ENV_WEBHOOK_URL => Some("https://discord.com/api/webhooks/1/abc".to_string()),
            ENV_MODEL => Some("  ".to_string()),
            _ => None,
        });

        assert_eq!(config.ollama_host, "http://gpu-box:11434");
        assert_eq!(config.database_path, PathBuf::from("/tmp/jobs.db"));
        assert_eq!(
            config.webhook_url.as_deref(),
            Some("https://discord.com/api/webhooks/1/abc")
        );
        assert_eq!(config.model, "llama3.2:latest");
    }

    #[tokio::test]
    async fn test_load_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("jobledger-missing-config.json");
        let config = Config::load(Some(&path)).await.unwrap();
        assert_eq!(config.quorum, Config::default().quorum);
    }
}
