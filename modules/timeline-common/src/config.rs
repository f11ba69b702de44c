use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

const DEFAULT_SPARQL_URL: &str = "https://query.wikidata.org/sparql";
const DEFAULT_CONTACT: &str = "https://github.com/timeline-atlas";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: Option<String>,

    // Query service
    pub sparql_url: String,
    pub sparql_max_retries: u32,
    pub sparql_default_retry: Duration,

    // Wikimedia REST / action APIs
    pub contact: String,
    pub request_delay: Duration,
    pub summary_delay: Duration,
    pub wikimedia_max_attempts: u32,
    pub wikimedia_backoff: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            sparql_url: DEFAULT_SPARQL_URL.to_string(),
            sparql_max_retries: 3,
            sparql_default_retry: Duration::from_secs(60),
            contact: DEFAULT_CONTACT.to_string(),
            request_delay: Duration::from_millis(350),
            summary_delay: Duration::from_millis(500),
            wikimedia_max_attempts: 3,
            wikimedia_backoff: Duration::from_millis(10_500),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            database_url: env::var("DATABASE_URL").ok(),
            sparql_url: env::var("WIKIDATA_SPARQL_URL").unwrap_or(defaults.sparql_url),
            sparql_max_retries: parsed_env("SPARQL_MAX_RETRIES")?
                .unwrap_or(defaults.sparql_max_retries),
            sparql_default_retry: parsed_env("SPARQL_DEFAULT_RETRY_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.sparql_default_retry),
            contact: env::var("WIKIMEDIA_CONTACT").unwrap_or(defaults.contact),
            request_delay: parsed_env("REQUEST_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_delay),
            summary_delay: parsed_env("SUMMARY_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.summary_delay),
            wikimedia_max_attempts: parsed_env("WIKIMEDIA_MAX_ATTEMPTS")?
                .unwrap_or(defaults.wikimedia_max_attempts),
            wikimedia_backoff: parsed_env("WIKIMEDIA_BACKOFF_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.wikimedia_backoff),
        };

        config.log_redacted();
        Ok(config)
    }

    /// The database URL, or an error naming the missing variable.
    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL environment variable is required")
    }

    /// Descriptive client identifier sent on every outbound request.
    pub fn user_agent(&self) -> String {
        format!(
            "TimelineAtlas/{} (Rust; +{})",
            env!("CARGO_PKG_VERSION"),
            self.contact
        )
    }

    fn log_redacted(&self) {
        let database = match &self.database_url {
            Some(url) => match url.split_once('@') {
                Some((_, host)) => format!("...@{host}"),
                None => "<set>".to_string(),
            },
            None => "<not set>".to_string(),
        };
        tracing::info!(
            database = %database,
            sparql_url = %self.sparql_url,
            sparql_max_retries = self.sparql_max_retries,
            request_delay_ms = self.request_delay.as_millis() as u64,
            "Config loaded"
        );
    }
}

fn parsed_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{key} must be a number, got {raw:?}")),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_rate_limit_guidance() {
        let config = Config::default();
        assert_eq!(config.request_delay, Duration::from_millis(350));
        assert_eq!(config.sparql_default_retry, Duration::from_secs(60));
        assert_eq!(config.wikimedia_max_attempts, 3);
    }

    #[test]
    fn user_agent_names_contact() {
        let config = Config {
            contact: "mailto:ops@example.org".into(),
            ..Config::default()
        };
        let agent = config.user_agent();
        assert!(agent.starts_with("TimelineAtlas/"));
        assert!(agent.ends_with("(Rust; +mailto:ops@example.org)"));
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let err = Config::default().require_database_url().unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }
}
