use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WikidataError>;

#[derive(Debug, Error)]
pub enum WikidataError {
    #[error("Too many requests (429) from {url}")]
    RateLimited {
        url: String,
        retry_after: Option<Duration>,
    },

    #[error("Request blocked (403) by {url}; wait before retrying")]
    Blocked { url: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid entity id: {0:?}")]
    InvalidId(String),
}

/// How the retry executor should treat a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient; wait (provider hint or policy default) and try again.
    Retryable { retry_after: Option<Duration> },
    /// Abuse or block response; surface immediately.
    Fatal,
    /// Anything else; surface on first occurrence.
    Propagate,
}

impl WikidataError {
    pub fn class(&self) -> ErrorClass {
        match self {
            WikidataError::RateLimited { retry_after, .. } => ErrorClass::Retryable {
                retry_after: *retry_after,
            },
            WikidataError::Blocked { .. } => ErrorClass::Fatal,
            _ => ErrorClass::Propagate,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Fatal
    }

    /// Map a non-success HTTP status onto the error taxonomy.
    pub fn from_status(url: &str, status: u16, retry_after: Option<Duration>, body: String) -> Self {
        match status {
            429 => WikidataError::RateLimited {
                url: url.to_string(),
                retry_after,
            },
            403 => WikidataError::Blocked {
                url: url.to_string(),
            },
            _ => WikidataError::Api {
                status,
                message: body,
            },
        }
    }
}

/// Pass successful responses through; turn everything else into an error,
/// reading `Retry-After` (seconds) when present.
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let url = resp.url().to_string();
    let retry_after = resp
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = resp.text().await.unwrap_or_default();
    Err(WikidataError::from_status(&url, status.as_u16(), retry_after, body))
}

impl From<reqwest::Error> for WikidataError {
    fn from(err: reqwest::Error) -> Self {
        WikidataError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for WikidataError {
    fn from(err: serde_json::Error) -> Self {
        WikidataError::Parse(err.to_string())
    }
}
