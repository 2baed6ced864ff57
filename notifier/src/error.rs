//! Error types for talking to the calendar server and to the desktop.
//!
//! None of these are fatal to the service. The notifier inspects a
//! [`FetchError`] to decide whether the active endpoint should be dropped.

use thiserror::Error;

/// Failure while fetching from the calendar server
#[derive(Debug, Error)]
pub enum FetchError {
    /// Deadline elapsed before the server answered
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// Connection refused, DNS failure, reset, body read failure...
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-success status other than 401
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// Body was not valid JSON
    #[error("invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                source: err,
            }
        }
    }

    /// Whether this failure means the endpoint itself is gone.
    ///
    /// Network failures and 5xx answers force rediscovery. Client errors and
    /// bad payloads leave the endpoint alone.
    pub fn drops_endpoint(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => *status >= 500,
            FetchError::Decode { .. } => false,
        }
    }
}

/// Failure reported by a host adapter (notification centre, browser)
#[derive(Debug, Error)]
pub enum HostError {
    #[error("failed to show notification {id}: {reason}")]
    Notification { id: String, reason: String },

    #[error("failed to open {url}: {reason}")]
    Open { url: String, reason: String },

    #[error("host task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
