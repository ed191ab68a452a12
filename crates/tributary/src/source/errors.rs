use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::http::HttpError;

/// Errors that can occur when talking to a source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source rejected the credentials; the user must reconnect.
    #[error("Credentials expired or revoked")]
    CredentialExpired,

    /// The source is throttling us.
    #[error("Rate limit exceeded{}", .reset_at.map(|t| format!(". Resets at {}", t)).unwrap_or_default())]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    /// Non-success response from the source.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The request never produced a response.
    #[error("Network error: {message}")]
    Network { message: String },

    /// The response could not be understood.
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    /// A client-side problem, such as a malformed base URL.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SourceError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Worth retrying within the same page fetch: network failures and 5xx.
    /// Throttling is not; the sync loop stops and the next run resumes.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<HttpError> for SourceError {
    fn from(err: HttpError) -> Self {
        Self::network(err.to_string())
    }
}

/// First line of an error's message, for sync logs and summaries.
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}

pub type Result<T> = std::result::Result<T, SourceError>;
