//! Error types for the remote directory, resource manager, and site clients.

use thiserror::Error;

/// Errors raised by a client session or a remote call.
///
/// Remote rejections keep their HTTP status and the service's own message so
/// callers can classify them (a conflict on a grant means the grant exists).
#[derive(Debug, Error)]
pub enum ClientError {
    /// No token could be obtained, or the service refused the session.
    #[error("Authentication failed for {resource}: {reason}")]
    Authentication { resource: String, reason: String },

    /// The service answered with a non-success status.
    #[error("{service} API error {status}: {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },

    /// The service answered successfully but the payload was not usable.
    #[error("{service} returned an unexpected response: {reason}")]
    UnexpectedResponse {
        service: &'static str,
        reason: String,
    },

    /// A call was made through a session that was already closed.
    #[error("{0} session is closed")]
    SessionClosed(&'static str),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parsing failed: {0}")]
    Url(#[from] url::ParseError),

    #[error("Certificate error: {0}")]
    Certificate(#[from] credentials::CredentialError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// HTTP status of a remote rejection, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
