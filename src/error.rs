//! Error type shared by every client operation.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Token exchange came back non-2xx
    #[error("authentication failed: {status} - {body}")]
    Authentication { status: u16, body: String },

    #[error("failed to create job: {status} - {body}")]
    Submission { status: u16, body: String },

    #[error("failed to upload file: {status} - {body}")]
    Upload { status: u16, body: String },

    #[error("query failed: {status} - {body}")]
    Query { status: u16, body: String },

    /// Body was unparsable or missing a required field
    #[error("invalid response: {0}")]
    MalformedResponse(String),

    /// Carries the configured timeout in seconds
    #[error("timeout reached after {0} seconds")]
    JobTimeout(u64),

    #[error("wait cancelled")]
    Cancelled,

    /// Content that was supposed to be base64 text was not valid UTF-8
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// For custom [`Transport`](crate::transport::Transport) implementations that could
    /// not deliver a request. `ReqwestTransport` reports `Http` instead.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// HTTP status for the unexpected-status kinds, `None` for everything else.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Authentication { status, .. }
            | Error::Submission { status, .. }
            | Error::Upload { status, .. }
            | Error::Query { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::JobTimeout(_))
    }
}
