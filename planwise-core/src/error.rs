//! Error types for planwise-core
//!
//! Every failure that reaches a store is one of these variants. The gateway
//! translates transport outcomes into `Auth`, `SessionExpired`,
//! `Connectivity` and `Remote`; stores add `Validation` and `NotFound`.

use serde::Serialize;
use thiserror::Error;

/// Main error type for the planwise-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Client-side refusal, raised before any network call
    #[error("validation error: {0}")]
    Validation(String),

    /// Entity id is not present in the local collection
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Backend rejected the credentials attached to a request (HTTP 401)
    #[error("authorization failed: {0}")]
    Auth(String),

    /// Token refresh failed and the session was torn down
    #[error("session expired: {0}")]
    SessionExpired(String),

    /// No session tokens are available
    #[error("not authenticated")]
    Unauthenticated,

    /// No response was received (connection failure or timeout)
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// Backend responded with an error payload
    #[error("{}", format_remote(.status, .message))]
    Remote { status: Option<u16>, message: String },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Secret store or cache failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Anything else
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

fn format_remote(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("server error ({}): {}", code, message),
        None => format!("server error: {}", message),
    }
}

/// Result type alias for planwise-core
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`], used by UIs to choose between
/// retry and give-up messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Auth,
    SessionExpired,
    Connectivity,
    Remote,
    Internal,
}

impl ErrorKind {
    /// Whether retrying the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Connectivity | ErrorKind::Remote)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Auth => "auth",
            ErrorKind::SessionExpired => "session_expired",
            ErrorKind::Connectivity => "connectivity",
            ErrorKind::Remote => "remote",
            ErrorKind::Internal => "internal",
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Auth(_) | Error::Unauthenticated => ErrorKind::Auth,
            Error::SessionExpired(_) => ErrorKind::SessionExpired,
            Error::Connectivity(_) => ErrorKind::Connectivity,
            Error::Remote { .. } => ErrorKind::Remote,
            Error::Config(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::Storage(_)
            | Error::Unexpected(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status code, when the backend produced one
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Remote { status, .. } => *status,
            Error::Auth(_) => Some(401),
            _ => None,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }
}

/// Error value recorded in a store's error slot for the UI to read.
///
/// `notice` is the short user-facing line ("Failed to delete Buy milk");
/// `message` carries the underlying error text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreError {
    pub kind: ErrorKind,
    pub status: Option<u16>,
    pub notice: String,
    pub message: String,
}

impl StoreError {
    pub fn new(notice: impl Into<String>, error: &Error) -> Self {
        Self {
            kind: error.kind(),
            status: error.status(),
            notice: notice.into(),
            message: error.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}
