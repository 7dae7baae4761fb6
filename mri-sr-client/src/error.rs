//! Client-wide error types.

use thiserror::Error;

/// Client-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Client-wide error type.
///
/// Errors are `Clone` so that one failed fetch can be delivered to every
/// waiter and every polling subscriber of the same job.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No response reached the client.
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with an error status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Job not found: {job_id}")]
    JobNotFound { job_id: String },

    /// Client-side precondition failure, raised before any request is sent.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid job id: {0:?}")]
    InvalidJobId(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("{0}")]
    Other(String),
}

/// Coarse classification of HTTP failures for user-facing messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Unauthorized,
    Forbidden,
    NotFound,
    Unprocessable,
    Server,
    Other,
}

impl StatusKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            422 => Self::Unprocessable,
            500..=599 => Self::Server,
            _ => Self::Other,
        }
    }
}

impl Error {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    pub fn job_not_found(job_id: impl Into<String>) -> Self {
        Self::JobNotFound {
            job_id: job_id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::JobNotFound { .. } => Some(404),
            _ => None,
        }
    }

    pub fn status_kind(&self) -> Option<StatusKind> {
        self.status().map(StatusKind::from_status)
    }

    /// Whether the job the request referred to no longer resolves.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::JobNotFound { .. })
    }

    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }

    /// Message suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) => "Network error. Please check your connection.".to_string(),
            Self::JobNotFound { .. } => "The requested resource was not found.".to_string(),
            Self::Http { status, message } => match StatusKind::from_status(*status) {
                StatusKind::Unauthorized => "You are not authorized. Please login.".to_string(),
                StatusKind::Forbidden => {
                    "You do not have permission to perform this action.".to_string()
                }
                StatusKind::NotFound => "The requested resource was not found.".to_string(),
                StatusKind::Unprocessable if !message.is_empty() => message.clone(),
                StatusKind::Unprocessable => {
                    "Please check your input and try again.".to_string()
                }
                StatusKind::Server => "Server error. Please try again later.".to_string(),
                StatusKind::Other if !message.is_empty() => message.clone(),
                StatusKind::Other => "An unexpected error occurred.".to_string(),
            },
            Self::Validation(msg) => msg.clone(),
            _ => "An unexpected error occurred.".to_string(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        match err.status() {
            Some(status) => Self::http(status.as_u16(), err.to_string()),
            None => Self::Network(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
