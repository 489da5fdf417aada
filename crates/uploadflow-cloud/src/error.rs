//! Cloud provider error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Cloud provider errors
#[derive(Error, Debug)]
pub enum CloudError {
    /// A resource with the requested name exists but belongs to another deployment
    #[error("Resource conflict: {0}")]
    Conflict(String),

    /// Bucket deletion blocked by remaining objects
    #[error("Bucket not empty: {0}")]
    NotEmpty(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Failure reported by an external service, with the original cause attached
    #[error("Backend error: {context}")]
    Backend {
        context: String,
        #[source]
        source: BoxError,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Wrap an external failure, keeping it as the error source
    pub fn backend(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        CloudError::Backend {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CloudError::Conflict(_) => ErrorKind::Conflict,
            CloudError::NotEmpty(_) => ErrorKind::NotEmpty,
            CloudError::NotFound(_) => ErrorKind::NotFound,
            CloudError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            CloudError::Backend { .. } | CloudError::Io(_) | CloudError::Json(_) => {
                ErrorKind::Backend
            }
        }
    }

    /// Message including the chain of sources
    pub fn detailed_message(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }
}

/// Error classification shown in run reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Conflict,
    NotEmpty,
    NotFound,
    Backend,
    InvalidConfig,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Conflict => write!(f, "ConflictError"),
            ErrorKind::NotEmpty => write!(f, "NotEmptyError"),
            ErrorKind::NotFound => write!(f, "NotFoundError"),
            ErrorKind::Backend => write!(f, "BackendError"),
            ErrorKind::InvalidConfig => write!(f, "InvalidConfig"),
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
