use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("VALIDATION_ERROR: {0}")]
    Validation(String),
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("CONFLICT: {0}")]
    Conflict(String),
    #[error("STORAGE_UNAVAILABLE: {0}")]
    Storage(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("CONFIG_INVALID: {0}")]
    Config(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Storage(_) => "STORAGE_UNAVAILABLE",
            Self::Io(_) => "IO_FAILURE",
            Self::Config(_) => "CONFIG_INVALID",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Missing and foreign-owned entities share one outcome so callers
    /// cannot discover ids that belong to other users.
    pub fn not_found(entity: &str, action: &str) -> Self {
        Self::NotFound(format!(
            "{} does not exist or you do not have permission to {} it",
            entity, action
        ))
    }

    pub(crate) fn poisoned() -> Self {
        Self::Storage("database mutex poisoned".to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Config(value.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Structured `{error, message}` result handed to the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl From<&AppError> for ErrorBody {
    fn from(value: &AppError) -> Self {
        let message = match value {
            AppError::Validation(message)
            | AppError::NotFound(message)
            | AppError::Conflict(message)
            | AppError::Config(message) => message.clone(),
            AppError::Storage(_) => "The data store is currently unavailable".to_string(),
            AppError::Io(_) | AppError::Internal(_) => "An unexpected error occurred".to_string(),
        };
        Self {
            error: value.kind().to_string(),
            message,
        }
    }
}

impl From<AppError> for ErrorBody {
    fn from(value: AppError) -> Self {
        Self::from(&value)
    }
}
