//! Domain-specific error types for interactive-feedback

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// Exit code of the dialog process when the user submitted feedback
pub const EXIT_SUBMITTED: i32 = 0;
/// Exit code of the dialog process when the request payload was unusable
pub const EXIT_INVALID_INPUT: i32 = 2;
/// Exit code of the dialog process when it was closed without submitting
pub const EXIT_CANCELLED: i32 = 3;

/// Main error type for the interactive-feedback server and dialog
#[derive(Error, Debug)]
pub enum FeedbackError {
    #[error("Dialog closed without submitting feedback")]
    UserCancelled,

    #[error("Prompt enhancement unavailable: {message}")]
    EnhancementUnavailable { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("I/O error: {message}")]
    Io { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Dialog launch failed: {message}")]
    Launch { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Wire-level tag for the three recoverable error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UserCancelled,
    EnhancementUnavailable,
    InvalidInput,
}

impl ErrorKind {
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::UserCancelled => EXIT_CANCELLED,
            ErrorKind::InvalidInput => EXIT_INVALID_INPUT,
            // Enhancement failures never end the dialog
            ErrorKind::EnhancementUnavailable => EXIT_SUBMITTED,
        }
    }
}

impl FeedbackError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        FeedbackError::InvalidInput {
            message: message.into(),
        }
    }

    pub fn enhancement_unavailable(message: impl Into<String>) -> Self {
        FeedbackError::EnhancementUnavailable {
            message: message.into(),
        }
    }

    /// Recoverable kind of this error, if it belongs to the user-facing taxonomy
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            FeedbackError::UserCancelled => Some(ErrorKind::UserCancelled),
            FeedbackError::EnhancementUnavailable { .. } => Some(ErrorKind::EnhancementUnavailable),
            FeedbackError::InvalidInput { .. } => Some(ErrorKind::InvalidInput),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for FeedbackError {
    fn from(err: anyhow::Error) -> Self {
        FeedbackError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for FeedbackError {
    fn from(err: std::io::Error) -> Self {
        FeedbackError::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for FeedbackError {
    fn from(err: serde_json::Error) -> Self {
        FeedbackError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for FeedbackError {
    fn from(err: toml::de::Error) -> Self {
        FeedbackError::Config {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for FeedbackError {
    fn from(err: reqwest::Error) -> Self {
        FeedbackError::EnhancementUnavailable {
            message: format!("HTTP request failed: {}", err),
        }
    }
}

/// Convert FeedbackError to MCP error
impl From<FeedbackError> for rmcp::ErrorData {
    fn from(err: FeedbackError) -> Self {
        let kind = err.kind();
        let (code, label, details) = match err {
            FeedbackError::UserCancelled => (
                rmcp::model::ErrorCode::INTERNAL_ERROR,
                "User cancelled",
                "dialog closed without submitting feedback".to_string(),
            ),
            FeedbackError::EnhancementUnavailable { message } => (
                rmcp::model::ErrorCode::INTERNAL_ERROR,
                "Enhancement unavailable",
                message,
            ),
            FeedbackError::InvalidInput { message } => (
                rmcp::model::ErrorCode::INVALID_PARAMS,
                "Invalid input",
                message,
            ),
            FeedbackError::Config { message } => (
                rmcp::model::ErrorCode::INTERNAL_ERROR,
                "Configuration error",
                message,
            ),
            FeedbackError::Io { message } => (
                rmcp::model::ErrorCode::INTERNAL_ERROR,
                "I/O error",
                message,
            ),
            FeedbackError::Serialization { message } => (
                rmcp::model::ErrorCode::INTERNAL_ERROR,
                "Serialization error",
                message,
            ),
            FeedbackError::Launch { message } => (
                rmcp::model::ErrorCode::INTERNAL_ERROR,
                "Dialog launch failed",
                message,
            ),
            FeedbackError::Internal { message } => (
                rmcp::model::ErrorCode::INTERNAL_ERROR,
                "Internal error",
                message,
            ),
        };

        rmcp::ErrorData {
            code,
            message: format!("{label}: {details}").into(),
            data: Some(json!({ "details": details, "kind": kind })),
        }
    }
}

/// Result type alias for interactive-feedback operations
pub type Result<T> = std::result::Result<T, FeedbackError>;
