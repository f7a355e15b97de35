//! Typed error types for the probing and download engine.
//!
//! Error codes are stable identifiers a UI shell can match on:
//! - `E_TOOL_*`: the external extractor could not be located
//! - `E_PROC_*`: process creation or supervision failures
//! - `E_VAL_*`: validation errors (user can fix input)
//! - `E_IO_*`: file system errors
//! - `E_CANCELLED`: the caller asked the operation to stop
//!
//! A full probe queue is deliberately NOT an error: it is reported as a
//! boolean / enum outcome so callers can retry on a later pass.

use serde::Serialize;
use thiserror::Error;

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    EToolNotFound,

    EProcSpawnFailed,

    EValInvalidUrl,
    EValInvalidPath,
    EValInvalidConfig,

    EIoNotFound,
    EIoPermissionDenied,
    EIoWriteFailed,

    ECancelled,
}

impl ErrorCode {
    /// Returns whether this error is typically retryable.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::EProcSpawnFailed)
    }

    /// Returns the error code as a string (e.g., "E_TOOL_NOT_FOUND").
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::EToolNotFound => "E_TOOL_NOT_FOUND",
            Self::EProcSpawnFailed => "E_PROC_SPAWN_FAILED",
            Self::EValInvalidUrl => "E_VAL_INVALID_URL",
            Self::EValInvalidPath => "E_VAL_INVALID_PATH",
            Self::EValInvalidConfig => "E_VAL_INVALID_CONFIG",
            Self::EIoNotFound => "E_IO_NOT_FOUND",
            Self::EIoPermissionDenied => "E_IO_PERMISSION_DENIED",
            Self::EIoWriteFailed => "E_IO_WRITE_FAILED",
            Self::ECancelled => "E_CANCELLED",
        }
    }
}

/// Categories of validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValidationKind {
    InvalidUrl,
    InvalidPath,
    InvalidConfig,
}

/// Unified error type for the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    #[error("failed to spawn {tool}: {source}")]
    SpawnFailure {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("validation error ({kind:?}): {message}")]
    Validation { kind: ValidationKind, message: String },

    #[error("io error in {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Serializable error summary for whatever shell sits on top of the engine.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    /// Machine-readable error code (e.g., "E_TOOL_NOT_FOUND")
    pub code: &'static str,
    /// Human-readable error message
    pub message: String,
    /// Whether the operation can be retried
    pub retryable: bool,
}

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ToolNotFound { .. } => ErrorCode::EToolNotFound,
            Self::SpawnFailure { .. } => ErrorCode::EProcSpawnFailed,
            Self::Validation { kind, .. } => match kind {
                ValidationKind::InvalidUrl => ErrorCode::EValInvalidUrl,
                ValidationKind::InvalidPath => ErrorCode::EValInvalidPath,
                ValidationKind::InvalidConfig => ErrorCode::EValInvalidConfig,
            },
            Self::Io { source, .. } => match source.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::EIoNotFound,
                std::io::ErrorKind::PermissionDenied => ErrorCode::EIoPermissionDenied,
                _ => ErrorCode::EIoWriteFailed,
            },
            Self::Cancelled => ErrorCode::ECancelled,
        }
    }

    /// Convert to a structured report.
    pub fn to_report(&self) -> ErrorReport {
        let code = self.code();
        ErrorReport {
            code: code.as_str(),
            message: self.to_string(),
            retryable: code.is_retryable(),
        }
    }

    /// Convert to a JSON string.
    pub fn to_report_json(&self) -> String {
        serde_json::to_string(&self.to_report()).unwrap_or_else(|_| self.to_string())
    }
}

// Convenience constructors
impl EngineError {
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    pub fn spawn_failure(tool: impl Into<String>, source: std::io::Error) -> Self {
        Self::SpawnFailure {
            tool: tool.into(),
            source,
        }
    }

    /// Create a URL validation error.
    pub fn invalid_url(message: impl Into<String>) -> Self {
        Self::Validation {
            kind: ValidationKind::InvalidUrl,
            message: message.into(),
        }
    }

    /// Create a path validation error.
    pub fn invalid_path(message: impl Into<String>) -> Self {
        Self::Validation {
            kind: ValidationKind::InvalidPath,
            message: message.into(),
        }
    }

    /// Create a configuration validation error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::Validation {
            kind: ValidationKind::InvalidConfig,
            message: message.into(),
        }
    }

    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
