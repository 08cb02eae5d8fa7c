//! Error types for tootbox.

use thiserror::Error;

/// Application result type.
pub type AppResult<T> = Result<T, AppError>;

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // === Client Errors ===
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // === Content Errors ===
    /// Media bytes could not be decoded as the declared kind.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Text did not match the `@user[@domain]` grammar.
    #[error("Malformed mention: {0}")]
    MalformedMention(String),

    /// Mention was well formed but no such actor is known.
    #[error("Unknown actor: {0}")]
    UnknownActor(String),

    // === Server Errors ===
    #[error("Database error: {0}")]
    Database(String),

    /// A blob could not be written to the storage backend.
    #[error("Storage write error: {0}")]
    StorageWrite(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the error code for API responses and persisted failure reasons.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::Decode(_) => "DECODE_ERROR",
            Self::MalformedMention(_) => "MALFORMED_MENTION",
            Self::UnknownActor(_) => "UNKNOWN_ACTOR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::StorageWrite(_) => "STORAGE_WRITE_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Queue(_) => "QUEUE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns whether this error should be logged at error level.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Database(_)
                | Self::StorageWrite(_)
                | Self::Storage(_)
                | Self::Queue(_)
                | Self::Config(_)
                | Self::Internal(_)
        )
    }
}

// === From implementations ===

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}
