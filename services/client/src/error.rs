//! services/client/src/error.rs
//!
//! Defines the primary error type for the client service, plus the user-facing
//! errors of the intake form and chat input.

use crate::config::ConfigError;
use dermassist_core::ports::PortError;

/// The primary error type for the `client` service.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents an error while applying storage migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents an error while building the HTTP client.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Represents a standard Input/Output error (e.g., reading an image file).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// Why a diagnosis submission did not produce a result. The `Display` text is
/// shown under the form as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntakeError {
    #[error("Please provide both an image and symptom description.")]
    MissingInput,
    #[error("A diagnosis is already being analyzed.")]
    Busy,
    #[error("{0}")]
    Transport(String),
    #[error("The session has been closed.")]
    Closed,
}

/// Why a chat turn was not sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatTurnError {
    #[error("Type a question first.")]
    EmptyInput,
    #[error("Please wait for the current reply to finish.")]
    Busy,
    #[error("The session has been closed.")]
    Closed,
}
