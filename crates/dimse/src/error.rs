//! Error types for DIMSE operations

use thiserror::Error;

/// Result type alias for DIMSE operations
pub type Result<T> = std::result::Result<T, DimseError>;

/// Error types that can occur during DIMSE operations
#[derive(Error, Debug)]
pub enum DimseError {
    /// A command or response was built with a field combination the standard disallows
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// A narrowing accessor was used on an envelope of another kind
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// The message ID was never registered or has already been retired
    #[error("Unknown command: no outstanding command with message ID {0}")]
    UnknownCommand(u16),

    /// The association ended, locally or remotely
    #[error("Association closed")]
    AssociationClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An inbound command set could not be decoded
    #[error("Malformed DIMSE message: {0}")]
    MalformedMessage(String),

    #[error("Abstract syntax not negotiated: {0}")]
    AbstractSyntaxNotNegotiated(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DimseError {
    /// Create a new invalid command error
    pub fn invalid_command(msg: impl Into<String>) -> Self {
        Self::InvalidCommand(msg.into())
    }

    /// Create a new malformed message error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedMessage(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error permanently invalidates the service instance
    pub fn is_fatal(&self) -> bool {
        matches!(self, DimseError::AssociationClosed)
    }
}
