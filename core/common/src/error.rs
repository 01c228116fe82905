//! Common error types for TurfGuard.

use thiserror::Error;

/// Top-level error type for TurfGuard operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Encryption or key derivation failed.
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Payload could not be decoded or authenticated.
    ///
    /// Never carries plaintext, partial or otherwise.
    #[error("Decryption error: {0}")]
    Decryption(String),

    /// One or more policy rules failed.
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Input matched a threat heuristic and the caller chose to enforce it.
    #[error("Security threat detected: {kind} in {field}")]
    ThreatDetected { kind: String, field: String },

    /// An audit event could not be written to its sink.
    #[error("Audit write failed: {0}")]
    AuditWrite(String),

    /// Configuration is missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether the failure is likely transient and worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Io(_) | Error::AuditWrite(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
