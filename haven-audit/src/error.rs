//! Audit ledger error types

use thiserror::Error;

/// Result type for audit operations
pub type Result<T> = std::result::Result<T, AuditError>;

/// Audit ledger error types
#[derive(Error, Debug)]
pub enum AuditError {
    /// Chain verification failed
    ///
    /// Fatal integrity signal: the chain is never auto-repaired, the
    /// condition is surfaced for operator escalation.
    #[error("Integrity violation at sequence {sequence}: {reason}")]
    IntegrityViolation { sequence: u64, reason: String },

    /// Entry serialization error (wraps serde_json::Error)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during export or import (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed import data
    #[error("Invalid import data: {0}")]
    InvalidImport(String),
}
