//! Triage error types

use haven_common::types::CrisisState;
use thiserror::Error;
use uuid::Uuid;

/// Result type for triage operations
pub type Result<T> = std::result::Result<T, TriageError>;

/// Triage error types
#[derive(Error, Debug)]
pub enum TriageError {
    /// Content artifact loading or validation error
    #[error("Content error: {0}")]
    Content(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Crisis record lookup failed
    #[error("Crisis {crisis_id} not found")]
    CrisisNotFound { crisis_id: Uuid },

    /// A state transition was rejected by the transition table
    ///
    /// The crisis record is unchanged; callers retry with a valid action or
    /// surface the conflict to the operator.
    #[error("Crisis {crisis_id}: transition {from} -> {to} rejected")]
    TransitionRejected {
        crisis_id: Uuid,
        from: CrisisState,
        to: CrisisState,
    },

    /// Audit ledger error (wraps haven_audit::AuditError)
    #[error("Audit error: {0}")]
    Audit(#[from] haven_audit::AuditError),

    /// Shared-library error (wraps haven_common::Error)
    #[error(transparent)]
    Common(#[from] haven_common::Error),
}
