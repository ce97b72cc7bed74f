//! Inbound message model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single inbound chat message queued for safety screening
///
/// Immutable once received: screening classifies the message but never
/// mutates it, and re-screening the same message yields the same result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier
    pub message_id: Uuid,

    /// Raw message text as typed by the student
    pub text: String,

    /// Opaque reference to the authoring student
    ///
    /// Never stored in crisis records or aggregates in raw form; see
    /// `crate::redact::Pseudonymizer`.
    pub student_ref: String,

    /// Conversation session this message belongs to
    pub session_id: Uuid,
}

impl Message {
    /// Create a new message with a generated identifier
    pub fn new(text: impl Into<String>, student_ref: impl Into<String>, session_id: Uuid) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            text: text.into(),
            student_ref: student_ref.into(),
            session_id,
        }
    }
}
