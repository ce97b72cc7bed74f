//! Crisis escalation state machine types
//!
//! **[ESC-SM-010]** A crisis record progresses through defined states:
//! DETECTED → NOTIFYING → ACKNOWLEDGED → IN_PROGRESS → RESOLVED, with an
//! ESCALATED branch when acknowledgment times out. RESOLVED is terminal.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// **[ESC-SM-010]** Crisis lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrisisState {
    /// Crisis identified, record created
    Detected,
    /// Counselor notification dispatched, awaiting acknowledgment
    Notifying,
    /// A human has taken ownership
    Acknowledged,
    /// Intervention underway
    InProgress,
    /// Acknowledgment timed out; next contact tier engaged
    Escalated,
    /// Intervention concluded (terminal)
    Resolved,
}

impl CrisisState {
    /// Stable string form used in audit entries and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            CrisisState::Detected => "DETECTED",
            CrisisState::Notifying => "NOTIFYING",
            CrisisState::Acknowledged => "ACKNOWLEDGED",
            CrisisState::InProgress => "IN_PROGRESS",
            CrisisState::Escalated => "ESCALATED",
            CrisisState::Resolved => "RESOLVED",
        }
    }

    /// **[ESC-SM-020]** Valid successor states
    ///
    /// This table is the single source of truth for transition legality;
    /// every state change goes through `CrisisRecord::transition_to` which
    /// consults it.
    pub const fn allowed_next_states(&self) -> &'static [CrisisState] {
        match self {
            CrisisState::Detected => &[CrisisState::Notifying],
            CrisisState::Notifying => &[CrisisState::Acknowledged, CrisisState::Escalated],
            CrisisState::Acknowledged => &[CrisisState::InProgress, CrisisState::Resolved],
            CrisisState::InProgress => &[CrisisState::Resolved],
            CrisisState::Escalated => &[CrisisState::Acknowledged],
            CrisisState::Resolved => &[],
        }
    }

    /// Check whether a transition to `next` is legal
    pub fn can_transition_to(&self, next: CrisisState) -> bool {
        self.allowed_next_states().contains(&next)
    }

    /// True for states with no successors
    pub fn is_terminal(&self) -> bool {
        matches!(self, CrisisState::Resolved)
    }

    /// True while an acknowledgment timer should be running
    pub fn is_awaiting_ack(&self) -> bool {
        matches!(self, CrisisState::Notifying | CrisisState::Escalated)
    }
}

impl std::fmt::Display for CrisisState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What produced a crisis detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// Layer 1 crisis term match
    KeywordMatch,
    /// Layer 2 critical clinical marker
    SemanticCritical,
    /// Reported by a human moderator
    ManualReport,
}

impl TriggerSource {
    /// Stable string form used in audit entries and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::KeywordMatch => "keyword_match",
            TriggerSource::SemanticCritical => "semantic_critical",
            TriggerSource::ManualReport => "manual_report",
        }
    }
}

/// **[ESC-SM-030]** Crisis record (in-memory state)
///
/// Created by detection, mutated only through `transition_to` and the trigger
/// merge on duplicate detection. Never deleted; RESOLVED records are retained
/// for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrisisRecord {
    /// Unique crisis identifier
    pub crisis_id: Uuid,

    /// Salted hash of the student reference (raw identity never stored)
    pub student_ref_hash: String,

    /// Conversation session the triggering message belonged to
    pub session_id: Uuid,

    /// Current lifecycle state
    pub state: CrisisState,

    /// What produced the detection
    pub trigger: TriggerSource,

    /// Terms and phrases that triggered detection, merged across duplicate
    /// detections within the same session
    pub trigger_terms: BTreeSet<String>,

    /// Contact tiers in notification order
    pub escalation_path: Vec<String>,

    /// Index into `escalation_path` of the tier currently engaged
    pub current_tier: usize,

    /// Record creation time
    pub created_at: DateTime<Utc>,

    /// When a human took ownership
    pub acknowledged_at: Option<DateTime<Utc>>,

    /// Who took ownership
    pub acknowledged_by: Option<String>,

    /// When the intervention concluded
    pub resolved_at: Option<DateTime<Utc>>,

    /// Free-text resolution notes
    pub resolution_notes: Option<String>,

    /// Transition counter, incremented on every state change
    pub version: u64,
}

impl CrisisRecord {
    /// Create a new crisis record in DETECTED state
    pub fn new(
        student_ref_hash: String,
        session_id: Uuid,
        trigger: TriggerSource,
        trigger_terms: BTreeSet<String>,
        escalation_path: Vec<String>,
    ) -> Self {
        Self {
            crisis_id: Uuid::new_v4(),
            student_ref_hash,
            session_id,
            state: CrisisState::Detected,
            trigger,
            trigger_terms,
            escalation_path,
            current_tier: 0,
            created_at: Utc::now(),
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            resolution_notes: None,
            version: 0,
        }
    }

    /// **[ESC-SM-040]** Transition to a new state
    ///
    /// Enforces the transition table; on rejection the record is unchanged.
    /// Entering ACKNOWLEDGED stamps `acknowledged_at`; entering RESOLVED
    /// stamps `resolved_at`. `version` increments on every accepted
    /// transition.
    pub fn transition_to(&mut self, new_state: CrisisState) -> Result<()> {
        if !self.state.can_transition_to(new_state) {
            return Err(Error::InvalidInput(format!(
                "crisis {}: invalid transition {} -> {}",
                self.crisis_id, self.state, new_state
            )));
        }

        self.state = new_state;
        self.version += 1;

        match new_state {
            CrisisState::Acknowledged => {
                self.acknowledged_at = Some(Utc::now());
            }
            CrisisState::Resolved => {
                self.resolved_at = Some(Utc::now());
            }
            _ => {}
        }

        Ok(())
    }

    /// Name of the contact tier currently engaged
    pub fn current_tier_name(&self) -> Option<&str> {
        self.escalation_path.get(self.current_tier).map(|s| s.as_str())
    }

    /// Engage the next contact tier, returning its name
    ///
    /// Returns None when the path is exhausted; the caller keeps the last
    /// tier engaged and logs the exhaustion.
    pub fn advance_tier(&mut self) -> Option<&str> {
        if self.current_tier + 1 < self.escalation_path.len() {
            self.current_tier += 1;
            self.escalation_path.get(self.current_tier).map(|s| s.as_str())
        } else {
            None
        }
    }

    /// Check if the record is in a terminal state
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CrisisRecord {
        CrisisRecord::new(
            "a".repeat(64),
            Uuid::new_v4(),
            TriggerSource::KeywordMatch,
            BTreeSet::from(["kill myself".to_string()]),
            vec!["counselor_on_call".to_string(), "site_admin".to_string()],
        )
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut r = record();
        assert_eq!(r.state, CrisisState::Detected);

        r.transition_to(CrisisState::Notifying).unwrap();
        r.transition_to(CrisisState::Acknowledged).unwrap();
        assert!(r.acknowledged_at.is_some());

        r.transition_to(CrisisState::InProgress).unwrap();
        r.transition_to(CrisisState::Resolved).unwrap();
        assert!(r.resolved_at.is_some());
        assert!(r.is_terminal());
        assert_eq!(r.version, 4);
    }

    #[test]
    fn test_escalated_branch() {
        let mut r = record();
        r.transition_to(CrisisState::Notifying).unwrap();
        r.transition_to(CrisisState::Escalated).unwrap();

        // Escalated can still be acknowledged
        r.transition_to(CrisisState::Acknowledged).unwrap();
        r.transition_to(CrisisState::Resolved).unwrap();
        assert!(r.is_terminal());
    }

    #[test]
    fn test_invalid_transition_rejected_and_state_unchanged() {
        let mut r = record();

        // DETECTED cannot jump straight to RESOLVED
        let err = r.transition_to(CrisisState::Resolved);
        assert!(err.is_err());
        assert_eq!(r.state, CrisisState::Detected);
        assert_eq!(r.version, 0);

        // Terminal state accepts nothing
        r.transition_to(CrisisState::Notifying).unwrap();
        r.transition_to(CrisisState::Acknowledged).unwrap();
        r.transition_to(CrisisState::Resolved).unwrap();
        assert!(r.transition_to(CrisisState::InProgress).is_err());
        assert_eq!(r.state, CrisisState::Resolved);
    }

    #[test]
    fn test_resolved_is_only_terminal_state() {
        for state in [
            CrisisState::Detected,
            CrisisState::Notifying,
            CrisisState::Acknowledged,
            CrisisState::InProgress,
            CrisisState::Escalated,
        ] {
            assert!(!state.is_terminal());
            assert!(!state.allowed_next_states().is_empty());
        }
        assert!(CrisisState::Resolved.is_terminal());
        assert!(CrisisState::Resolved.allowed_next_states().is_empty());
    }

    #[test]
    fn test_advance_tier_stops_at_path_end() {
        let mut r = record();
        assert_eq!(r.current_tier_name(), Some("counselor_on_call"));

        assert_eq!(r.advance_tier(), Some("site_admin"));
        assert_eq!(r.advance_tier(), None);
        assert_eq!(r.current_tier_name(), Some("site_admin"));
    }

    #[test]
    fn test_state_serde_screaming_snake_case() {
        let json = serde_json::to_string(&CrisisState::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
        let back: CrisisState = serde_json::from_str("\"ESCALATED\"").unwrap();
        assert_eq!(back, CrisisState::Escalated);
    }
}
