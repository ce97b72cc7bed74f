//! Crisis escalation management
//!
//! **[ESC-SM-050]** Owns the live crisis records and drives them through the
//! lifecycle state machine, with acknowledgment timers that escalate through
//! the contact tier path when no human takes ownership in time.
//!
//! Every accepted operation appends its audit entry before the new state is
//! committed: a crisis the ledger cannot record does not happen. Invalid
//! transitions are rejected with a typed error and leave the record exactly
//! as it was.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use haven_audit::{AuditAction, AuditLedger};
use haven_common::events::{EventBus, HavenEvent};
use haven_common::types::{CrisisRecord, CrisisState, TriggerSource};
use haven_common::PARAMS;

use crate::error::{Result, TriageError};

/// **[ESC-PARAM-020]** Default contact tiers, in notification order
pub const DEFAULT_ESCALATION_PATH: [&str; 3] =
    ["counselor_on_call", "backup_counselor", "site_admin"];

fn default_escalation_path() -> Vec<String> {
    DEFAULT_ESCALATION_PATH.iter().map(|s| s.to_string()).collect()
}

/// What a detection needs to open a crisis record
#[derive(Debug, Clone)]
pub struct CrisisTrigger {
    /// Salted hash of the student reference; raw identity never enters here
    pub student_ref_hash: String,
    pub session_id: Uuid,
    pub source: TriggerSource,
    /// Terms or phrases that fired the detection
    pub terms: BTreeSet<String>,
}

/// All mutable escalation state, behind one lock
///
/// A single lock keeps the three maps consistent with each other: a record,
/// its open-session entry and its ack timer change together or not at all.
struct EscalationState {
    records: HashMap<Uuid, CrisisRecord>,
    /// Sessions with a non-resolved crisis; repeat detections merge here
    open_by_session: HashMap<Uuid, Uuid>,
    /// Cancellation handles for running acknowledgment timers
    ack_timers: HashMap<Uuid, CancellationToken>,
}

/// **[ESC-SM-060]** Crisis escalation manager
pub struct EscalationManager {
    state: RwLock<EscalationState>,
    ledger: Arc<AuditLedger>,
    events: EventBus,
    escalation_path: Vec<String>,
    /// Fixed timeout for tests; deployments read **[ESC-PARAM-010]**
    ack_timeout_override: Option<Duration>,
}

impl EscalationManager {
    pub fn new(ledger: Arc<AuditLedger>, events: EventBus) -> Self {
        EscalationManager {
            state: RwLock::new(EscalationState {
                records: HashMap::new(),
                open_by_session: HashMap::new(),
                ack_timers: HashMap::new(),
            }),
            ledger,
            events,
            escalation_path: default_escalation_path(),
            ack_timeout_override: None,
        }
    }

    /// Replace the default contact tier path
    pub fn with_escalation_path(mut self, path: Vec<String>) -> Self {
        self.escalation_path = path;
        self
    }

    /// Pin the acknowledgment timeout instead of reading the global parameter
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout_override = Some(timeout);
        self
    }

    fn ack_timeout(&self) -> Duration {
        match self.ack_timeout_override {
            Some(timeout) => timeout,
            None => Duration::from_secs(*PARAMS.ack_timeout_secs.read().unwrap()),
        }
    }

    /// Emit a crisis event; losing one is survivable (the audit trail is the
    /// record) but worth a warning
    fn emit_or_warn(&self, event: HavenEvent) {
        let name = event.event_name();
        if self.events.emit(event).is_err() {
            warn!(event = name, "crisis event emitted with no subscribers");
        }
    }

    /// **[ESC-SM-070]** Open a crisis record for a detection
    ///
    /// One open crisis per session: a repeat detection merges its trigger
    /// terms into the existing record and returns it unchanged otherwise.
    /// The audit entry is appended before any state is committed; if the
    /// ledger rejects it, no crisis record is created.
    pub async fn detect(&self, trigger: CrisisTrigger) -> Result<CrisisRecord> {
        let mut state = self.state.write().await;

        if let Some(&crisis_id) = state.open_by_session.get(&trigger.session_id) {
            self.ledger
                .append(
                    AuditAction::CrisisDetected,
                    format!("crisis:{crisis_id}"),
                    "system",
                    json!({
                        "duplicate": true,
                        "session_id": trigger.session_id,
                        "source": trigger.source.as_str(),
                        "merged_terms": &trigger.terms,
                    }),
                )
                .await?;

            let record = state
                .records
                .get_mut(&crisis_id)
                .ok_or(TriageError::CrisisNotFound { crisis_id })?;
            record.trigger_terms.extend(trigger.terms);

            debug!(crisis_id = %crisis_id, "duplicate detection merged into open crisis");
            return Ok(record.clone());
        }

        let record = CrisisRecord::new(
            trigger.student_ref_hash,
            trigger.session_id,
            trigger.source,
            trigger.terms,
            self.escalation_path.clone(),
        );

        self.ledger
            .append(
                AuditAction::CrisisDetected,
                format!("crisis:{}", record.crisis_id),
                "system",
                json!({
                    "duplicate": false,
                    "session_id": record.session_id,
                    "student_ref_hash": &record.student_ref_hash,
                    "source": record.trigger.as_str(),
                    "terms": &record.trigger_terms,
                }),
            )
            .await?;

        state.open_by_session.insert(record.session_id, record.crisis_id);
        state.records.insert(record.crisis_id, record.clone());

        info!(
            crisis_id = %record.crisis_id,
            source = record.trigger.as_str(),
            "crisis detected"
        );
        self.emit_or_warn(HavenEvent::CrisisDetected {
            crisis_id: record.crisis_id,
            session_id: record.session_id,
            trigger: record.trigger,
            timestamp: Utc::now(),
        });

        Ok(record)
    }

    /// **[ESC-SM-080]** Dispatch counselor notification and start the
    /// acknowledgment timer
    pub async fn notify(self: &Arc<Self>, crisis_id: Uuid) -> Result<CrisisRecord> {
        let mut state = self.state.write().await;
        let record = state
            .records
            .get(&crisis_id)
            .ok_or(TriageError::CrisisNotFound { crisis_id })?;

        let mut updated = record.clone();
        let from = apply_transition(&mut updated, CrisisState::Notifying)?;

        self.ledger
            .append(
                AuditAction::CrisisTransition,
                format!("crisis:{crisis_id}"),
                "system",
                json!({
                    "from": from.as_str(),
                    "to": updated.state.as_str(),
                    "tier": updated.current_tier_name(),
                }),
            )
            .await?;

        self.arm_ack_timer(&mut state, crisis_id);
        let engaged_tier = updated.current_tier_name().map(String::from);
        state.records.insert(crisis_id, updated.clone());

        info!(
            crisis_id = %crisis_id,
            tier = engaged_tier.as_deref().unwrap_or("none"),
            timeout_secs = self.ack_timeout().as_secs(),
            "counselor notification dispatched"
        );
        self.emit_or_warn(HavenEvent::CrisisStateChanged {
            crisis_id,
            old_state: from,
            new_state: updated.state,
            engaged_tier,
            timestamp: Utc::now(),
        });

        Ok(updated)
    }

    /// **[ESC-TMR-010]** React to an elapsed acknowledgment timer
    ///
    /// The acknowledgment may have raced the timer: the state is re-checked
    /// under the write lock and a stale fire is a logged no-op. Otherwise
    /// NOTIFYING escalates to ESCALATED and the next contact tier is
    /// engaged; an already-ESCALATED record just advances another tier.
    /// When the path is exhausted the last tier stays engaged and no new
    /// timer is armed.
    async fn handle_ack_timeout(self: &Arc<Self>, crisis_id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        let record = state
            .records
            .get(&crisis_id)
            .ok_or(TriageError::CrisisNotFound { crisis_id })?;

        if !record.state.is_awaiting_ack() {
            debug!(
                crisis_id = %crisis_id,
                state = %record.state,
                "stale acknowledgment timer fire ignored"
            );
            state.ack_timers.remove(&crisis_id);
            return Ok(());
        }

        let mut updated = record.clone();
        let from = updated.state;
        if from == CrisisState::Notifying {
            apply_transition(&mut updated, CrisisState::Escalated)?;
        }
        let next_tier = updated.advance_tier().map(String::from);

        self.ledger
            .append(
                AuditAction::EscalationTimerFired,
                format!("crisis:{crisis_id}"),
                "system",
                json!({
                    "from": from.as_str(),
                    "to": updated.state.as_str(),
                    "next_tier": &next_tier,
                }),
            )
            .await?;

        state.ack_timers.remove(&crisis_id);
        if next_tier.is_some() {
            self.arm_ack_timer(&mut state, crisis_id);
        } else {
            warn!(
                crisis_id = %crisis_id,
                last_tier = updated.current_tier_name().unwrap_or("none"),
                "escalation path exhausted; last tier stays engaged"
            );
        }
        let engaged_tier = updated.current_tier_name().map(String::from);
        let new_state = updated.state;
        state.records.insert(crisis_id, updated);

        warn!(
            crisis_id = %crisis_id,
            from = from.as_str(),
            next_tier = next_tier.as_deref().unwrap_or("none"),
            "acknowledgment timed out"
        );
        self.emit_or_warn(HavenEvent::EscalationTimerElapsed {
            crisis_id,
            next_tier,
            timestamp: Utc::now(),
        });
        if new_state != from {
            self.emit_or_warn(HavenEvent::CrisisStateChanged {
                crisis_id,
                old_state: from,
                new_state,
                engaged_tier,
                timestamp: Utc::now(),
            });
        }

        Ok(())
    }

    /// Start (or restart) the acknowledgment timer for a crisis
    fn arm_ack_timer(self: &Arc<Self>, state: &mut EscalationState, crisis_id: Uuid) {
        let token = CancellationToken::new();
        state.ack_timers.insert(crisis_id, token.clone());

        let manager = Arc::clone(self);
        let timeout = self.ack_timeout();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    if let Err(e) = manager.handle_ack_timeout(crisis_id).await {
                        error!(
                            crisis_id = %crisis_id,
                            error = %e,
                            "acknowledgment timeout handling failed"
                        );
                    }
                }
            }
        });
    }

    /// **[ESC-SM-090]** A human takes ownership
    ///
    /// Legal from NOTIFYING and from ESCALATED. Cancels the pending
    /// acknowledgment timer.
    pub async fn acknowledge(&self, crisis_id: Uuid, actor: &str) -> Result<CrisisRecord> {
        let mut state = self.state.write().await;
        let record = state
            .records
            .get(&crisis_id)
            .ok_or(TriageError::CrisisNotFound { crisis_id })?;

        let mut updated = record.clone();
        let from = apply_transition(&mut updated, CrisisState::Acknowledged)?;
        updated.acknowledged_by = Some(actor.to_string());

        self.ledger
            .append(
                AuditAction::CrisisTransition,
                format!("crisis:{crisis_id}"),
                actor,
                json!({
                    "from": from.as_str(),
                    "to": updated.state.as_str(),
                }),
            )
            .await?;

        if let Some(token) = state.ack_timers.remove(&crisis_id) {
            token.cancel();
        }
        let engaged_tier = updated.current_tier_name().map(String::from);
        state.records.insert(crisis_id, updated.clone());

        info!(crisis_id = %crisis_id, actor, "crisis acknowledged");
        self.emit_or_warn(HavenEvent::CrisisStateChanged {
            crisis_id,
            old_state: from,
            new_state: updated.state,
            engaged_tier,
            timestamp: Utc::now(),
        });

        Ok(updated)
    }

    /// Intervention begins
    pub async fn begin_progress(&self, crisis_id: Uuid, actor: &str) -> Result<CrisisRecord> {
        let mut state = self.state.write().await;
        let record = state
            .records
            .get(&crisis_id)
            .ok_or(TriageError::CrisisNotFound { crisis_id })?;

        let mut updated = record.clone();
        let from = apply_transition(&mut updated, CrisisState::InProgress)?;

        self.ledger
            .append(
                AuditAction::CrisisTransition,
                format!("crisis:{crisis_id}"),
                actor,
                json!({
                    "from": from.as_str(),
                    "to": updated.state.as_str(),
                }),
            )
            .await?;

        let engaged_tier = updated.current_tier_name().map(String::from);
        state.records.insert(crisis_id, updated.clone());

        info!(crisis_id = %crisis_id, actor, "intervention in progress");
        self.emit_or_warn(HavenEvent::CrisisStateChanged {
            crisis_id,
            old_state: from,
            new_state: updated.state,
            engaged_tier,
            timestamp: Utc::now(),
        });

        Ok(updated)
    }

    /// **[ESC-SM-100]** Conclude the intervention
    ///
    /// RESOLVED is terminal: the session reopens for fresh detections and the
    /// record stays retained for audit.
    pub async fn resolve(
        &self,
        crisis_id: Uuid,
        actor: &str,
        notes: &str,
    ) -> Result<CrisisRecord> {
        let mut state = self.state.write().await;
        let record = state
            .records
            .get(&crisis_id)
            .ok_or(TriageError::CrisisNotFound { crisis_id })?;

        let mut updated = record.clone();
        let from = apply_transition(&mut updated, CrisisState::Resolved)?;
        updated.resolution_notes = Some(notes.to_string());

        self.ledger
            .append(
                AuditAction::CrisisTransition,
                format!("crisis:{crisis_id}"),
                actor,
                json!({
                    "from": from.as_str(),
                    "to": updated.state.as_str(),
                    "notes": notes,
                }),
            )
            .await?;

        if let Some(token) = state.ack_timers.remove(&crisis_id) {
            token.cancel();
        }
        state.open_by_session.remove(&updated.session_id);
        state.records.insert(crisis_id, updated.clone());

        info!(crisis_id = %crisis_id, actor, "crisis resolved");
        self.emit_or_warn(HavenEvent::CrisisStateChanged {
            crisis_id,
            old_state: from,
            new_state: updated.state,
            engaged_tier: None,
            timestamp: Utc::now(),
        });

        Ok(updated)
    }

    /// Fetch one crisis record
    pub async fn get(&self, crisis_id: Uuid) -> Option<CrisisRecord> {
        self.state.read().await.records.get(&crisis_id).cloned()
    }

    /// The open (non-resolved) crisis for a session, if any
    pub async fn open_crisis_for_session(&self, session_id: Uuid) -> Option<CrisisRecord> {
        let state = self.state.read().await;
        let crisis_id = state.open_by_session.get(&session_id)?;
        state.records.get(crisis_id).cloned()
    }

    /// Copy of all crisis records, open and resolved
    pub async fn records_snapshot(&self) -> Vec<CrisisRecord> {
        self.state.read().await.records.values().cloned().collect()
    }

    /// Number of open crises
    pub async fn open_count(&self) -> usize {
        self.state.read().await.open_by_session.len()
    }
}

/// Apply a state-machine transition, mapping rejection to a typed error
///
/// On rejection the record is untouched.
fn apply_transition(record: &mut CrisisRecord, to: CrisisState) -> Result<CrisisState> {
    let from = record.state;
    if record.transition_to(to).is_err() {
        return Err(TriageError::TransitionRejected {
            crisis_id: record.crisis_id,
            from,
            to,
        });
    }
    Ok(from)
}
