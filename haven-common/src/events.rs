//! Event types for the Haven event system
//!
//! Provides shared event definitions and EventBus for the safety core crates.

use crate::types::{CrisisState, RiskLevel, TriggerSource};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Haven safety core event types
///
/// Events are broadcast via EventBus; the notification dispatcher and ops
/// tooling subscribe. Per EVT-010 all events use this central enum for type
/// safety and exhaustive matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HavenEvent {
    /// A message finished screening
    ///
    /// Triggers:
    /// - Ops dashboard: classification volume counters
    MessageScanned {
        /// Message that was screened
        message_id: Uuid,
        /// Session the message belongs to
        session_id: Uuid,
        /// Final classification
        risk_level: RiskLevel,
        /// Combined risk score
        risk_score: f64,
        /// When screening completed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Screening degraded to the fail-closed path
    ///
    /// Triggers:
    /// - Ops alerting: scan stage failures need investigation
    ScanDegraded {
        /// Message whose scan degraded
        message_id: Uuid,
        /// What failed inside the pipeline
        reason: String,
        /// When the degradation occurred
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A new crisis was detected
    ///
    /// Triggers:
    /// - Notification dispatcher: page the first contact tier
    /// - Ops dashboard: live crisis count
    CrisisDetected {
        /// New crisis record identifier
        crisis_id: Uuid,
        /// Session the triggering message belonged to
        session_id: Uuid,
        /// What produced the detection
        trigger: TriggerSource,
        /// When the crisis was detected
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A crisis record changed state
    ///
    /// Triggers:
    /// - Notification dispatcher: NOTIFYING and ESCALATED engage a contact
    ///   tier; RESOLVED closes the incident channel
    /// - Ops dashboard: live crisis board
    CrisisStateChanged {
        /// Crisis record identifier
        crisis_id: Uuid,
        /// State before the transition
        old_state: CrisisState,
        /// State after the transition
        new_state: CrisisState,
        /// Contact tier currently engaged (None once resolved)
        engaged_tier: Option<String>,
        /// When the transition occurred
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// An acknowledgment timer elapsed
    ///
    /// Emitted whether or not a further tier was available; when the path is
    /// exhausted `next_tier` is None and the last tier stays engaged.
    ///
    /// Triggers:
    /// - Notification dispatcher: page the next contact tier
    EscalationTimerElapsed {
        /// Crisis record identifier
        crisis_id: Uuid,
        /// Newly engaged contact tier, if any remained
        next_tier: Option<String>,
        /// When the timer fired
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Audit chain verification detected tampering or corruption
    ///
    /// Triggers:
    /// - Ops alerting: fatal integrity signal, operator escalation
    IntegrityAlert {
        /// Sequence number of the first failing entry, if known
        first_bad_sequence: Option<u64>,
        /// Why verification failed
        reason: String,
        /// When verification failed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Screening content artifacts were loaded
    ///
    /// Triggers:
    /// - Ops dashboard: active content versions
    ContentLoaded {
        /// Term table version tag
        term_table_version: String,
        /// Clinical pattern library version tag
        pattern_library_version: String,
        /// When the content was loaded
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl HavenEvent {
    /// Get event type name for logging and routing
    pub fn event_name(&self) -> &'static str {
        match self {
            HavenEvent::MessageScanned { .. } => "MessageScanned",
            HavenEvent::ScanDegraded { .. } => "ScanDegraded",
            HavenEvent::CrisisDetected { .. } => "CrisisDetected",
            HavenEvent::CrisisStateChanged { .. } => "CrisisStateChanged",
            HavenEvent::EscalationTimerElapsed { .. } => "EscalationTimerElapsed",
            HavenEvent::IntegrityAlert { .. } => "IntegrityAlert",
            HavenEvent::ContentLoaded { .. } => "ContentLoaded",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for safety core events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use haven_common::events::{EventBus, HavenEvent};
/// use std::sync::Arc;
/// use uuid::Uuid;
///
/// let event_bus = Arc::new(EventBus::new(1000));
///
/// // Subscribe to events
/// let mut rx = event_bus.subscribe();
///
/// // Emit an event
/// event_bus.emit(HavenEvent::ScanDegraded {
///     message_id: Uuid::new_v4(),
///     reason: "pattern library unavailable".to_string(),
///     timestamp: chrono::Utc::now(),
/// }).ok();
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<HavenEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    ///
    ///   Recommended values: 1000 for deployments, 10-100 for tests
    ///
    /// # Examples
    ///
    /// ```
    /// use haven_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(1000);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Returns a receiver that will receive all events emitted after
    /// subscription. Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<HavenEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening. Per EVT-ERR-010 the
    /// first component to detect an error emits the event; errors are not
    /// propagated through multiple layers.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: HavenEvent,
    ) -> Result<usize, broadcast::error::SendError<HavenEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// Used for events where it's acceptable if no component is currently
    /// listening (e.g. MessageScanned volume telemetry).
    pub fn emit_lossy(&self, event: HavenEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    ///
    /// Useful for debugging and monitoring
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_subscriber_receives_emitted_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let crisis_id = Uuid::new_v4();
        bus.emit(HavenEvent::CrisisDetected {
            crisis_id,
            session_id: Uuid::new_v4(),
            trigger: TriggerSource::KeywordMatch,
            timestamp: Utc::now(),
        })
        .unwrap();

        match rx.recv().await.unwrap() {
            HavenEvent::CrisisDetected { crisis_id: id, .. } => assert_eq!(id, crisis_id),
            other => panic!("unexpected event: {}", other.event_name()),
        }
    }

    #[test]
    fn test_emit_without_subscribers_errors_but_lossy_does_not_panic() {
        let bus = EventBus::new(16);

        let event = HavenEvent::IntegrityAlert {
            first_bad_sequence: Some(3),
            reason: "hash mismatch".to_string(),
            timestamp: Utc::now(),
        };

        assert!(bus.emit(event.clone()).is_err());
        bus.emit_lossy(event);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_serialization_carries_type_tag() {
        let event = HavenEvent::ContentLoaded {
            term_table_version: "terms-v1".to_string(),
            pattern_library_version: "clinical-v1".to_string(),
            timestamp: Utc::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"ContentLoaded\""));

        let back: HavenEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_name(), "ContentLoaded");
    }
}
