//! End-to-end screening pipeline tests
//!
//! Runs the full engine (shipped content artifacts, real ledger, real
//! escalation manager) against representative messages.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use haven_audit::{AuditAction, AuditLedger, AuditQuery};
use haven_common::events::{EventBus, HavenEvent};
use haven_common::redact::Pseudonymizer;
use haven_common::types::{Message, RiskLevel, TriggerSource};
use haven_triage::{ContentSet, EscalationManager, TriageEngine};
use uuid::Uuid;

fn shipped_content() -> ContentSet {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("content");
    ContentSet::load(&dir).expect("shipped content loads")
}

async fn engine() -> TriageEngine {
    let ledger = Arc::new(AuditLedger::new());
    let events = EventBus::new(256);
    let escalation = Arc::new(
        EscalationManager::new(Arc::clone(&ledger), events.clone())
            .with_ack_timeout(Duration::from_secs(3600)),
    );
    TriageEngine::new(
        &shipped_content(),
        ledger,
        events,
        escalation,
        Pseudonymizer::ephemeral(),
    )
    .await
    .expect("engine builds")
}

#[tokio::test]
async fn test_explicit_crisis_statement() {
    let engine = engine().await;
    let session = Uuid::new_v4();

    let result = engine
        .scan_message(&Message::new("I want to kill myself", "student-1", session))
        .await
        .unwrap();

    assert_eq!(result.risk_level, RiskLevel::Crisis);
    assert_eq!(result.risk_score, 1.0);
    assert!(result.bypass_generation);
    assert!(result.matched_terms.contains("kill myself"));

    let crisis = engine
        .escalation()
        .open_crisis_for_session(session)
        .await
        .expect("crisis opened");
    assert_eq!(crisis.trigger, TriggerSource::KeywordMatch);
    assert!(crisis.trigger_terms.contains("kill myself"));
}

#[tokio::test]
async fn test_mild_stress_is_safe() {
    let engine = engine().await;
    let session = Uuid::new_v4();

    let result = engine
        .scan_message(&Message::new(
            "I'm a bit stressed about exams",
            "student-1",
            session,
        ))
        .await
        .unwrap();

    assert_eq!(result.risk_level, RiskLevel::Safe);
    assert!(!result.bypass_generation);
    assert!(result.matched_terms.is_empty());
    assert!(engine
        .escalation()
        .open_crisis_for_session(session)
        .await
        .is_none());
}

#[tokio::test]
async fn test_distress_without_crisis_language_is_caution() {
    let engine = engine().await;
    let session = Uuid::new_v4();

    let result = engine
        .scan_message(&Message::new(
            "I feel hopeless and worthless",
            "student-1",
            session,
        ))
        .await
        .unwrap();

    assert_eq!(result.risk_level, RiskLevel::Caution);
    assert!(!result.bypass_generation);
    assert!(result.matched_terms.contains("hopeless"));
    assert!(result.matched_terms.contains("worthless"));
    assert!(result.risk_score > 0.15 && result.risk_score < 1.0);

    // Caution informs the reply tone; it opens no crisis
    assert!(engine
        .escalation()
        .open_crisis_for_session(session)
        .await
        .is_none());
}

#[tokio::test]
async fn test_obfuscated_crisis_language() {
    let engine = engine().await;

    for text in ["I want to k1ll myself", "k i l l m y s e l f", "ki\u{200B}ll myself"] {
        let result = engine
            .scan_message(&Message::new(text, "student-1", Uuid::new_v4()))
            .await
            .unwrap();
        assert_eq!(result.risk_level, RiskLevel::Crisis, "text: {text:?}");
        assert!(result.bypass_generation);
    }
}

#[tokio::test]
async fn test_critical_clinical_marker_forces_crisis() {
    let engine = engine().await;
    let session = Uuid::new_v4();

    // No crisis term matches here; the PHQ-9 item 9 pattern drives it
    let result = engine
        .scan_message(&Message::new(
            "sometimes I wish I was dead",
            "student-1",
            session,
        ))
        .await
        .unwrap();

    assert_eq!(result.risk_level, RiskLevel::Crisis);
    let crisis = engine
        .escalation()
        .open_crisis_for_session(session)
        .await
        .expect("crisis opened");
    assert_eq!(crisis.trigger, TriggerSource::SemanticCritical);
}

#[tokio::test]
async fn test_empty_message_is_safe() {
    let engine = engine().await;

    let result = engine
        .scan_message(&Message::new("", "student-1", Uuid::new_v4()))
        .await
        .unwrap();

    assert_eq!(result.risk_level, RiskLevel::Safe);
    assert_eq!(result.risk_score, 0.0);
    assert!(result.matched_terms.is_empty());
}

#[tokio::test]
async fn test_repeat_crisis_in_session_merges_into_one_record() {
    let engine = engine().await;
    let session = Uuid::new_v4();

    engine
        .scan_message(&Message::new("I want to kill myself", "student-1", session))
        .await
        .unwrap();
    engine
        .scan_message(&Message::new("thinking about suicide", "student-1", session))
        .await
        .unwrap();

    assert_eq!(engine.escalation().open_count().await, 1);
    let crisis = engine
        .escalation()
        .open_crisis_for_session(session)
        .await
        .unwrap();
    assert!(crisis.trigger_terms.contains("kill myself"));
    assert!(crisis.trigger_terms.contains("suicide"));

    // Both detections are audited, duplicate included
    let detections = engine
        .ledger()
        .query(&AuditQuery {
            action: Some(AuditAction::CrisisDetected),
            ..Default::default()
        })
        .await;
    assert_eq!(detections.len(), 2);
}

#[tokio::test]
async fn test_batch_scan_audits_every_message_and_chain_verifies() {
    let engine = engine().await;
    let texts = [
        "hey, how is everyone doing",
        "I feel hopeless about this class",
        "I want to kill myself",
        "what time is the review session",
        "I hate myself and want to disappear",
    ];

    for text in texts {
        engine
            .scan_message(&Message::new(text, "student-1", Uuid::new_v4()))
            .await
            .unwrap();
    }

    let scans = engine
        .ledger()
        .query(&AuditQuery {
            action: Some(AuditAction::MessageScanned),
            ..Default::default()
        })
        .await;
    assert_eq!(scans.len(), texts.len());

    // Every scan entry names its content versions
    for entry in &scans {
        assert_eq!(entry.details["term_table_version"], "2026.08.1");
        assert_eq!(entry.details["pattern_library_version"], "2026.08.1");
    }

    engine.ledger().verify().await.expect("chain verifies");

    let metrics = engine.metrics();
    assert_eq!(metrics.scanned_total, texts.len() as u64);
    assert_eq!(metrics.crisis_total, 1);
    assert_eq!(metrics.caution_total, 2);
    assert_eq!(metrics.fail_closed_total, 0);
}

#[tokio::test]
async fn test_classification_is_deterministic() {
    let engine = engine().await;
    let text = "I feel hopeless and want to give up";

    let a = engine
        .scan_message(&Message::new(text, "student-1", Uuid::new_v4()))
        .await
        .unwrap();
    let b = engine
        .scan_message(&Message::new(text, "student-2", Uuid::new_v4()))
        .await
        .unwrap();

    assert_eq!(a.risk_level, b.risk_level);
    assert_eq!(a.risk_score, b.risk_score);
    assert_eq!(a.matched_terms, b.matched_terms);
}

#[tokio::test]
async fn test_crisis_scan_emits_events_in_order() {
    let engine = engine().await;
    let mut rx = engine.events().subscribe();
    let session = Uuid::new_v4();

    let result = engine
        .scan_message(&Message::new("I want to kill myself", "student-1", session))
        .await
        .unwrap();

    match rx.recv().await.unwrap() {
        HavenEvent::CrisisDetected {
            session_id,
            trigger,
            ..
        } => {
            assert_eq!(session_id, session);
            assert_eq!(trigger, TriggerSource::KeywordMatch);
        }
        other => panic!("expected CrisisDetected first, got {}", other.event_name()),
    }
    match rx.recv().await.unwrap() {
        HavenEvent::MessageScanned {
            message_id,
            risk_level,
            ..
        } => {
            assert_eq!(message_id, result.message_id);
            assert_eq!(risk_level, RiskLevel::Crisis);
        }
        other => panic!("expected MessageScanned second, got {}", other.event_name()),
    }
}

#[tokio::test]
async fn test_mixed_clinical_signal_stays_below_crisis() {
    let engine = engine().await;

    // Plenty of symptom language, no crisis terms, no critical item
    let result = engine
        .scan_message(&Message::new(
            "cant sleep, no energy, cant focus, so anxious and worrying nonstop",
            "student-1",
            Uuid::new_v4(),
        ))
        .await
        .unwrap();

    assert_ne!(result.risk_level, RiskLevel::Crisis);
    assert!(!result.bypass_generation);
    assert!(result.risk_score < 1.0);
}
