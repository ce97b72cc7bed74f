//! Message triage pipeline
//!
//! `TriageEngine` is the single entry point for screening: normalize, run
//! both scan layers, decide, escalate on crisis, audit. Classification
//! itself is synchronous and infallible once content is loaded; the async
//! edges are escalation and the audit ledger.
//!
//! **[SAF-CLOSED-010]** The pipeline fails closed. A non-crisis message
//! whose audit append fails is degraded to CAUTION with the failure surfaced
//! through logs and a `ScanDegraded` event; it is never reported SAFE on a
//! broken pipeline. A crisis that cannot be recorded is returned as an
//! error, because an unrecorded crisis must block delivery rather than slip
//! through.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use haven_audit::{AuditAction, AuditLedger};
use haven_common::events::{EventBus, HavenEvent};
use haven_common::redact::Pseudonymizer;
use haven_common::types::{Message, RiskLevel, ScanResult};
use haven_common::PARAMS;

use crate::content::ContentSet;
use crate::decision::{decide, DecisionThresholds};
use crate::error::Result;
use crate::escalation::{CrisisTrigger, EscalationManager};
use crate::normalize::normalize;
use crate::scanner::KeywordScanner;
use crate::semantic::SemanticAnalyzer;

/// Operations counters, sampled via `TriageEngine::metrics`
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TriageMetrics {
    pub scanned_total: u64,
    pub crisis_total: u64,
    pub caution_total: u64,
    /// Scans that degraded to the fail-closed caution floor
    pub fail_closed_total: u64,
}

/// **[ARCH-010]** Screening pipeline facade
pub struct TriageEngine {
    scanner: KeywordScanner,
    analyzer: SemanticAnalyzer,
    ledger: Arc<AuditLedger>,
    events: EventBus,
    escalation: Arc<EscalationManager>,
    pseudonymizer: Pseudonymizer,

    scanned_total: AtomicU64,
    crisis_total: AtomicU64,
    caution_total: AtomicU64,
    fail_closed_total: AtomicU64,
}

impl TriageEngine {
    /// Build the engine from loaded content
    ///
    /// Records a `ContentLoaded` audit entry; content whose load cannot be
    /// audited does not go live.
    pub async fn new(
        content: &ContentSet,
        ledger: Arc<AuditLedger>,
        events: EventBus,
        escalation: Arc<EscalationManager>,
        pseudonymizer: Pseudonymizer,
    ) -> Result<Self> {
        let scanner = KeywordScanner::new(&content.terms)?;
        let analyzer = SemanticAnalyzer::new(&content.clinical)?;

        ledger
            .append(
                AuditAction::ContentLoaded,
                "content",
                "system",
                json!({
                    "term_table_version": scanner.version(),
                    "pattern_library_version": analyzer.version(),
                    "crisis_terms": content.terms.crisis_terms.len(),
                    "caution_terms": content.terms.caution_terms.len(),
                    "clinical_patterns": content.clinical.patterns.len(),
                }),
            )
            .await?;

        events.emit_lossy(HavenEvent::ContentLoaded {
            term_table_version: scanner.version().to_string(),
            pattern_library_version: analyzer.version().to_string(),
            timestamp: Utc::now(),
        });
        info!(
            term_table_version = scanner.version(),
            pattern_library_version = analyzer.version(),
            "screening content loaded"
        );

        Ok(TriageEngine {
            scanner,
            analyzer,
            ledger,
            events,
            escalation,
            pseudonymizer,
            scanned_total: AtomicU64::new(0),
            crisis_total: AtomicU64::new(0),
            caution_total: AtomicU64::new(0),
            fail_closed_total: AtomicU64::new(0),
        })
    }

    /// **[SCD-DEC-030]** Screen one message
    ///
    /// Runs every message through both layers before deciding; the keyword
    /// layer is never short-circuited past, so the audit entry always carries
    /// the full evidence. Crisis messages open (or merge into) an escalation
    /// record before the scan result is returned to the caller.
    pub async fn scan_message(&self, message: &Message) -> Result<ScanResult> {
        let started = Instant::now();

        let normalized = normalize(&message.text);
        let layer_one = self.scanner.scan(&normalized);
        let semantic = self.analyzer.analyze(&normalized);
        let thresholds = DecisionThresholds::from_params();
        let decision = decide(&layer_one, &semantic, &thresholds);

        let mut matched_terms = layer_one.matched_terms;
        for marker in &semantic.markers {
            matched_terms.insert(marker.matched_text.clone());
        }

        if let Some(source) = decision.crisis_trigger {
            let student_ref_hash = self.pseudonymizer.hash_ref(&message.student_ref);
            self.escalation
                .detect(CrisisTrigger {
                    student_ref_hash,
                    session_id: message.session_id,
                    source,
                    terms: matched_terms.clone(),
                })
                .await?;
        }

        let elapsed_us = started.elapsed().as_micros() as u64;
        let result = ScanResult {
            message_id: message.message_id,
            risk_level: decision.risk_level,
            risk_score: decision.risk_score,
            matched_terms,
            bypass_generation: decision.bypass_generation,
            scan_latency_us: elapsed_us,
            term_table_version: self.scanner.version().to_string(),
            pattern_library_version: self.analyzer.version().to_string(),
        };

        let append = self
            .ledger
            .append(
                AuditAction::MessageScanned,
                format!("message:{}", message.message_id),
                "system",
                json!({
                    "risk_level": result.risk_level.as_str(),
                    "risk_score": result.risk_score,
                    "combined_score": decision.combined_score,
                    "matched_terms": &result.matched_terms,
                    "phq9_score": semantic.phq9_score,
                    "gad7_score": semantic.gad7_score,
                    "term_table_version": &result.term_table_version,
                    "pattern_library_version": &result.pattern_library_version,
                    "latency_us": elapsed_us,
                }),
            )
            .await;

        if result.risk_level == RiskLevel::Crisis {
            // All-or-nothing: an unaudited crisis blocks delivery
            append?;
        } else if let Err(e) = append {
            let degraded = self.fail_closed(result, &e.to_string(), thresholds.caution_threshold);
            self.record_outcome(&degraded);
            return Ok(degraded);
        }

        let warn_above = *PARAMS.scan_warn_latency_us.read().unwrap();
        if elapsed_us > warn_above {
            warn!(
                message_id = %message.message_id,
                latency_us = elapsed_us,
                warn_above_us = warn_above,
                "slow message scan"
            );
        }

        self.record_outcome(&result);
        self.events.emit_lossy(HavenEvent::MessageScanned {
            message_id: result.message_id,
            session_id: message.session_id,
            risk_level: result.risk_level,
            risk_score: result.risk_score,
            timestamp: Utc::now(),
        });

        Ok(result)
    }

    /// **[SAF-CLOSED-010]** Degrade a non-crisis result to the caution floor
    ///
    /// The classification work already happened; what failed is recording
    /// it. The result keeps its evidence but is floored at CAUTION so the
    /// reply layer treats the message carefully, and the failure is surfaced
    /// instead of swallowed.
    fn fail_closed(&self, mut result: ScanResult, reason: &str, floor_score: f64) -> ScanResult {
        error!(
            message_id = %result.message_id,
            reason,
            "scan pipeline degraded; failing closed to caution"
        );
        self.fail_closed_total.fetch_add(1, Ordering::Relaxed);
        self.events.emit_lossy(HavenEvent::ScanDegraded {
            message_id: result.message_id,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });

        if result.risk_level < RiskLevel::Caution {
            result.risk_level = RiskLevel::Caution;
            result.risk_score = result.risk_score.max(floor_score);
        }
        result
    }

    fn record_outcome(&self, result: &ScanResult) {
        self.scanned_total.fetch_add(1, Ordering::Relaxed);
        match result.risk_level {
            RiskLevel::Crisis => {
                self.crisis_total.fetch_add(1, Ordering::Relaxed);
            }
            RiskLevel::Caution => {
                self.caution_total.fetch_add(1, Ordering::Relaxed);
            }
            RiskLevel::Safe => {}
        }
    }

    /// Snapshot the operations counters
    pub fn metrics(&self) -> TriageMetrics {
        TriageMetrics {
            scanned_total: self.scanned_total.load(Ordering::Relaxed),
            crisis_total: self.crisis_total.load(Ordering::Relaxed),
            caution_total: self.caution_total.load(Ordering::Relaxed),
            fail_closed_total: self.fail_closed_total.load(Ordering::Relaxed),
        }
    }

    /// Active content versions as (term table, pattern library)
    pub fn content_versions(&self) -> (&str, &str) {
        (self.scanner.version(), self.analyzer.version())
    }

    pub fn escalation(&self) -> &Arc<EscalationManager> {
        &self.escalation
    }

    pub fn ledger(&self) -> &Arc<AuditLedger> {
        &self.ledger
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }
}
