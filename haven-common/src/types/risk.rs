//! Risk classification types

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// **[SCD-RISK-010]** Message risk classification level
///
/// The derived `Ord` is meaningful: `Safe < Caution < Crisis`. Combination
/// logic always takes the maximum of contributing levels, never an average,
/// so a crisis signal can never be diluted by benign surrounding signals.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// No concerning content detected
    Safe,
    /// Elevated concern; reply proceeds with supportive framing
    Caution,
    /// Imminent-risk content; generation is bypassed and escalation begins
    Crisis,
}

impl RiskLevel {
    /// Stable string form used in audit entries and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Safe => "safe",
            RiskLevel::Caution => "caution",
            RiskLevel::Crisis => "crisis",
        }
    }

    /// Whether this level suppresses generative reply composition
    pub fn bypasses_generation(&self) -> bool {
        matches!(self, RiskLevel::Crisis)
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// **[SCD-RISK-020]** Outcome of screening one message
///
/// Produced exactly once per message and never mutated afterwards; the audit
/// ledger and the generative layer both receive this same value. The content
/// version tags record which term table and pattern library snapshot produced
/// the decision, so any historical classification can be reproduced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    /// Message this result classifies
    pub message_id: Uuid,

    /// Final classification
    pub risk_level: RiskLevel,

    /// Combined risk score in [0.0, 1.0]
    ///
    /// Fixed at 1.0 whenever `risk_level` is `Crisis`.
    pub risk_score: f64,

    /// Terms and phrases that contributed to the classification
    pub matched_terms: BTreeSet<String>,

    /// When true the generative layer must not compose a reply
    pub bypass_generation: bool,

    /// Wall-clock scan duration in microseconds
    pub scan_latency_us: u64,

    /// Version tag of the term table active at scan time
    pub term_table_version: String,

    /// Version tag of the clinical pattern library active at scan time
    pub pattern_library_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::Safe < RiskLevel::Caution);
        assert!(RiskLevel::Caution < RiskLevel::Crisis);

        // Max-combination escalates, never dilutes
        let combined = RiskLevel::Safe.max(RiskLevel::Crisis);
        assert_eq!(combined, RiskLevel::Crisis);
    }

    #[test]
    fn test_only_crisis_bypasses_generation() {
        assert!(!RiskLevel::Safe.bypasses_generation());
        assert!(!RiskLevel::Caution.bypasses_generation());
        assert!(RiskLevel::Crisis.bypasses_generation());
    }

    #[test]
    fn test_risk_level_serde_lowercase() {
        let json = serde_json::to_string(&RiskLevel::Crisis).unwrap();
        assert_eq!(json, "\"crisis\"");
        let back: RiskLevel = serde_json::from_str("\"caution\"").unwrap();
        assert_eq!(back, RiskLevel::Caution);
    }
}
