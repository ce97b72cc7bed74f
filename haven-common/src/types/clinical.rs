//! Clinical screening framework types (PHQ-9 / GAD-7)

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Standardized screening framework a marker maps onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClinicalFramework {
    /// Patient Health Questionnaire (depression), 9 items
    Phq9,
    /// Generalized Anxiety Disorder scale, 7 items
    Gad7,
}

impl ClinicalFramework {
    /// Number of questionnaire items in the framework
    pub fn item_count(&self) -> u8 {
        match self {
            ClinicalFramework::Phq9 => 9,
            ClinicalFramework::Gad7 => 7,
        }
    }

    /// Maximum aggregate score (3 severity points per item)
    pub fn score_cap(&self) -> u8 {
        self.item_count() * 3
    }

    /// Stable string form used in audit entries and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            ClinicalFramework::Phq9 => "phq9",
            ClinicalFramework::Gad7 => "gad7",
        }
    }
}

/// **[SCD-SEM-010]** One detected clinical language marker
///
/// Maps a matched phrase onto a questionnaire item with a severity weight.
/// Multiple phrases can map to the same item; aggregation takes the maximum
/// severity per item, never the sum, so verbose messages do not inflate
/// questionnaire scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicalMarker {
    /// Framework the marker belongs to
    pub framework: ClinicalFramework,

    /// 1-based item number within the framework's questionnaire
    pub item: u8,

    /// Matched severity in [1, 3]
    pub severity: u8,

    /// Normalized text that triggered the marker
    pub matched_text: String,

    /// True when the item is designated critical (PHQ-9 item 9 in the
    /// shipped library); any critical marker saturates the semantic risk
    /// score regardless of aggregates
    pub is_critical: bool,
}

/// **[SCD-SEM-020]** Aggregated semantic analysis of one message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticAnalysis {
    /// All detected markers
    pub markers: Vec<ClinicalMarker>,

    /// Sum of per-item maximum severities, capped at 27
    pub phq9_score: u8,

    /// Sum of per-item maximum severities, capped at 21
    pub gad7_score: u8,

    /// Contextual risk factors detected (lexicon labels)
    pub risk_factors: BTreeSet<String>,

    /// Contextual protective factors detected (lexicon labels)
    pub protective_factors: BTreeSet<String>,

    /// Confidence in [0.0, 1.0] in this assessment
    pub confidence: f64,
}

impl SemanticAnalysis {
    /// Analysis of a message with no clinical signal
    pub fn none() -> Self {
        Self {
            markers: Vec::new(),
            phq9_score: 0,
            gad7_score: 0,
            risk_factors: BTreeSet::new(),
            protective_factors: BTreeSet::new(),
            confidence: 0.25,
        }
    }

    /// True when any marker hit a critical questionnaire item
    pub fn has_critical_marker(&self) -> bool {
        self.markers.iter().any(|m| m.is_critical)
    }

    /// **[SCD-SEM-040]** Normalized semantic risk score in [0.0, 1.0]
    ///
    /// A critical marker saturates the score to 1.0 regardless of aggregate
    /// questionnaire scores. Otherwise the score blends the normalized PHQ-9
    /// and GAD-7 aggregates, nudged up by contextual risk factors and down by
    /// protective factors (0.04 per factor, at most 3 counted each way).
    pub fn risk_score(&self) -> f64 {
        if self.has_critical_marker() {
            return 1.0;
        }

        let phq = self.phq9_score as f64 / ClinicalFramework::Phq9.score_cap() as f64;
        let gad = self.gad7_score as f64 / ClinicalFramework::Gad7.score_cap() as f64;
        let base = 0.55 * phq + 0.45 * gad;

        let lift = 0.04 * self.risk_factors.len().min(3) as f64;
        let damp = 0.04 * self.protective_factors.len().min(3) as f64;

        (base + lift - damp).clamp(0.0, 1.0)
    }
}
