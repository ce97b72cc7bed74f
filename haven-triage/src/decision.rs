//! Risk decision engine
//!
//! **[SCD-DEC-010]** Combines the keyword and semantic layers into one
//! classification. Escalation rules are absolute maxima, never averages: a
//! crisis signal from either layer forces CRISIS outright, and nothing in
//! the other layer can dilute it. Weighted combination applies only below
//! the crisis rules, to separate CAUTION from SAFE.
//!
//! `decide` is a pure function of its inputs. Given the same layer results
//! and thresholds it always returns the same decision, which is what makes
//! classifications re-derivable from the audit trail.

use serde::Serialize;

use haven_common::types::{RiskLevel, SemanticAnalysis, TriggerSource};
use haven_common::PARAMS;

use crate::scanner::LayerOneResult;

/// Decision weights and threshold, captured at scan time
///
/// Snapshotting decouples a scan from concurrent parameter updates: one
/// message is classified under one consistent set of thresholds.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DecisionThresholds {
    /// **[SCD-PARAM-010]** Weight of the keyword layer score
    pub keyword_weight: f64,
    /// **[SCD-PARAM-020]** Weight of the semantic layer score
    pub semantic_weight: f64,
    /// **[SCD-PARAM-030]** Combined score at or above this is CAUTION
    pub caution_threshold: f64,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        DecisionThresholds {
            keyword_weight: 0.6,
            semantic_weight: 0.4,
            caution_threshold: 0.15,
        }
    }
}

impl DecisionThresholds {
    /// Snapshot the current global parameters
    pub fn from_params() -> Self {
        DecisionThresholds {
            keyword_weight: *PARAMS.keyword_weight.read().unwrap(),
            semantic_weight: *PARAMS.semantic_weight.read().unwrap(),
            caution_threshold: *PARAMS.caution_threshold.read().unwrap(),
        }
    }
}

/// Outcome of the decision engine for one message
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub risk_level: RiskLevel,

    /// Final score in [0.0, 1.0]; 1.0 whenever a crisis rule fired
    pub risk_score: f64,

    /// True when the message must bypass response generation
    pub bypass_generation: bool,

    /// Which crisis rule fired, when one did
    pub crisis_trigger: Option<TriggerSource>,

    /// Weighted combination of the two layers, kept for audit detail even
    /// when a crisis rule made it moot
    pub combined_score: f64,
}

/// **[SCD-DEC-020]** Classify one message from its layer results
pub fn decide(
    layer_one: &LayerOneResult,
    semantic: &SemanticAnalysis,
    thresholds: &DecisionThresholds,
) -> Decision {
    let semantic_score = semantic.risk_score();
    let combined = (thresholds.keyword_weight * layer_one.layer_score
        + thresholds.semantic_weight * semantic_score)
        .clamp(0.0, 1.0);

    // Rule 1: any crisis term match is CRISIS, unconditionally
    if layer_one.crisis_matched {
        return Decision {
            risk_level: RiskLevel::Crisis,
            risk_score: 1.0,
            bypass_generation: true,
            crisis_trigger: Some(TriggerSource::KeywordMatch),
            combined_score: combined,
        };
    }

    // Rule 2: any critical questionnaire item endorsement is CRISIS
    if semantic.has_critical_marker() {
        return Decision {
            risk_level: RiskLevel::Crisis,
            risk_score: 1.0,
            bypass_generation: true,
            crisis_trigger: Some(TriggerSource::SemanticCritical),
            combined_score: combined,
        };
    }

    // Rule 3: weighted combination separates CAUTION from SAFE
    let risk_level = if combined >= thresholds.caution_threshold {
        RiskLevel::Caution
    } else {
        RiskLevel::Safe
    };

    Decision {
        risk_level,
        risk_score: combined,
        bypass_generation: false,
        crisis_trigger: None,
        combined_score: combined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use haven_common::types::{ClinicalFramework, ClinicalMarker};
    use std::collections::BTreeSet;

    fn layer(crisis: bool, score: f64, terms: &[&str]) -> LayerOneResult {
        LayerOneResult {
            matched_terms: terms.iter().map(|t| t.to_string()).collect(),
            crisis_matched: crisis,
            layer_score: score,
        }
    }

    fn semantic_with(phq9: u8, critical: bool) -> SemanticAnalysis {
        let markers = if critical {
            vec![ClinicalMarker {
                framework: ClinicalFramework::Phq9,
                item: 9,
                severity: 3,
                matched_text: "wish i was dead".to_string(),
                is_critical: true,
            }]
        } else {
            Vec::new()
        };
        SemanticAnalysis {
            markers,
            phq9_score: phq9,
            gad7_score: 0,
            risk_factors: BTreeSet::new(),
            protective_factors: BTreeSet::new(),
            confidence: 0.5,
        }
    }

    #[test]
    fn test_crisis_term_forces_crisis() {
        let decision = decide(
            &layer(true, 1.0, &["kill myself"]),
            &SemanticAnalysis::none(),
            &DecisionThresholds::default(),
        );
        assert_eq!(decision.risk_level, RiskLevel::Crisis);
        assert_eq!(decision.risk_score, 1.0);
        assert!(decision.bypass_generation);
        assert_eq!(decision.crisis_trigger, Some(TriggerSource::KeywordMatch));
    }

    #[test]
    fn test_critical_marker_forces_crisis() {
        let decision = decide(
            &layer(false, 0.0, &[]),
            &semantic_with(3, true),
            &DecisionThresholds::default(),
        );
        assert_eq!(decision.risk_level, RiskLevel::Crisis);
        assert_eq!(decision.risk_score, 1.0);
        assert!(decision.bypass_generation);
        assert_eq!(
            decision.crisis_trigger,
            Some(TriggerSource::SemanticCritical)
        );
    }

    #[test]
    fn test_nothing_dilutes_a_crisis_signal() {
        // A protective factor and a calm semantic layer cannot average a
        // crisis term down
        let mut semantic = SemanticAnalysis::none();
        semantic
            .protective_factors
            .insert("help_seeking".to_string());
        let decision = decide(
            &layer(true, 1.0, &["suicide"]),
            &semantic,
            &DecisionThresholds::default(),
        );
        assert_eq!(decision.risk_level, RiskLevel::Crisis);
        assert_eq!(decision.risk_score, 1.0);
    }

    #[test]
    fn test_weighted_combination_yields_caution() {
        // "hopeless" + "worthless": layer 1 - 0.65^2, PHQ-9 items 2 and 6
        // at severity 2 each
        let decision = decide(
            &layer(false, 0.5775, &["hopeless", "worthless"]),
            &semantic_with(4, false),
            &DecisionThresholds::default(),
        );
        assert_eq!(decision.risk_level, RiskLevel::Caution);
        assert!(!decision.bypass_generation);
        assert!(decision.crisis_trigger.is_none());
        // 0.6 * 0.5775 + 0.4 * 0.55 * (4 / 27)
        assert!((decision.risk_score - 0.37909).abs() < 1e-3);
    }

    #[test]
    fn test_below_threshold_is_safe() {
        let decision = decide(
            &layer(false, 0.0, &[]),
            &semantic_with(1, false),
            &DecisionThresholds::default(),
        );
        assert_eq!(decision.risk_level, RiskLevel::Safe);
        assert!(!decision.bypass_generation);
        assert!(decision.risk_score < 0.15);
    }

    #[test]
    fn test_exactly_at_threshold_is_caution() {
        let thresholds = DecisionThresholds {
            keyword_weight: 1.0,
            semantic_weight: 0.0,
            caution_threshold: 0.25,
        };
        let decision = decide(&layer(false, 0.25, &[]), &SemanticAnalysis::none(), &thresholds);
        assert_eq!(decision.risk_level, RiskLevel::Caution);
    }

    #[test]
    fn test_combined_score_is_clamped() {
        let thresholds = DecisionThresholds {
            keyword_weight: 0.9,
            semantic_weight: 0.9,
            caution_threshold: 0.15,
        };
        let decision = decide(
            &layer(false, 0.9, &[]),
            &semantic_with(27, false),
            &thresholds,
        );
        assert!(decision.risk_score <= 1.0);
    }

    #[test]
    fn test_decision_is_deterministic() {
        let l = layer(false, 0.3, &["give up"]);
        let s = semantic_with(2, false);
        let t = DecisionThresholds::default();
        let a = decide(&l, &s, &t);
        let b = decide(&l, &s, &t);
        assert_eq!(a.risk_level, b.risk_level);
        assert_eq!(a.risk_score, b.risk_score);
    }
}
