//! Layer 2: clinical pattern analysis
//!
//! **[SCD-SEM-030]** Maps matched phrases onto PHQ-9 / GAD-7 questionnaire
//! items and aggregates per-item maximum severities into bounded instrument
//! scores. Like the keyword layer this is pure pattern matching over
//! normalized text; the clinical knowledge lives in the reviewed pattern
//! library, not in code.

use std::collections::{BTreeMap, BTreeSet};

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};

use haven_common::types::{ClinicalFramework, ClinicalMarker, SemanticAnalysis};

use crate::content::{ClinicalPattern, FactorLexicon, PatternLibrary};
use crate::error::{Result, TriageError};
use crate::normalize::{is_word_bounded, Normalized};

/// Automaton plus parallel lexicon labels for contextual factor matching
struct FactorMatcher {
    automaton: AhoCorasick,
    labels: Vec<String>,
}

impl FactorMatcher {
    fn new(lexicons: &[FactorLexicon]) -> Result<Option<Self>> {
        let mut phrases = Vec::new();
        let mut labels = Vec::new();
        for lexicon in lexicons {
            for phrase in &lexicon.phrases {
                phrases.push(phrase.clone());
                labels.push(lexicon.label.clone());
            }
        }
        if phrases.is_empty() {
            return Ok(None);
        }
        let automaton = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::LeftmostLongest)
            .build(&phrases)
            .map_err(|e| TriageError::Content(format!("factor automaton build error: {e}")))?;
        Ok(Some(FactorMatcher { automaton, labels }))
    }

    /// Distinct lexicon labels with at least one word-bounded match
    fn matched_labels(&self, input: &Normalized) -> BTreeSet<String> {
        let mut labels = BTreeSet::new();
        for mat in self.automaton.find_iter(&input.text) {
            if is_word_bounded(&input.text, mat.start(), mat.end()) {
                labels.insert(self.labels[mat.pattern().as_usize()].clone());
            }
        }
        labels
    }
}

/// **[SCD-SEM-050]** Semantic analyzer over a versioned pattern library
pub struct SemanticAnalyzer {
    version: String,
    automaton: AhoCorasick,
    patterns: Vec<ClinicalPattern>,
    critical: BTreeSet<(ClinicalFramework, u8)>,
    risk: Option<FactorMatcher>,
    protective: Option<FactorMatcher>,
}

impl SemanticAnalyzer {
    pub fn new(library: &PatternLibrary) -> Result<Self> {
        let phrases: Vec<&str> = library.patterns.iter().map(|p| p.phrase.as_str()).collect();
        let automaton = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::LeftmostLongest)
            .build(&phrases)
            .map_err(|e| TriageError::Content(format!("pattern automaton build error: {e}")))?;

        let critical = library
            .critical_items
            .iter()
            .map(|c| (c.framework, c.item))
            .collect();

        Ok(SemanticAnalyzer {
            version: library.version.clone(),
            automaton,
            patterns: library.patterns.clone(),
            critical,
            risk: FactorMatcher::new(&library.risk_factors)?,
            protective: FactorMatcher::new(&library.protective_factors)?,
        })
    }

    /// Pattern library version this analyzer was built from
    pub fn version(&self) -> &str {
        &self.version
    }

    /// **[SCD-SEM-060]** Analyze one normalized message
    ///
    /// Per-item severities combine by maximum, never sum: a message that
    /// phrases the same complaint five ways scores the item once. Instrument
    /// aggregates are capped at the questionnaire maxima (27 / 21).
    pub fn analyze(&self, input: &Normalized) -> SemanticAnalysis {
        let mut matched_indices: BTreeSet<usize> = BTreeSet::new();
        for mat in self.automaton.find_iter(&input.text) {
            if is_word_bounded(&input.text, mat.start(), mat.end()) {
                matched_indices.insert(mat.pattern().as_usize());
            }
        }

        let mut markers = Vec::with_capacity(matched_indices.len());
        let mut item_max: BTreeMap<(ClinicalFramework, u8), u8> = BTreeMap::new();
        for &i in &matched_indices {
            let p = &self.patterns[i];
            markers.push(ClinicalMarker {
                framework: p.framework,
                item: p.item,
                severity: p.severity,
                matched_text: p.phrase.clone(),
                is_critical: self.critical.contains(&(p.framework, p.item)),
            });
            let max = item_max.entry((p.framework, p.item)).or_insert(0);
            *max = (*max).max(p.severity);
        }

        let mut phq9_score: u8 = 0;
        let mut gad7_score: u8 = 0;
        for (&(framework, _), &severity) in &item_max {
            match framework {
                ClinicalFramework::Phq9 => phq9_score += severity,
                ClinicalFramework::Gad7 => gad7_score += severity,
            }
        }
        phq9_score = phq9_score.min(ClinicalFramework::Phq9.score_cap());
        gad7_score = gad7_score.min(ClinicalFramework::Gad7.score_cap());

        let risk_factors = self
            .risk
            .as_ref()
            .map(|m| m.matched_labels(input))
            .unwrap_or_default();
        let protective_factors = self
            .protective
            .as_ref()
            .map(|m| m.matched_labels(input))
            .unwrap_or_default();

        let confidence = confidence_for(&markers);

        SemanticAnalysis {
            markers,
            phq9_score,
            gad7_score,
            risk_factors,
            protective_factors,
            confidence,
        }
    }
}

/// Assessment confidence from match evidence
///
/// Starts at the no-signal floor of 0.25 and rises with the number of
/// distinct markers and with longer (more specific) matched phrases.
fn confidence_for(markers: &[ClinicalMarker]) -> f64 {
    let distinct = markers.len().min(4) as f64;
    let long_matches = markers
        .iter()
        .filter(|m| m.matched_text.len() >= 15)
        .count()
        .min(2) as f64;
    (0.25 + 0.15 * distinct + 0.05 * long_matches).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::PatternLibrary;
    use crate::normalize::normalize;

    fn analyzer() -> SemanticAnalyzer {
        let library = PatternLibrary::from_toml_str(
            r#"
                version = "clin-test-1"

                [[critical_items]]
                framework = "phq9"
                item = 9

                [[patterns]]
                framework = "phq9"
                item = 2
                phrase = "feel sad"
                severity = 1

                [[patterns]]
                framework = "phq9"
                item = 2
                phrase = "feel hopeless"
                severity = 2

                [[patterns]]
                framework = "phq9"
                item = 2
                phrase = "completely hopeless"
                severity = 3

                [[patterns]]
                framework = "phq9"
                item = 6
                phrase = "worthless"
                severity = 2

                [[patterns]]
                framework = "phq9"
                item = 9
                phrase = "wish i was dead"
                severity = 3

                [[patterns]]
                framework = "gad7"
                item = 1
                phrase = "so anxious"
                severity = 1

                [[risk_factors]]
                label = "isolation"
                phrases = ["all alone"]

                [[protective_factors]]
                label = "help_seeking"
                phrases = ["want help", "need help"]
            "#,
        )
        .unwrap();
        SemanticAnalyzer::new(&library).unwrap()
    }

    #[test]
    fn test_markers_map_to_items() {
        let analysis = analyzer().analyze(&normalize("I feel hopeless and worthless"));
        assert_eq!(analysis.markers.len(), 2);
        assert_eq!(analysis.phq9_score, 4);
        assert_eq!(analysis.gad7_score, 0);
        assert!(!analysis.has_critical_marker());
    }

    #[test]
    fn test_same_item_takes_max_severity_not_sum() {
        let analysis =
            analyzer().analyze(&normalize("I feel sad, feel hopeless, completely hopeless"));
        // Three markers, all item 2: aggregate is max(1, 2, 3) = 3
        assert_eq!(analysis.markers.len(), 3);
        assert_eq!(analysis.phq9_score, 3);
    }

    #[test]
    fn test_critical_item_marker() {
        let analysis = analyzer().analyze(&normalize("sometimes I wish I was dead"));
        assert!(analysis.has_critical_marker());
        assert_eq!(analysis.risk_score(), 1.0);
    }

    #[test]
    fn test_embedded_phrase_does_not_match() {
        // "worthless" inside "worthlessness" is not word-bounded
        let analysis = analyzer().analyze(&normalize("an essay on worthlessness in fiction"));
        assert!(analysis.markers.is_empty());
        assert_eq!(analysis.phq9_score, 0);
    }

    #[test]
    fn test_factor_lexicons() {
        let analysis = analyzer().analyze(&normalize("I feel hopeless, all alone, but I want help"));
        assert!(analysis.risk_factors.contains("isolation"));
        assert!(analysis.protective_factors.contains("help_seeking"));
    }

    #[test]
    fn test_both_frameworks_score_independently() {
        let analysis = analyzer().analyze(&normalize("I feel sad and so anxious"));
        assert_eq!(analysis.phq9_score, 1);
        assert_eq!(analysis.gad7_score, 1);
    }

    #[test]
    fn test_no_signal_floor_confidence() {
        let analysis = analyzer().analyze(&normalize("thinking about lunch options"));
        assert!(analysis.markers.is_empty());
        assert!((analysis.confidence - 0.25).abs() < 1e-9);
        assert_eq!(analysis.risk_score(), 0.0);
    }

    #[test]
    fn test_confidence_rises_with_evidence() {
        let a = analyzer();
        let weak = a.analyze(&normalize("I feel sad"));
        let strong = a.analyze(&normalize("I feel sad, worthless, so anxious, completely hopeless"));
        assert!(strong.confidence > weak.confidence);
        assert!(strong.confidence <= 1.0);
    }
}
