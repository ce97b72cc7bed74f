//! Versioned screening content
//!
//! **[CNT-LOAD-010]** The term table and clinical pattern library are data,
//! not code: reviewed TOML artifacts loaded at startup and carried with an
//! explicit version string. Every scan result records the versions it was
//! produced under, so any historical decision can be re-derived.
//!
//! Content is validated on load and rejected wholesale on any defect. A
//! screening service with a half-loaded term table must not start.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Deserialize;

use haven_common::types::ClinicalFramework;

use crate::error::{Result, TriageError};
use crate::normalize::normalize;

/// Term table file name within the content directory
pub const TERMS_FILE: &str = "terms.toml";
/// Pattern library file name within the content directory
pub const CLINICAL_FILE: &str = "clinical.toml";

// ========================================
// Term table (layer 1)
// ========================================

/// Weighted caution term
#[derive(Debug, Clone, Deserialize)]
pub struct CautionTerm {
    pub term: String,
    /// Contribution weight in (0, 1); combined as 1 - prod(1 - w)
    pub weight: f64,
}

/// **[SCD-KW-010]** Crisis and caution term table
#[derive(Debug, Clone, Deserialize)]
pub struct TermTable {
    /// Content version recorded on every scan result
    pub version: String,
    /// Any match forces CRISIS
    pub crisis_terms: Vec<String>,
    /// Matches accumulate into the layer-1 score
    pub caution_terms: Vec<CautionTerm>,
}

impl TermTable {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let table: TermTable = toml::from_str(raw)
            .map_err(|e| TriageError::Content(format!("term table parse error: {e}")))?;
        table.validate()?;
        Ok(table)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// **[CNT-LOAD-020]** Reject malformed tables before they can scan anything
    ///
    /// Terms must already be in normalized canonical form: matching runs over
    /// normalized text, so a term that normalization would alter can never
    /// match itself.
    fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(TriageError::Content("term table version is empty".into()));
        }
        if self.crisis_terms.is_empty() {
            return Err(TriageError::Content(
                "term table has no crisis terms".into(),
            ));
        }

        let mut seen = BTreeSet::new();
        for term in &self.crisis_terms {
            check_canonical(term, "crisis term")?;
            if !seen.insert(term.as_str()) {
                return Err(TriageError::Content(format!(
                    "duplicate crisis term: {term:?}"
                )));
            }
        }

        let crisis: BTreeSet<&str> = self.crisis_terms.iter().map(String::as_str).collect();
        let mut seen = BTreeSet::new();
        for entry in &self.caution_terms {
            check_canonical(&entry.term, "caution term")?;
            if !(entry.weight > 0.0 && entry.weight < 1.0) {
                return Err(TriageError::Content(format!(
                    "caution term {:?} weight {} outside (0, 1)",
                    entry.term, entry.weight
                )));
            }
            if crisis.contains(entry.term.as_str()) {
                return Err(TriageError::Content(format!(
                    "term {:?} listed as both crisis and caution",
                    entry.term
                )));
            }
            if !seen.insert(entry.term.as_str()) {
                return Err(TriageError::Content(format!(
                    "duplicate caution term: {:?}",
                    entry.term
                )));
            }
        }

        Ok(())
    }
}

// ========================================
// Clinical pattern library (layer 2)
// ========================================

/// Phrase mapped to a screening instrument item
#[derive(Debug, Clone, Deserialize)]
pub struct ClinicalPattern {
    pub framework: ClinicalFramework,
    /// 1-based item number within the instrument
    pub item: u8,
    pub phrase: String,
    /// Severity 1..=3; per-item severities combine by max, never sum
    pub severity: u8,
}

/// Instrument item whose endorsement alone forces CRISIS
#[derive(Debug, Clone, Deserialize)]
pub struct CriticalItem {
    pub framework: ClinicalFramework,
    pub item: u8,
}

/// Labeled phrase list for contextual factors
#[derive(Debug, Clone, Deserialize)]
pub struct FactorLexicon {
    pub label: String,
    pub phrases: Vec<String>,
}

/// **[SCD-SEM-010]** Clinical pattern library
#[derive(Debug, Clone, Deserialize)]
pub struct PatternLibrary {
    /// Content version recorded on every scan result
    pub version: String,
    /// Items that saturate the decision on any endorsement
    pub critical_items: Vec<CriticalItem>,
    pub patterns: Vec<ClinicalPattern>,
    #[serde(default)]
    pub risk_factors: Vec<FactorLexicon>,
    #[serde(default)]
    pub protective_factors: Vec<FactorLexicon>,
}

impl PatternLibrary {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let library: PatternLibrary = toml::from_str(raw)
            .map_err(|e| TriageError::Content(format!("pattern library parse error: {e}")))?;
        library.validate()?;
        Ok(library)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(TriageError::Content(
                "pattern library version is empty".into(),
            ));
        }
        if self.patterns.is_empty() {
            return Err(TriageError::Content(
                "pattern library has no patterns".into(),
            ));
        }

        for item in &self.critical_items {
            check_item_range(item.framework, item.item)?;
        }

        let mut seen = BTreeSet::new();
        for p in &self.patterns {
            check_item_range(p.framework, p.item)?;
            check_canonical(&p.phrase, "clinical phrase")?;
            if !(1..=3).contains(&p.severity) {
                return Err(TriageError::Content(format!(
                    "phrase {:?} severity {} outside 1..=3",
                    p.phrase, p.severity
                )));
            }
            if !seen.insert(p.phrase.as_str()) {
                return Err(TriageError::Content(format!(
                    "duplicate clinical phrase: {:?}",
                    p.phrase
                )));
            }
        }

        for lexicon in self.risk_factors.iter().chain(&self.protective_factors) {
            if lexicon.label.trim().is_empty() {
                return Err(TriageError::Content("factor lexicon label is empty".into()));
            }
            for phrase in &lexicon.phrases {
                check_canonical(phrase, "factor phrase")?;
            }
        }

        Ok(())
    }
}

// ========================================
// Content set
// ========================================

/// Complete screening content loaded from one directory
#[derive(Debug, Clone)]
pub struct ContentSet {
    pub terms: TermTable,
    pub clinical: PatternLibrary,
}

impl ContentSet {
    /// **[CNT-LOAD-030]** Load `terms.toml` and `clinical.toml` from `dir`
    pub fn load(dir: &Path) -> Result<Self> {
        let terms = TermTable::load(&dir.join(TERMS_FILE))?;
        let clinical = PatternLibrary::load(&dir.join(CLINICAL_FILE))?;
        Ok(ContentSet { terms, clinical })
    }
}

fn check_canonical(term: &str, kind: &str) -> Result<()> {
    if term.trim().is_empty() {
        return Err(TriageError::Content(format!("empty {kind}")));
    }
    let normalized = normalize(term);
    if normalized.text != term {
        return Err(TriageError::Content(format!(
            "{kind} {term:?} is not in canonical form (normalizes to {:?})",
            normalized.text
        )));
    }
    Ok(())
}

fn check_item_range(framework: ClinicalFramework, item: u8) -> Result<()> {
    if item == 0 || item > framework.item_count() {
        return Err(TriageError::Content(format!(
            "{} item {} outside 1..={}",
            framework.as_str(),
            item,
            framework.item_count()
        )));
    }
    Ok(())
}
