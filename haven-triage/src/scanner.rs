//! Layer 1: deterministic keyword scanning
//!
//! **[SCD-KW-020]** An Aho-Corasick automaton built from the reviewed term
//! table runs over normalized text. Crisis terms force the layer into a
//! crisis match; caution terms accumulate into a bounded score. The scanner
//! holds no mutable state after construction, so a given (content version,
//! message) pair always produces the same result.

use std::collections::BTreeSet;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};

use crate::content::TermTable;
use crate::error::{Result, TriageError};
use crate::normalize::{is_word_bounded, Normalized};

#[derive(Debug, Clone, Copy)]
enum TermKind {
    Crisis,
    Caution { weight: f64 },
}

/// Outcome of the keyword layer for one message
#[derive(Debug, Clone)]
pub struct LayerOneResult {
    /// Distinct matched terms, in canonical form
    pub matched_terms: BTreeSet<String>,

    /// True when any crisis term matched; the decision engine maps this
    /// straight to CRISIS with no further weighing
    pub crisis_matched: bool,

    /// Caution accumulation in [0.0, 1.0]: 1 - prod(1 - weight) over
    /// distinct matched caution terms, or 1.0 on a crisis match
    pub layer_score: f64,
}

/// **[SCD-KW-030]** Keyword scanner over a versioned term table
pub struct KeywordScanner {
    version: String,

    /// Matches run over `Normalized::text` with word-boundary checks
    automaton: AhoCorasick,
    kinds: Vec<TermKind>,
    terms: Vec<String>,

    /// Multi-word crisis phrases with separators stripped, run over
    /// `Normalized::squeezed` to catch fully spaced-out obfuscation.
    /// No boundary check applies there; boundaries do not exist in
    /// squeezed space.
    squeezed_automaton: Option<AhoCorasick>,
    squeezed_sources: Vec<String>,
}

impl KeywordScanner {
    pub fn new(table: &TermTable) -> Result<Self> {
        let mut terms = Vec::new();
        let mut kinds = Vec::new();
        for term in &table.crisis_terms {
            terms.push(term.clone());
            kinds.push(TermKind::Crisis);
        }
        for entry in &table.caution_terms {
            terms.push(entry.term.clone());
            kinds.push(TermKind::Caution {
                weight: entry.weight,
            });
        }

        // LeftmostLongest so overlapping terms resolve to the most specific
        // one ("self harm" beats any shorter term it contains)
        let automaton = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::LeftmostLongest)
            .build(&terms)
            .map_err(|e| TriageError::Content(format!("term automaton build error: {e}")))?;

        let mut squeezed_patterns = Vec::new();
        let mut squeezed_sources = Vec::new();
        for term in &table.crisis_terms {
            if term.contains(' ') {
                squeezed_patterns.push(
                    term.chars()
                        .filter(|c| c.is_alphanumeric())
                        .collect::<String>(),
                );
                squeezed_sources.push(term.clone());
            }
        }
        let squeezed_automaton = if squeezed_patterns.is_empty() {
            None
        } else {
            Some(
                AhoCorasickBuilder::new()
                    .ascii_case_insensitive(true)
                    .match_kind(MatchKind::LeftmostLongest)
                    .build(&squeezed_patterns)
                    .map_err(|e| {
                        TriageError::Content(format!("squeezed automaton build error: {e}"))
                    })?,
            )
        };

        Ok(KeywordScanner {
            version: table.version.clone(),
            automaton,
            kinds,
            terms,
            squeezed_automaton,
            squeezed_sources,
        })
    }

    /// Term table version this scanner was built from
    pub fn version(&self) -> &str {
        &self.version
    }

    /// **[SCD-KW-040]** Scan one normalized message
    ///
    /// Infallible: a built scanner cannot fail to scan. Repeated occurrences
    /// of the same term count once.
    pub fn scan(&self, input: &Normalized) -> LayerOneResult {
        let mut matched_indices: BTreeSet<usize> = BTreeSet::new();
        for mat in self.automaton.find_iter(&input.text) {
            if is_word_bounded(&input.text, mat.start(), mat.end()) {
                matched_indices.insert(mat.pattern().as_usize());
            }
        }

        let mut matched_terms: BTreeSet<String> = matched_indices
            .iter()
            .map(|&i| self.terms[i].clone())
            .collect();
        let mut crisis_matched = matched_indices
            .iter()
            .any(|&i| matches!(self.kinds[i], TermKind::Crisis));

        if let Some(squeezed) = &self.squeezed_automaton {
            for mat in squeezed.find_iter(&input.squeezed) {
                crisis_matched = true;
                matched_terms.insert(self.squeezed_sources[mat.pattern().as_usize()].clone());
            }
        }

        let layer_score = if crisis_matched {
            1.0
        } else {
            let mut miss = 1.0;
            for &i in &matched_indices {
                if let TermKind::Caution { weight } = self.kinds[i] {
                    miss *= 1.0 - weight;
                }
            }
            1.0 - miss
        };

        LayerOneResult {
            matched_terms,
            crisis_matched,
            layer_score,
        }
    }
}
