//! # Haven Triage Library
//!
//! Deterministic message screening and crisis escalation:
//! - Text normalization (obfuscation folding)
//! - Layer 1 keyword scanning over versioned term tables
//! - Layer 2 semantic analysis against PHQ-9 / GAD-7 pattern libraries
//! - Max-based risk decision engine
//! - Crisis escalation state machine with acknowledgment timers
//! - Triage pipeline facade wiring screening to the audit ledger and
//!   event bus

pub mod content;
pub mod decision;
pub mod error;
pub mod escalation;
pub mod normalize;
pub mod pipeline;
pub mod scanner;
pub mod semantic;

pub use content::ContentSet;
pub use decision::{decide, Decision, DecisionThresholds};
pub use error::{Result, TriageError};
pub use escalation::{CrisisTrigger, EscalationManager, DEFAULT_ESCALATION_PATH};
pub use normalize::{normalize, Normalized};
pub use pipeline::{TriageEngine, TriageMetrics};
pub use scanner::{KeywordScanner, LayerOneResult};
pub use semantic::SemanticAnalyzer;
