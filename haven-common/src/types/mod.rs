//! Domain types shared across the Haven safety crates

mod clinical;
mod crisis;
mod message;
mod risk;

pub use clinical::{ClinicalFramework, ClinicalMarker, SemanticAnalysis};
pub use crisis::{CrisisRecord, CrisisState, TriggerSource};
pub use message::Message;
pub use risk::{RiskLevel, ScanResult};
