//! # Haven Audit Library
//!
//! Hash-chained audit ledger and privacy-preserving aggregation:
//! - Append-only AuditEntry chain with single-sequencer append discipline
//! - Pure chain verification usable on live or exported data
//! - Filtered queries and JSONL export/import for retention tooling
//! - k-anonymity aggregation with small-group suppression

pub mod aggregate;
pub mod entry;
pub mod error;
pub mod ledger;

pub use aggregate::{aggregate, configured_k, count_by_group, AggregateResult};
pub use entry::{AuditAction, AuditEntry, GENESIS_HASH};
pub use error::{AuditError, Result};
pub use ledger::{import_jsonl, verify_entries, AuditLedger, AuditQuery, ChainVerification};
