//! Audit entry and hash chain primitives
//!
//! **[AUD-CHAIN-010]** Every entry carries the hash of its predecessor and a
//! hash over its own canonical serialization, so any mutation, insertion or
//! deletion anywhere in the chain is detectable from that point forward.

use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// **[AUD-CHAIN-020]** Previous-hash value of the first chain entry
///
/// Also used as the dummy substitution value while hashing an entry's own
/// content (the entry hash cannot cover itself).
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Audited action categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A message was screened and classified
    MessageScanned,
    /// Screening degraded to the fail-closed path
    ScanFailed,
    /// Screening content artifacts were loaded
    ContentLoaded,
    /// A new crisis record was created
    CrisisDetected,
    /// A crisis record changed state
    CrisisTransition,
    /// An acknowledgment timer elapsed
    EscalationTimerFired,
}

impl AuditAction {
    /// Stable string form used in queries and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::MessageScanned => "message_scanned",
            AuditAction::ScanFailed => "scan_failed",
            AuditAction::ContentLoaded => "content_loaded",
            AuditAction::CrisisDetected => "crisis_detected",
            AuditAction::CrisisTransition => "crisis_transition",
            AuditAction::EscalationTimerFired => "escalation_timer_fired",
        }
    }
}

/// **[AUD-CHAIN-030]** One append-only audit ledger entry
///
/// Entries are immutable once appended. `entry_hash` covers every other
/// field (including `previous_hash`), computed over the canonical JSON form
/// with the hash field itself substituted by `GENESIS_HASH`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry identifier
    pub entry_id: Uuid,

    /// Position in the chain, starting at 0
    pub sequence: u64,

    /// When the entry was appended
    pub timestamp: DateTime<Utc>,

    /// What happened
    pub action: AuditAction,

    /// What the action was about (message id, crisis id, content version)
    pub entity_ref: String,

    /// Who or what performed the action ("system" for automated decisions)
    pub actor_ref: String,

    /// Action-specific evidence (matched terms, state transition, scores)
    pub details: Value,

    /// Hash of the preceding entry (`GENESIS_HASH` for sequence 0)
    pub previous_hash: String,

    /// SHA-256 over this entry's canonical form
    pub entry_hash: String,
}

impl AuditEntry {
    /// Build a hashed entry at a given chain position
    ///
    /// Only `crate::ledger::AuditLedger::append` should assign positions;
    /// this is public for verification tooling and tests.
    pub fn build(
        sequence: u64,
        previous_hash: String,
        action: AuditAction,
        entity_ref: impl Into<String>,
        actor_ref: impl Into<String>,
        details: Value,
    ) -> Result<Self> {
        let mut entry = Self {
            entry_id: Uuid::new_v4(),
            sequence,
            timestamp: Utc::now(),
            action,
            entity_ref: entity_ref.into(),
            actor_ref: actor_ref.into(),
            details,
            previous_hash,
            entry_hash: String::new(),
        };
        entry.entry_hash = entry.compute_hash()?;
        Ok(entry)
    }

    /// **[AUD-CHAIN-040]** Compute this entry's content hash
    ///
    /// # Algorithm
    ///
    /// 1. Serialize the entry to JSON
    /// 2. Substitute `entry_hash` with the 64-zero dummy value
    /// 3. Convert to canonical JSON (sorted keys, no whitespace)
    /// 4. SHA-256 over the canonical string
    /// 5. Return as 64 hex characters
    pub fn compute_hash(&self) -> Result<String> {
        let mut value = serde_json::to_value(self)?;
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "entry_hash".to_string(),
                Value::String(GENESIS_HASH.to_string()),
            );
        }

        let canonical = canonical_json(&value);

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Recompute the hash and compare with the stored value
    pub fn hash_is_valid(&self) -> Result<bool> {
        Ok(self.compute_hash()? == self.entry_hash)
    }
}

/// Convert JSON to canonical form (sorted keys, no whitespace)
///
/// The canonical string is hash input only, never parsed back; what matters
/// is that equal values always canonicalize identically.
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            let items: Vec<String> = pairs
                .into_iter()
                .map(|(k, v)| format!("{}:{}", escape_string(k), canonical_json(v)))
                .collect();
            format!("{{{}}}", items.join(","))
        }
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        Value::String(s) => escape_string(s),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
    }
}

fn escape_string(s: &str) -> String {
    // serde_json escaping covers control characters, not just quotes
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}
