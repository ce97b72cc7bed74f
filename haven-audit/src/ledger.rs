//! Append-only audit ledger
//!
//! **[AUD-SEQ-010]** All appends flow through one `AuditLedger` whose write
//! guard acts as the single sequencer: sequence numbers and previous-hash
//! linkage are assigned under the lock, so concurrent writers can interleave
//! in any order and still produce one valid chain.

use crate::entry::{AuditAction, AuditEntry, GENESIS_HASH};
use crate::{AuditError, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::io::{BufRead, Write};
use tokio::sync::RwLock;
use tracing::{debug, error};

/// Outcome of verifying a chain slice
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainVerification {
    /// Every entry verified
    Valid {
        /// Number of entries checked
        entries_checked: usize,
    },
    /// Verification failed part-way through
    Invalid {
        /// Sequence number of the first failing entry
        first_bad_sequence: u64,
        /// Why that entry failed
        reason: String,
        /// Number of entries that verified before the failure
        entries_checked: usize,
    },
}

impl ChainVerification {
    /// True when the whole slice verified
    pub fn is_valid(&self) -> bool {
        matches!(self, ChainVerification::Valid { .. })
    }
}

/// Filter for ledger queries
///
/// All filters are conjunctive; `None` means "any". Time bounds are
/// inclusive.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    /// Match a single action category
    pub action: Option<AuditAction>,
    /// Match a single entity reference
    pub entity_ref: Option<String>,
    /// Entries at or after this time
    pub since: Option<DateTime<Utc>>,
    /// Entries at or before this time
    pub until: Option<DateTime<Utc>>,
    /// Keep only the most recent N matches (chain order preserved)
    pub limit: Option<usize>,
}

/// **[AUD-SEQ-010]** In-memory, index-addressable audit ledger
///
/// Appends serialize through the write lock; queries and verification take
/// the read lock and run concurrently. Entries are never updated or removed;
/// retention tiering exports via JSONL instead of truncating in place.
pub struct AuditLedger {
    entries: RwLock<Vec<AuditEntry>>,
}

impl AuditLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// **[AUD-SEQ-020]** Append one entry
    ///
    /// Sequence number and previous-hash are derived from the current tail
    /// under the write guard, then the entry is hashed and pushed. Returns
    /// the appended entry.
    pub async fn append(
        &self,
        action: AuditAction,
        entity_ref: impl Into<String>,
        actor_ref: impl Into<String>,
        details: Value,
    ) -> Result<AuditEntry> {
        let mut entries = self.entries.write().await;

        let (sequence, previous_hash) = match entries.last() {
            Some(tail) => (tail.sequence + 1, tail.entry_hash.clone()),
            None => (0, GENESIS_HASH.to_string()),
        };

        let entry = AuditEntry::build(
            sequence,
            previous_hash,
            action,
            entity_ref,
            actor_ref,
            details,
        )?;
        entries.push(entry.clone());

        debug!(
            sequence,
            action = action.as_str(),
            entity_ref = %entry.entity_ref,
            "audit entry appended"
        );
        Ok(entry)
    }

    /// Number of entries in the chain
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// True when no entries have been appended
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Fetch one entry by sequence number
    pub async fn entry_at(&self, sequence: u64) -> Option<AuditEntry> {
        self.entries.read().await.get(sequence as usize).cloned()
    }

    /// Copy of the full chain in sequence order
    pub async fn snapshot(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }

    /// **[AUD-QRY-010]** Query entries with conjunctive filters
    ///
    /// Results stay in chain (ascending sequence) order; `limit` keeps the
    /// most recent matches.
    pub async fn query(&self, query: &AuditQuery) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;

        let mut matches: Vec<AuditEntry> = entries
            .iter()
            .filter(|e| query.action.map_or(true, |a| e.action == a))
            .filter(|e| {
                query
                    .entity_ref
                    .as_deref()
                    .map_or(true, |r| e.entity_ref == r)
            })
            .filter(|e| query.since.map_or(true, |t| e.timestamp >= t))
            .filter(|e| query.until.map_or(true, |t| e.timestamp <= t))
            .cloned()
            .collect();

        if let Some(limit) = query.limit {
            if matches.len() > limit {
                matches.drain(..matches.len() - limit);
            }
        }
        matches
    }

    /// **[AUD-CHAIN-050]** Verify the full chain
    ///
    /// Returns the number of entries checked. A failure is a fatal
    /// integrity signal: it is logged and returned as
    /// `AuditError::IntegrityViolation`, never repaired.
    pub async fn verify(&self) -> Result<usize> {
        let entries = self.entries.read().await;
        match verify_entries(&entries) {
            ChainVerification::Valid { entries_checked } => Ok(entries_checked),
            ChainVerification::Invalid {
                first_bad_sequence,
                reason,
                ..
            } => {
                error!(
                    sequence = first_bad_sequence,
                    %reason,
                    "audit chain verification failed"
                );
                Err(AuditError::IntegrityViolation {
                    sequence: first_bad_sequence,
                    reason,
                })
            }
        }
    }

    /// Export the chain as JSON Lines for external retention tooling
    ///
    /// Returns the number of entries written. Exported data re-verifies via
    /// `verify_entries` after `import_jsonl`.
    pub async fn export_jsonl<W: Write>(&self, writer: &mut W) -> Result<usize> {
        let entries = self.entries.read().await;
        for entry in entries.iter() {
            let line = serde_json::to_string(entry)?;
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        Ok(entries.len())
    }
}

impl Default for AuditLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// **[AUD-CHAIN-050]** Verify linkage and content hashes over a chain slice
///
/// Pure function usable on live snapshots or imported exports. Checks, per
/// entry: sequence continuity, previous-hash linkage, and the recomputed
/// content hash. Walks in order and reports the first failure; entries
/// before the failure point are known-good.
pub fn verify_entries(entries: &[AuditEntry]) -> ChainVerification {
    let mut previous: Option<&AuditEntry> = None;

    for (checked, entry) in entries.iter().enumerate() {
        if let Some(prev) = previous {
            if entry.sequence != prev.sequence + 1 {
                return ChainVerification::Invalid {
                    first_bad_sequence: entry.sequence,
                    reason: format!(
                        "sequence gap: {} follows {}",
                        entry.sequence, prev.sequence
                    ),
                    entries_checked: checked,
                };
            }
            if entry.previous_hash != prev.entry_hash {
                return ChainVerification::Invalid {
                    first_bad_sequence: entry.sequence,
                    reason: "previous-hash linkage broken".to_string(),
                    entries_checked: checked,
                };
            }
        } else if entry.sequence == 0 && entry.previous_hash != GENESIS_HASH {
            return ChainVerification::Invalid {
                first_bad_sequence: 0,
                reason: "genesis entry previous_hash is not the genesis constant".to_string(),
                entries_checked: 0,
            };
        }

        match entry.hash_is_valid() {
            Ok(true) => {}
            Ok(false) => {
                return ChainVerification::Invalid {
                    first_bad_sequence: entry.sequence,
                    reason: "entry hash does not match entry content".to_string(),
                    entries_checked: checked,
                };
            }
            Err(e) => {
                return ChainVerification::Invalid {
                    first_bad_sequence: entry.sequence,
                    reason: format!("hash recomputation failed: {}", e),
                    entries_checked: checked,
                };
            }
        }

        previous = Some(entry);
    }

    ChainVerification::Valid {
        entries_checked: entries.len(),
    }
}

/// Parse a JSONL export back into entries
///
/// Parsing alone proves nothing about integrity; callers run
/// `verify_entries` on the result.
pub fn import_jsonl<R: BufRead>(reader: R) -> Result<Vec<AuditEntry>> {
    let mut entries = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: AuditEntry = serde_json::from_str(&line).map_err(|e| {
            AuditError::InvalidImport(format!("line {}: {}", line_no + 1, e))
        })?;
        entries.push(entry);
    }
    Ok(entries)
}
