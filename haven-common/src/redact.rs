//! Student reference pseudonymization
//!
//! Crisis records, audit entries and aggregation keys never carry raw
//! student identifiers. A salted SHA-256 digest keeps records correlatable
//! within one deployment while remaining meaningless outside it.

use rand::Rng;
use sha2::{Digest, Sha256};

/// Salted one-way hasher for student references
///
/// The salt is deployment-stable (from config) so the same student maps to
/// the same pseudonym across sessions, which duplicate-crisis detection and
/// aggregation both depend on.
#[derive(Debug, Clone)]
pub struct Pseudonymizer {
    salt: String,
}

impl Pseudonymizer {
    /// Create with an explicit deployment salt
    pub fn new(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }

    /// Create with a process-random salt
    ///
    /// For tests and ephemeral tooling; pseudonyms will not correlate
    /// across processes.
    pub fn ephemeral() -> Self {
        let mut rng = rand::thread_rng();
        let salt: u128 = rng.gen();
        Self {
            salt: format!("{:032x}", salt),
        }
    }

    /// Hash a raw student reference to a 64-hex-char pseudonym
    pub fn hash_ref(&self, student_ref: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(student_ref.as_bytes());
        hasher.update(self.salt.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}
