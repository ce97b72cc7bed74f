//! Global screening parameter management
//!
//! Centralized singleton for all tunable screening parameters.
//! Read-frequently, write-rarely access pattern using RwLock.
//!
//! # Architecture
//!
//! All global parameters are stored in a single `GlobalParams` struct,
//! accessible via the `PARAMS` static singleton. This provides:
//! - Single source of truth for all screening thresholds
//! - Thread-safe access across all safety crates
//! - Low-contention read access (readers don't block each other)
//! - Eliminates hardcoded threshold values
//!
//! # Usage
//!
//! ```rust
//! use haven_common::params::PARAMS;
//!
//! // Read (fast, uncontended)
//! let threshold = *PARAMS.caution_threshold.read().unwrap();
//!
//! // Write (rare, initialization or config reload)
//! PARAMS.set_caution_threshold(0.2).unwrap();
//! ```
//!
//! # RwLock Unwrap Justification
//!
//! Accessors use `.read().unwrap()` / `.write().unwrap()` on
//! RwLock-protected fields. This is JUSTIFIABLE because:
//! - RwLock poisoning only occurs if a thread panics while holding the lock
//! - Poisoned lock indicates corrupted process state
//! - Panic is the correct fail-fast behavior in this scenario
//! - Alternative (ignoring poisoning) would propagate corruption into
//!   safety-relevant decisions

use once_cell::sync::Lazy;
use std::sync::RwLock;

/// Global parameters singleton
///
/// Initialized with compiled defaults, optionally overridden from the
/// deployment config at startup, accessed everywhere.
pub static PARAMS: Lazy<GlobalParams> = Lazy::new(GlobalParams::default);

/// Global parameter storage
///
/// All parameters stored with RwLock for thread-safe access.
/// Readers don't block each other (shared read lock).
pub struct GlobalParams {
    /// **[SCD-PARAM-010]** Layer 1 (keyword) weight in the combined score
    ///
    /// Valid range: [0.0, 1.0]
    /// Default: 0.6
    /// Weights the keyword-scan score in the combined risk score
    pub keyword_weight: RwLock<f64>,

    /// **[SCD-PARAM-020]** Layer 2 (semantic) weight in the combined score
    ///
    /// Valid range: [0.0, 1.0]
    /// Default: 0.4
    /// Weights the semantic risk score in the combined risk score
    pub semantic_weight: RwLock<f64>,

    /// **[SCD-PARAM-030]** Combined-score threshold for CAUTION
    ///
    /// Valid range: [0.05, 0.9]
    /// Default: 0.15
    /// Messages at or above this combined score classify as CAUTION.
    /// CRISIS is never threshold-derived (crisis terms and critical markers
    /// classify directly), so raising this cannot mask a crisis.
    pub caution_threshold: RwLock<f64>,

    /// **[ESC-PARAM-010]** Acknowledgment timeout
    ///
    /// Valid range: [10, 3600] seconds
    /// Default: 300 seconds
    /// How long a NOTIFYING or ESCALATED crisis waits for human
    /// acknowledgment before the next contact tier is engaged
    pub ack_timeout_secs: RwLock<u64>,

    /// **[KAN-PARAM-010]** Minimum k-anonymity group size
    ///
    /// Valid range: [2, 100]
    /// Default: 5
    /// Aggregate groups smaller than this are suppressed
    pub k_anonymity_min_group: RwLock<usize>,

    /// **[SCD-PARAM-040]** Scan latency warning threshold
    ///
    /// Valid range: [100, 1000000] microseconds
    /// Default: 1000 microseconds
    /// Scans slower than this log a warning (the hot path targets
    /// sub-millisecond classification)
    pub scan_warn_latency_us: RwLock<u64>,
}

impl Default for GlobalParams {
    fn default() -> Self {
        Self {
            // [SCD-PARAM-010] Keyword weight
            keyword_weight: RwLock::new(0.6),

            // [SCD-PARAM-020] Semantic weight
            semantic_weight: RwLock::new(0.4),

            // [SCD-PARAM-030] Caution threshold
            caution_threshold: RwLock::new(0.15),

            // [ESC-PARAM-010] Acknowledgment timeout
            ack_timeout_secs: RwLock::new(300),

            // [KAN-PARAM-010] Minimum aggregate group size
            k_anonymity_min_group: RwLock::new(5),

            // [SCD-PARAM-040] Scan latency warning threshold
            scan_warn_latency_us: RwLock::new(1000),
        }
    }
}

/// Parameter metadata: single source of truth for names, defaults, ranges
/// and validation logic
pub struct ParamMetadata {
    pub key: &'static str,
    pub data_type: &'static str,
    pub default_value: &'static str,
    pub description: &'static str,
    pub validation_range: &'static str,
    pub validator: fn(&str) -> Result<(), String>,
}

impl GlobalParams {
    /// Get metadata for all tunable parameters
    ///
    /// Single source of truth for parameter names, types, default values,
    /// validation ranges and validation logic. Setters and the config
    /// loader both delegate here.
    pub fn metadata() -> &'static [ParamMetadata] {
        &[
            // [SCD-PARAM-010] Keyword weight
            ParamMetadata {
                key: "keyword_weight",
                data_type: "f64",
                default_value: "0.6",
                description: "[SCD-PARAM-010] Layer 1 keyword weight in combined score",
                validation_range: "0.0-1.0",
                validator: |s| {
                    let v: f64 = s
                        .parse()
                        .map_err(|_| "keyword_weight: invalid number format".to_string())?;
                    if !(0.0..=1.0).contains(&v) {
                        return Err(format!(
                            "keyword_weight: value {} out of range [0.0, 1.0]",
                            v
                        ));
                    }
                    Ok(())
                },
            },
            // [SCD-PARAM-020] Semantic weight
            ParamMetadata {
                key: "semantic_weight",
                data_type: "f64",
                default_value: "0.4",
                description: "[SCD-PARAM-020] Layer 2 semantic weight in combined score",
                validation_range: "0.0-1.0",
                validator: |s| {
                    let v: f64 = s
                        .parse()
                        .map_err(|_| "semantic_weight: invalid number format".to_string())?;
                    if !(0.0..=1.0).contains(&v) {
                        return Err(format!(
                            "semantic_weight: value {} out of range [0.0, 1.0]",
                            v
                        ));
                    }
                    Ok(())
                },
            },
            // [SCD-PARAM-030] Caution threshold
            ParamMetadata {
                key: "caution_threshold",
                data_type: "f64",
                default_value: "0.15",
                description: "[SCD-PARAM-030] Combined-score threshold for CAUTION",
                validation_range: "0.05-0.9",
                validator: |s| {
                    let v: f64 = s
                        .parse()
                        .map_err(|_| "caution_threshold: invalid number format".to_string())?;
                    if !(0.05..=0.9).contains(&v) {
                        return Err(format!(
                            "caution_threshold: value {} out of range [0.05, 0.9]",
                            v
                        ));
                    }
                    Ok(())
                },
            },
            // [ESC-PARAM-010] Acknowledgment timeout
            ParamMetadata {
                key: "ack_timeout_secs",
                data_type: "u64",
                default_value: "300",
                description: "[ESC-PARAM-010] Crisis acknowledgment timeout (seconds)",
                validation_range: "10-3600",
                validator: |s| {
                    let v: u64 = s
                        .parse()
                        .map_err(|_| "ack_timeout_secs: invalid number format".to_string())?;
                    if !(10..=3600).contains(&v) {
                        return Err(format!(
                            "ack_timeout_secs: value {} out of range [10, 3600]",
                            v
                        ));
                    }
                    Ok(())
                },
            },
            // [KAN-PARAM-010] Minimum aggregate group size
            ParamMetadata {
                key: "k_anonymity_min_group",
                data_type: "usize",
                default_value: "5",
                description: "[KAN-PARAM-010] Minimum k-anonymity group size",
                validation_range: "2-100",
                validator: |s| {
                    let v: usize = s
                        .parse()
                        .map_err(|_| "k_anonymity_min_group: invalid number format".to_string())?;
                    if !(2..=100).contains(&v) {
                        return Err(format!(
                            "k_anonymity_min_group: value {} out of range [2, 100]",
                            v
                        ));
                    }
                    Ok(())
                },
            },
            // [SCD-PARAM-040] Scan latency warning threshold
            ParamMetadata {
                key: "scan_warn_latency_us",
                data_type: "u64",
                default_value: "1000",
                description: "[SCD-PARAM-040] Scan latency warning threshold (microseconds)",
                validation_range: "100-1000000",
                validator: |s| {
                    let v: u64 = s
                        .parse()
                        .map_err(|_| "scan_warn_latency_us: invalid number format".to_string())?;
                    if !(100..=1_000_000).contains(&v) {
                        return Err(format!(
                            "scan_warn_latency_us: value {} out of range [100, 1000000]",
                            v
                        ));
                    }
                    Ok(())
                },
            },
        ]
    }

    /// Validate and update keyword_weight
    ///
    /// # Validation
    /// - Delegates to metadata validator for range checking
    /// - Must be in range [0.0, 1.0] (see ParamMetadata)
    pub fn set_keyword_weight(&self, value: f64) -> Result<(), String> {
        let meta = Self::metadata()
            .iter()
            .find(|m| m.key == "keyword_weight")
            .expect("keyword_weight metadata must exist");

        (meta.validator)(&value.to_string())?;

        *self.keyword_weight.write().unwrap() = value;
        Ok(())
    }

    /// Validate and update semantic_weight
    ///
    /// # Validation
    /// - Delegates to metadata validator for range checking
    /// - Must be in range [0.0, 1.0] (see ParamMetadata)
    pub fn set_semantic_weight(&self, value: f64) -> Result<(), String> {
        let meta = Self::metadata()
            .iter()
            .find(|m| m.key == "semantic_weight")
            .expect("semantic_weight metadata must exist");

        (meta.validator)(&value.to_string())?;

        *self.semantic_weight.write().unwrap() = value;
        Ok(())
    }

    /// Validate and update caution_threshold
    ///
    /// # Validation
    /// - Delegates to metadata validator for range checking
    /// - Must be in range [0.05, 0.9] (see ParamMetadata)
    pub fn set_caution_threshold(&self, value: f64) -> Result<(), String> {
        let meta = Self::metadata()
            .iter()
            .find(|m| m.key == "caution_threshold")
            .expect("caution_threshold metadata must exist");

        (meta.validator)(&value.to_string())?;

        *self.caution_threshold.write().unwrap() = value;
        Ok(())
    }

    /// Validate and update ack_timeout_secs
    ///
    /// # Validation
    /// - Delegates to metadata validator for range checking
    /// - Must be in range [10, 3600] seconds (see ParamMetadata)
    pub fn set_ack_timeout_secs(&self, value: u64) -> Result<(), String> {
        let meta = Self::metadata()
            .iter()
            .find(|m| m.key == "ack_timeout_secs")
            .expect("ack_timeout_secs metadata must exist");

        (meta.validator)(&value.to_string())?;

        *self.ack_timeout_secs.write().unwrap() = value;
        Ok(())
    }

    /// Validate and update k_anonymity_min_group
    ///
    /// # Validation
    /// - Delegates to metadata validator for range checking
    /// - Must be in range [2, 100] (see ParamMetadata)
    pub fn set_k_anonymity_min_group(&self, value: usize) -> Result<(), String> {
        let meta = Self::metadata()
            .iter()
            .find(|m| m.key == "k_anonymity_min_group")
            .expect("k_anonymity_min_group metadata must exist");

        (meta.validator)(&value.to_string())?;

        *self.k_anonymity_min_group.write().unwrap() = value;
        Ok(())
    }

    /// Validate and update scan_warn_latency_us
    ///
    /// # Validation
    /// - Delegates to metadata validator for range checking
    /// - Must be in range [100, 1000000] microseconds (see ParamMetadata)
    pub fn set_scan_warn_latency_us(&self, value: u64) -> Result<(), String> {
        let meta = Self::metadata()
            .iter()
            .find(|m| m.key == "scan_warn_latency_us")
            .expect("scan_warn_latency_us metadata must exist");

        (meta.validator)(&value.to_string())?;

        *self.scan_warn_latency_us.write().unwrap() = value;
        Ok(())
    }

    /// Validate and apply a parameter by metadata key
    ///
    /// Used by the config loader and tuning tools; unknown keys are
    /// rejected so typos in deployment config surface at startup.
    pub fn set_by_key(&self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "keyword_weight" => self.set_keyword_weight(
                value
                    .parse()
                    .map_err(|_| format!("{}: invalid number format", key))?,
            ),
            "semantic_weight" => self.set_semantic_weight(
                value
                    .parse()
                    .map_err(|_| format!("{}: invalid number format", key))?,
            ),
            "caution_threshold" => self.set_caution_threshold(
                value
                    .parse()
                    .map_err(|_| format!("{}: invalid number format", key))?,
            ),
            "ack_timeout_secs" => self.set_ack_timeout_secs(
                value
                    .parse()
                    .map_err(|_| format!("{}: invalid number format", key))?,
            ),
            "k_anonymity_min_group" => self.set_k_anonymity_min_group(
                value
                    .parse()
                    .map_err(|_| format!("{}: invalid number format", key))?,
            ),
            "scan_warn_latency_us" => self.set_scan_warn_latency_us(
                value
                    .parse()
                    .map_err(|_| format!("{}: invalid number format", key))?,
            ),
            _ => Err(format!("unknown parameter key: {}", key)),
        }
    }
}
