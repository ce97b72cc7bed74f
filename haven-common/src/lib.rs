//! # Haven Common Library
//!
//! Shared code for the Haven safety core crates including:
//! - Domain types (messages, risk levels, clinical markers, crisis records)
//! - Event types (HavenEvent enum) and EventBus
//! - Global screening parameters
//! - Configuration loading
//! - Pseudonymization utilities

pub mod config;
pub mod error;
pub mod events;
pub mod params;
pub mod redact;
pub mod types;

pub use error::{Error, Result};
pub use params::PARAMS;
pub use types::RiskLevel;
