//! Error types for canopy.
//!
//! Uses thiserror for derive macros. Errors within one entity's resolution
//! invalidate that entity; whether an invalid entity aborts the whole pass
//! is decided by the [`OnError`] policy threaded through the pass entry
//! point.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for configuration resolution.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Two or more fragments with the same identity could not be reconciled.
    #[error("conflicting fragments for configuration '{config_id}': {reason}")]
    MergeConflict { config_id: String, reason: String },

    /// A variable resolution chain revisited a name before terminating.
    #[error("variable evaluation loop detected: [{}]", chain.join(", "))]
    CycleDetected { chain: Vec<String> },

    /// A property or variable lookup failed in a declared way.
    #[error("lookup of '{name}' failed: {reason}")]
    Lookup { name: String, reason: String },

    /// A resolved attribute value failed its declared constraint.
    #[error("invalid value '{value}' for attribute '{attribute}': {message}")]
    Validation {
        attribute: String,
        value: String,
        message: String,
    },

    /// Integer overflow, divide-by-zero, or a non-numeric operand.
    #[error("numeric failure: {0}")]
    Numeric(String),

    /// A resolved entity is not valid and the pass policy is `fail`.
    #[error("configuration '{config_id}' is not valid: {detail}")]
    InvalidEntity { config_id: String, detail: String },

    /// A raw fragment document could not be decoded.
    #[error("failed to decode configuration document: {0}")]
    Document(String),

    /// The change journal could not be written.
    #[error("change journal error: {0}")]
    Journal(String),
}

/// Result type alias for canopy operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Policy for a resolution pass that produced invalid entities.
///
/// Threaded through the pass constructor rather than held in process-wide
/// state, so concurrent engines can disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    /// Record the problem and continue with the best-effort merged state.
    #[default]
    Warn,
    /// Abort the pass on the first invalid entity.
    Fail,
}

impl OnError {
    /// Parse a policy from a string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "warn" => Some(Self::Warn),
            "fail" => Some(Self::Fail),
            _ => None,
        }
    }
}
