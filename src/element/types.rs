//! Enums and raw value types for the element model.

use serde::{Deserialize, Serialize};

/// Per-fragment policy governing how a later fragment combines with an
/// earlier one sharing a ConfigId.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergeBehavior {
    /// Overlay attributes and append children (default).
    #[default]
    Merge,
    /// Discard previously accumulated attributes and children.
    Replace,
    /// Leave the accumulator unchanged.
    Ignore,
}

impl MergeBehavior {
    /// Parse a merge behavior from a string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "merge" => Some(Self::Merge),
            "replace" => Some(Self::Replace),
            "ignore" => Some(Self::Ignore),
            _ => None,
        }
    }
}

/// Variant tag of a configuration element.
///
/// The variant decides the identity rule: a singleton is identified by pid
/// alone, a factory instance by (pid, id). `Comparable` is the
/// post-processing wrapper applied after merge, carrying the resolved node
/// name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    /// A plain fragment as delivered by the document parser.
    #[default]
    Simple,
    /// A merged, identity-resolved element ready for comparison.
    Comparable,
    /// A multi-instance entity; id required (synthesized when absent).
    Factory,
    /// A single-instance entity; id always absent.
    Singleton,
}

/// Raw attribute value as delivered by the document parser.
///
/// Override order matters across fragments: the last applicable fragment
/// wins per key, subject to its merge behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    /// A single string value, possibly containing `${...}` substitutions.
    Str(String),
    /// An ordered multi-value.
    List(Vec<String>),
}

impl RawValue {
    /// The value as a single string, if scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RawValue::Str(s) => Some(s),
            RawValue::List(_) => None,
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Str(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Str(s)
    }
}

impl From<Vec<String>> for RawValue {
    fn from(v: Vec<String>) -> Self {
        RawValue::List(v)
    }
}
