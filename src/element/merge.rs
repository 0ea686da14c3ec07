//! The element merge algorithm.
//!
//! Combines an ordered list of raw fragments sharing one ConfigId into one
//! merged element. Each later fragment is applied under its *own* declared
//! merge behavior; identity resolution runs before the behavior dispatch,
//! so an explicit non-default id on any fragment wins over default ids
//! assigned earlier.

use super::model::ConfigElement;
use super::types::{MergeBehavior, RawValue};
use crate::error::{ConfigError, Result};

impl ConfigElement {
    /// Apply a later fragment of equal identity onto this accumulator.
    ///
    /// Behaviors:
    /// - `Merge` overlays attributes (later values win per key; two
    ///   list-valued attributes append) and appends children in document
    ///   order.
    /// - `Replace` discards all previously accumulated attributes and
    ///   children before applying the new fragment.
    /// - `Ignore` leaves the accumulated attributes and children unchanged
    ///   (identity resolution still applies).
    ///
    /// Fails with a merge conflict when the fragments are structurally
    /// incompatible (different pid under the same claimed identity).
    pub fn override_with(&mut self, other: &ConfigElement) -> Result<()> {
        if self.pid != other.pid {
            return Err(ConfigError::MergeConflict {
                config_id: self.display_id(),
                reason: format!(
                    "fragment from '{}' declares pid '{}', expected '{}'",
                    other.origin, other.pid, self.pid
                ),
            });
        }

        // Identity resolution applies under every behavior: an explicit id
        // beats a synthesized one even on an otherwise ignored fragment.
        if other.using_non_default_id {
            self.id = other.id.clone();
            self.using_non_default_id = true;
        }

        match other.behavior {
            MergeBehavior::Ignore => return Ok(()),
            MergeBehavior::Replace => {
                self.attributes.clear();
                self.children.clear();
            }
            MergeBehavior::Merge => {}
        }

        for (name, value) in &other.attributes {
            match (self.attributes.get_mut(name), value) {
                (Some(RawValue::List(existing)), RawValue::List(incoming)) => {
                    existing.extend(incoming.iter().cloned());
                }
                _ => {
                    self.attributes.insert(name.clone(), value.clone());
                }
            }
        }
        self.children.extend(other.children.iter().cloned());

        if self.sequence < other.sequence {
            self.sequence = other.sequence;
        }
        Ok(())
    }
}

/// Merge an ordered list of fragments sharing one ConfigId.
///
/// The first fragment's node name, merge behavior, and origin seed the
/// result; subsequent fragments are applied in document order via
/// [`ConfigElement::override_with`]. Merging an empty list is a conflict.
pub fn merge_fragments(fragments: &[ConfigElement]) -> Result<ConfigElement> {
    let mut iter = fragments.iter();
    let Some(first) = iter.next() else {
        return Err(ConfigError::MergeConflict {
            config_id: "<empty>".to_string(),
            reason: "no fragments to merge".to_string(),
        });
    };
    let mut merged = first.clone();
    for fragment in iter {
        merged.override_with(fragment)?;
    }
    Ok(merged)
}
