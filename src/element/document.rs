//! Raw fragment documents.
//!
//! A document is an ordered list of raw top-level fragments, as produced by
//! an external parser. The YAML entry point gives tests and embedders a
//! structural encoding without defining a textual grammar of their own;
//! unknown fields are ignored for forward compatibility.

use super::model::ConfigElement;
use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};

/// An ordered set of raw top-level fragments from one source document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigDocument {
    /// Top-level fragments in document order.
    pub elements: Vec<ConfigElement>,
}

impl ConfigDocument {
    /// Parse a document from a YAML string and normalize it.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut doc: ConfigDocument =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Document(e.to_string()))?;
        doc.normalize("<yaml>");
        Ok(doc)
    }

    /// Fill in derived fields after deserialization: pids default to the
    /// node name, sequence numbers follow document order, empty origins get
    /// the document name, and explicitly supplied ids are marked as such.
    pub fn normalize(&mut self, origin: &str) {
        let mut sequence = 0u64;
        for element in &mut self.elements {
            normalize_element(element, origin, &mut sequence);
        }
    }

    /// Concatenate another document's fragments after this one, renumbering
    /// to keep sequence order monotonic across documents.
    pub fn extend(&mut self, other: ConfigDocument) {
        let base = self
            .elements
            .iter()
            .map(|e| e.sequence)
            .max()
            .map(|s| s + 1)
            .unwrap_or(0);
        for mut element in other.elements {
            bump_sequence(&mut element, base);
            self.elements.push(element);
        }
    }
}

fn normalize_element(element: &mut ConfigElement, origin: &str, sequence: &mut u64) {
    if element.pid.is_empty() {
        element.pid = element.node_name.clone();
    }
    if element.origin.is_empty() {
        element.origin = origin.to_string();
    }
    element.sequence = *sequence;
    *sequence += 1;
    if element.id.is_some() {
        element.using_non_default_id = true;
    }
    for child in &mut element.children {
        normalize_element(child, origin, sequence);
    }
}

fn bump_sequence(element: &mut ConfigElement, base: u64) {
    element.sequence += base;
    for child in &mut element.children {
        bump_sequence(child, base);
    }
}
