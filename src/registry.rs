//! Type registry: declared attribute definitions and hierarchy metadata.
//!
//! Registry entries drive default-id resolution, attribute defaults and
//! validation during evaluation, and own-property comparison in the delta
//! engine. The registry is read-only during a resolution pass.

use crate::element::{ConfigElement, ElementKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declared value type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    #[default]
    String,
    Long,
    Boolean,
    /// A reference to another entity by pid.
    Reference,
}

/// Declared metadata for one attribute of an entity type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeDefinition {
    /// Attribute name as it appears in fragments.
    pub name: String,

    /// Declared value type.
    pub attr_type: AttributeType,

    /// Cardinality: 0 for a scalar, non-zero for an ordered multi-value
    /// (absolute value is the maximum count; negative mirrors the
    /// vector-style declaration of the source model).
    pub cardinality: i32,

    /// Default values applied when the attribute is unset.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub default: Vec<String>,

    /// Whether resolution without a value invalidates the entity.
    pub required: bool,

    /// Immutable once set: a user-supplied override is rejected and
    /// reported.
    pub is_final: bool,

    /// Sensitive value; redacted when snapshots are serialized.
    pub obscured: bool,

    /// This attribute receives a copy of another attribute's resolved
    /// value after primary resolution completes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copy_of: Option<String>,

    /// Target pid for reference-typed attributes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_pid: Option<String>,

    /// Closed set of permitted values, when non-empty.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl AttributeDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        AttributeDefinition {
            name: name.into(),
            ..AttributeDefinition::default()
        }
    }

    /// Whether this attribute holds an ordered multi-value.
    pub fn is_multi_value(&self) -> bool {
        self.cardinality != 0
    }
}

/// Metadata describing one entity type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryEntry {
    /// Canonical type identifier.
    pub pid: String,

    /// Short name fragments may be written under.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Short name for nested use under a supporting parent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_alias: Option<String>,

    /// Pid of the supertype this entry extends, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,

    /// Type-declared default instance id for factory entities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_id: Option<String>,

    /// Whether this type may have multiple concurrent instances.
    pub factory: bool,

    /// Declared attributes by name.
    pub attributes: BTreeMap<String, AttributeDefinition>,
}

impl RegistryEntry {
    pub fn new(pid: impl Into<String>) -> Self {
        RegistryEntry {
            pid: pid.into(),
            ..RegistryEntry::default()
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_attribute(mut self, def: AttributeDefinition) -> Self {
        self.attributes.insert(def.name.clone(), def);
        self
    }

    pub fn as_factory(mut self) -> Self {
        self.factory = true;
        self
    }

    pub fn extending(mut self, pid: impl Into<String>) -> Self {
        self.extends = Some(pid.into());
        self
    }

    /// The name resolved elements are reported under: the alias if declared,
    /// else the pid.
    pub fn canonical_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.pid)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDefinition> {
        self.attributes.get(name)
    }
}

/// In-memory registry of entity types, addressable by pid, alias, or child
/// alias.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    entries: BTreeMap<String, RegistryEntry>,
    names: BTreeMap<String, String>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entry, indexing its pid and any aliases.
    pub fn add(&mut self, entry: RegistryEntry) {
        self.names.insert(entry.pid.clone(), entry.pid.clone());
        if let Some(alias) = &entry.alias {
            self.names.insert(alias.clone(), entry.pid.clone());
        }
        if let Some(child_alias) = &entry.child_alias {
            self.names.insert(child_alias.clone(), entry.pid.clone());
        }
        self.entries.insert(entry.pid.clone(), entry);
    }

    /// Look up an entry by pid or alias.
    pub fn entry_for(&self, name: &str) -> Option<&RegistryEntry> {
        let pid = self.names.get(name)?;
        self.entries.get(pid)
    }

    /// The chain of supertype pids for `pid`, nearest first.
    pub fn supertypes(&self, pid: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = self.entry_for(pid).and_then(|e| e.extends.clone());
        while let Some(parent) = current {
            // A malformed registry could declare an extends cycle.
            if chain.contains(&parent) {
                break;
            }
            current = self.entry_for(&parent).and_then(|e| e.extends.clone());
            chain.push(parent);
        }
        chain
    }

    /// Fill in an unspecified element kind from the matched entry's factory
    /// flag, so a singleton-typed element never receives a synthesized id.
    /// An explicitly tagged element is left alone.
    pub fn resolve_kind(&self, element: &mut ConfigElement) {
        if element.kind != ElementKind::Simple {
            return;
        }
        if let Some(entry) = self.entry_for(&element.pid) {
            element.kind = if entry.factory {
                ElementKind::Factory
            } else {
                ElementKind::Singleton
            };
        }
    }

    /// Attribute definitions for `pid` including inherited ones; a subtype
    /// declaration shadows its supertype's.
    pub fn complete_attributes(&self, pid: &str) -> BTreeMap<String, AttributeDefinition> {
        let mut merged: BTreeMap<String, AttributeDefinition> = BTreeMap::new();
        for ancestor in self.supertypes(pid).into_iter().rev() {
            if let Some(entry) = self.entry_for(&ancestor) {
                merged.extend(entry.attributes.clone());
            }
        }
        if let Some(entry) = self.entry_for(pid) {
            merged.extend(entry.attributes.clone());
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_resolves_by_pid_and_alias() {
        let mut registry = TypeRegistry::new();
        registry.add(RegistryEntry::new("com.example.ds").with_alias("dataSource").as_factory());

        assert_eq!(registry.entry_for("com.example.ds").unwrap().pid, "com.example.ds");
        assert_eq!(registry.entry_for("dataSource").unwrap().pid, "com.example.ds");
        assert!(registry.entry_for("unknown").is_none());
    }

    #[test]
    fn canonical_name_prefers_alias() {
        let entry = RegistryEntry::new("com.example.ds").with_alias("dataSource");
        assert_eq!(entry.canonical_name(), "dataSource");
        assert_eq!(RegistryEntry::new("bare").canonical_name(), "bare");
    }

    #[test]
    fn resolve_kind_follows_the_factory_flag() {
        let mut registry = TypeRegistry::new();
        registry.add(RegistryEntry::new("dataSource").as_factory());
        registry.add(RegistryEntry::new("httpConnector"));

        let mut element = ConfigElement::new("dataSource");
        registry.resolve_kind(&mut element);
        assert_eq!(element.kind, ElementKind::Factory);

        let mut element = ConfigElement::new("httpConnector");
        registry.resolve_kind(&mut element);
        assert_eq!(element.kind, ElementKind::Singleton);

        // Unknown pids and explicit tags are left alone.
        let mut element = ConfigElement::new("unknown");
        registry.resolve_kind(&mut element);
        assert_eq!(element.kind, ElementKind::Simple);

        let mut element = ConfigElement::new("httpConnector");
        element.kind = ElementKind::Factory;
        registry.resolve_kind(&mut element);
        assert_eq!(element.kind, ElementKind::Factory);
    }

    #[test]
    fn supertype_chain_is_nearest_first() {
        let mut registry = TypeRegistry::new();
        registry.add(RegistryEntry::new("base"));
        registry.add(RegistryEntry::new("middle").extending("base"));
        registry.add(RegistryEntry::new("leaf").extending("middle"));

        assert_eq!(registry.supertypes("leaf"), vec!["middle", "base"]);
        assert!(registry.supertypes("base").is_empty());
    }

    #[test]
    fn supertype_cycle_terminates() {
        let mut registry = TypeRegistry::new();
        registry.add(RegistryEntry::new("a").extending("b"));
        registry.add(RegistryEntry::new("b").extending("a"));

        let chain = registry.supertypes("a");
        assert!(chain.len() <= 2);
    }

    #[test]
    fn complete_attributes_shadow_supertype_declarations() {
        let mut registry = TypeRegistry::new();
        registry.add(
            RegistryEntry::new("base")
                .with_attribute(AttributeDefinition {
                    default: vec!["base-default".to_string()],
                    ..AttributeDefinition::new("shared")
                })
                .with_attribute(AttributeDefinition::new("baseOnly")),
        );
        registry.add(
            RegistryEntry::new("leaf").extending("base").with_attribute(AttributeDefinition {
                default: vec!["leaf-default".to_string()],
                ..AttributeDefinition::new("shared")
            }),
        );

        let attrs = registry.complete_attributes("leaf");
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs["shared"].default, vec!["leaf-default"]);
        assert!(attrs.contains_key("baseOnly"));
    }
}
