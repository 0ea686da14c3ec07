//! ConfigId and ConfigElement definitions.

use super::types::{ElementKind, MergeBehavior, RawValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identity tuple distinguishing configuration entities.
///
/// A singleton is identified by pid alone; a factory instance by (pid, id).
/// Nested entities additionally carry the identity of their parent, stored
/// as a value rather than a reference so the tree owns its children in one
/// direction only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConfigId {
    /// Stable type/category identifier (e.g. "dataSource").
    pub pid: String,
    /// Instance identifier; absent for singletons.
    pub id: Option<String>,
    /// Identity of the enclosing entity, for nested elements.
    pub parent: Option<Box<ConfigId>>,
}

impl ConfigId {
    /// Identity of a singleton entity.
    pub fn singleton(pid: impl Into<String>) -> Self {
        ConfigId {
            pid: pid.into(),
            id: None,
            parent: None,
        }
    }

    /// Identity of a factory instance.
    pub fn instance(pid: impl Into<String>, id: impl Into<String>) -> Self {
        ConfigId {
            pid: pid.into(),
            id: Some(id.into()),
            parent: None,
        }
    }

    /// This identity re-rooted under `parent`.
    pub fn with_parent(mut self, parent: ConfigId) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }
}

impl fmt::Display for ConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = &self.parent {
            write!(f, "{}/", parent)?;
        }
        match &self.id {
            Some(id) => write!(f, "{}[{}]", self.pid, id),
            None => write!(f, "{}", self.pid),
        }
    }
}

/// One configuration node: a raw fragment before merge, or a merged entity
/// afterwards.
///
/// Fragments sharing a [`ConfigId`] under the same parent describe the same
/// entity and are combined by [`merge_fragments`](super::merge_fragments),
/// never duplicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigElement {
    /// Tag the fragment was written under.
    pub node_name: String,
    /// Owning type identifier. Empty until normalized from `node_name`.
    pub pid: String,
    /// Instance identifier, when supplied by the source document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Variant tag; decides the identity rule.
    pub kind: ElementKind,
    /// Monotonic number reflecting document order.
    pub sequence: u64,
    /// Source location, for diagnostics only.
    pub origin: String,
    /// How this fragment combines with earlier fragments of equal identity.
    pub behavior: MergeBehavior,
    /// Attribute name to raw value.
    pub attributes: BTreeMap<String, RawValue>,
    /// Ordered child elements.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ConfigElement>,
    /// Identity of the enclosing element. Used only for identity-path
    /// reconstruction, never for traversal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<ConfigId>,
    /// True when `id` came from the source document rather than default-id
    /// synthesis. An explicit non-default id wins on merge.
    #[serde(skip)]
    pub using_non_default_id: bool,
}

impl Default for ConfigElement {
    fn default() -> Self {
        ConfigElement {
            node_name: String::new(),
            pid: String::new(),
            id: None,
            kind: ElementKind::Simple,
            sequence: 0,
            origin: String::new(),
            behavior: MergeBehavior::Merge,
            attributes: BTreeMap::new(),
            children: Vec::new(),
            parent: None,
            using_non_default_id: false,
        }
    }
}

impl ConfigElement {
    /// A new raw fragment with the given tag. The pid defaults to the tag
    /// until the type registry resolves a canonical one.
    pub fn new(node_name: impl Into<String>) -> Self {
        let node_name = node_name.into();
        ConfigElement {
            pid: node_name.clone(),
            node_name,
            ..ConfigElement::default()
        }
    }

    /// Builder-style id assignment, marking the id as explicitly supplied.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self.using_non_default_id = true;
        self
    }

    /// Builder-style attribute assignment.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Builder-style merge behavior.
    pub fn with_behavior(mut self, behavior: MergeBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Builder-style child element.
    pub fn with_child(mut self, child: ConfigElement) -> Self {
        self.children.push(child);
        self
    }

    /// Builder-style origin location.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// The raw value of an attribute.
    pub fn attribute(&self, name: &str) -> Option<&RawValue> {
        self.attributes.get(name)
    }

    /// Identity of this element under its current id assignment.
    ///
    /// Singletons are identified by pid alone regardless of any stray id.
    pub fn config_id(&self) -> ConfigId {
        let id = match self.kind {
            ElementKind::Singleton => None,
            _ => self.id.clone(),
        };
        ConfigId {
            pid: self.pid.clone(),
            id,
            parent: self.parent.clone().map(Box::new),
        }
    }

    /// Human-readable identity path, for diagnostics and delta reporting.
    pub fn display_id(&self) -> String {
        self.config_id().to_string()
    }

    /// Assign an id to an id-less factory fragment.
    ///
    /// Priority: explicitly supplied default, then the type-declared
    /// default, then a generated `default-<index>` from document position.
    /// An id already present is never overwritten.
    pub fn resolve_default_id(
        &mut self,
        explicit_default: Option<&str>,
        declared_default: Option<&str>,
        index: usize,
    ) {
        if self.id.is_some() {
            return;
        }
        let id = explicit_default
            .map(str::to_string)
            .or_else(|| declared_default.map(str::to_string))
            .unwrap_or_else(|| format!("default-{index}"));
        self.id = Some(id);
        self.using_non_default_id = false;
    }

    /// Structural equality ignoring the sequence number, origin, and
    /// id-assignment artifacts. Used by the delta engine: two entities built
    /// from the same content compare equal even when default-id synthesis
    /// differed.
    pub fn content_equals(&self, other: &ConfigElement) -> bool {
        if self.pid != other.pid
            || self.behavior != other.behavior
            || self.attributes != other.attributes
            || self.children.len() != other.children.len()
        {
            return false;
        }
        self.children
            .iter()
            .zip(other.children.iter())
            .all(|(a, b)| a.content_equals(b))
    }
}
