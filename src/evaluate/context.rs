//! Per-element scratch state for one resolution pass.

use crate::element::{ConfigElement, ConfigId, MergeBehavior};
use crate::error::{ConfigError, Result};
use crate::expression::Value;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// A nested child discovered while resolving one attribute, paired with its
/// matched registry entry.
#[derive(Debug, Clone)]
pub struct NestedInfo {
    pub element: ConfigElement,
    pub registry_pid: Option<String>,
}

/// A pending attribute-to-attribute copy.
#[derive(Debug, Clone)]
struct CopyRequest {
    target: String,
    source: String,
}

/// Resolved state of one entity, including its nested children.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    /// Identity of the resolved entity.
    pub config_id: ConfigId,
    /// Resolved node name: the type's canonical name if known, else the
    /// original tag.
    pub node_name: String,
    /// Pid of the matched registry entry, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_pid: Option<String>,
    /// Merge behavior the winning fragment declared.
    pub behavior: MergeBehavior,
    /// Resolved property dictionary.
    pub properties: BTreeMap<String, Value>,
    /// False when any attribute of this entity failed resolution or
    /// validation.
    pub valid: bool,
    /// Reference targets that could not be checked during this pass.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<String>,
    /// External variable names this entity's resolution consumed.
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub variables: BTreeSet<String>,
    /// Problems recorded without aborting the entity.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Property names whose values must be redacted when serialized.
    #[serde(skip)]
    pub obscured: BTreeSet<String>,
    /// Resolved nested entities, in discovery order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nested: Vec<EvaluationResult>,
}

impl EvaluationResult {
    pub fn new(config_id: ConfigId, node_name: impl Into<String>) -> Self {
        EvaluationResult {
            config_id,
            node_name: node_name.into(),
            registry_pid: None,
            behavior: MergeBehavior::default(),
            properties: BTreeMap::new(),
            valid: true,
            unresolved: Vec::new(),
            variables: BTreeSet::new(),
            warnings: Vec::new(),
            obscured: BTreeSet::new(),
            nested: Vec::new(),
        }
    }

    /// Record a problem and mark the entity invalid.
    pub fn invalidate(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
        self.valid = false;
    }

    /// Record a problem without invalidating the entity.
    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

/// Scratch state created per top-level element and destroyed when its
/// resolution (including nested elements) completes.
///
/// Holds the cycle-guard stack, the value memo, the processed-attribute set,
/// the nested-info records, and the deferred copy queue described in the
/// resolution protocol.
#[derive(Debug, Default)]
pub struct EvaluationContext {
    lookup_stack: Vec<String>,
    memo: HashMap<String, Option<Value>>,
    processed: HashSet<String>,
    nested: Vec<NestedInfo>,
    copies: Vec<CopyRequest>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter resolution of `name`.
    ///
    /// Fails when `name` is already being resolved, reporting the chain from
    /// its first occurrence to the top of the stack. A successful push must
    /// be paired with [`pop_lookup`](EvaluationContext::pop_lookup) on every
    /// exit path.
    pub fn push_lookup(&mut self, name: &str) -> Result<()> {
        if let Some(first) = self.lookup_stack.iter().position(|n| n == name) {
            return Err(ConfigError::CycleDetected {
                chain: self.lookup_stack[first..].to_vec(),
            });
        }
        self.lookup_stack.push(name.to_string());
        Ok(())
    }

    /// Leave resolution of `name`.
    pub fn pop_lookup(&mut self, name: &str) {
        let popped = self.lookup_stack.pop();
        debug_assert_eq!(popped.as_deref(), Some(name));
    }

    /// The memoized value of `name`, if it was already resolved in this
    /// context. `Some(None)` records a resolved absence.
    pub fn memoized(&self, name: &str) -> Option<Option<Value>> {
        self.memo.get(name).cloned()
    }

    /// Record the resolution outcome of `name`.
    pub fn memoize(&mut self, name: &str, value: Option<Value>) {
        self.memo.insert(name.to_string(), value);
    }

    /// Whether the attribute was already processed, case-insensitively.
    pub fn is_processed(&self, name: &str) -> bool {
        self.processed.contains(&name.to_uppercase())
    }

    /// Mark an attribute processed, case-insensitively.
    pub fn mark_processed(&mut self, name: &str) {
        self.processed.insert(name.to_uppercase());
    }

    /// Record a nested child, deduplicated by ConfigId.
    ///
    /// A later record of equal identity overrides the earlier one with the
    /// same semantics as the fragment merge, rather than producing a
    /// duplicate.
    pub fn add_nested(&mut self, info: NestedInfo) -> Result<()> {
        let id = info.element.config_id();
        match self.nested.iter_mut().find(|n| n.element.config_id() == id) {
            Some(existing) => {
                existing.element.override_with(&info.element)?;
                if info.registry_pid.is_some() {
                    existing.registry_pid = info.registry_pid;
                }
            }
            None => self.nested.push(info),
        }
        Ok(())
    }

    /// The deduplicated nested records, in discovery order, consuming them.
    pub fn take_nested(&mut self) -> Vec<NestedInfo> {
        std::mem::take(&mut self.nested)
    }

    /// Queue a copy of `source`'s resolved value into `target`, to be
    /// applied after primary resolution completes.
    pub fn defer_copy(&mut self, target: impl Into<String>, source: impl Into<String>) {
        self.copies.push(CopyRequest {
            target: target.into(),
            source: source.into(),
        });
    }

    /// Apply all queued copies once, in submission order. A copy whose
    /// source is absent is a no-op.
    pub fn apply_copies(&mut self, properties: &mut BTreeMap<String, Value>) {
        for copy in self.copies.drain(..) {
            if let Some(value) = properties.get(&copy.source).cloned() {
                properties.insert(copy.target, value);
            }
        }
    }
}
