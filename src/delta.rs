//! Structural comparison of two resolved configuration snapshots.
//!
//! Each level of the tree is keyed by ConfigId. Children are compared
//! first, so a node whose own properties are untouched but whose subtree
//! changed is reported as `NestedUpdateOnly`. Unchanged subtrees are elided
//! from the emitted delta. Default-id synthesis artifacts are ignored: an
//! entity whose content is unchanged but whose generated id shifted is not
//! reported.

use crate::element::ConfigId;
use crate::evaluate::EvaluationResult;
use crate::expression::Value;
use serde::Serialize;
use std::collections::BTreeMap;

/// Classification of one node in the delta tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaKind {
    Added,
    Removed,
    Modified,
    Unchanged,
}

/// Why a node is `Modified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaReason {
    /// The node's own resolved properties, behavior, or matched registry
    /// entry changed.
    PropertiesUpdate,
    /// Only a descendant changed.
    NestedUpdateOnly,
}

/// One node of the emitted delta tree.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigDelta {
    /// Identity of the affected entity.
    pub config_id: ConfigId,
    pub kind: DeltaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DeltaReason>,
    /// Pid of the matched registry entry, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_pid: Option<String>,
    /// Non-unchanged child deltas, in snapshot order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ConfigDelta>,
}

impl ConfigDelta {
    fn whole_tree(result: &EvaluationResult, kind: DeltaKind) -> ConfigDelta {
        ConfigDelta {
            config_id: result.config_id.clone(),
            kind,
            reason: None,
            registry_pid: result.registry_pid.clone(),
            children: result.nested.iter().map(|n| Self::whole_tree(n, kind)).collect(),
        }
    }
}

/// Property names carrying identity artifacts rather than content.
const IDENTITY_PROPERTIES: &[&str] = &["id", "config.displayId", "config.parentPid"];

fn content_properties(result: &EvaluationResult) -> BTreeMap<&str, &Value> {
    result
        .properties
        .iter()
        .filter(|(name, _)| !IDENTITY_PROPERTIES.contains(&name.as_str()))
        .map(|(name, value)| (name.as_str(), value))
        .collect()
}

/// Whether two entities' own state is equal, ignoring identity artifacts.
///
/// A registry-entry identity difference counts as an own-property change
/// even when the property dictionaries match.
fn own_content_equals(a: &EvaluationResult, b: &EvaluationResult) -> bool {
    a.node_name == b.node_name
        && a.registry_pid == b.registry_pid
        && a.behavior == b.behavior
        && a.valid == b.valid
        && content_properties(a) == content_properties(b)
}

/// Deep equality ignoring identity artifacts at every level.
fn content_equals(a: &EvaluationResult, b: &EvaluationResult) -> bool {
    own_content_equals(a, b)
        && a.nested.len() == b.nested.len()
        && a.nested.iter().zip(b.nested.iter()).all(|(x, y)| content_equals(x, y))
}

/// Diff two resolved snapshots, returning the non-unchanged delta forest.
///
/// Output order: entities of the new snapshot in snapshot order, then
/// removed entities in previous-snapshot order.
pub fn compare(previous: &[EvaluationResult], next: &[EvaluationResult]) -> Vec<ConfigDelta> {
    let mut matched_prev = vec![false; previous.len()];
    let mut deltas: Vec<ConfigDelta> = Vec::new();
    // Index into `deltas` for each Added entry, for artifact pairing below.
    let mut added: Vec<(usize, usize)> = Vec::new();

    for (next_index, entity) in next.iter().enumerate() {
        let prior = previous
            .iter()
            .enumerate()
            .find(|(i, p)| !matched_prev[*i] && p.config_id == entity.config_id);
        match prior {
            Some((i, prior)) => {
                matched_prev[i] = true;
                if let Some(delta) = compare_entity(prior, entity) {
                    deltas.push(delta);
                }
            }
            None => {
                added.push((deltas.len(), next_index));
                deltas.push(ConfigDelta::whole_tree(entity, DeltaKind::Added));
            }
        }
    }

    // An add/remove pair with equal content is a default-id shift, not a
    // change; drop both sides.
    let mut elided: Vec<usize> = Vec::new();
    for (delta_index, next_index) in added {
        let entity = &next[next_index];
        let artifact = previous.iter().enumerate().find(|(i, p)| {
            !matched_prev[*i]
                && p.config_id.pid == entity.config_id.pid
                && content_equals(p, entity)
        });
        if let Some((i, _)) = artifact {
            matched_prev[i] = true;
            elided.push(delta_index);
        }
    }
    for index in elided.into_iter().rev() {
        deltas.remove(index);
    }

    for (i, prior) in previous.iter().enumerate() {
        if !matched_prev[i] {
            deltas.push(ConfigDelta::whole_tree(prior, DeltaKind::Removed));
        }
    }
    deltas
}

/// Delta for one entity present in both snapshots; `None` when unchanged.
fn compare_entity(prior: &EvaluationResult, next: &EvaluationResult) -> Option<ConfigDelta> {
    let children = compare(&prior.nested, &next.nested);
    let own_changed = !own_content_equals(prior, next);
    if !own_changed && children.is_empty() {
        return None;
    }
    let reason = if own_changed {
        DeltaReason::PropertiesUpdate
    } else {
        DeltaReason::NestedUpdateOnly
    };
    Some(ConfigDelta {
        config_id: next.config_id.clone(),
        kind: DeltaKind::Modified,
        reason: Some(reason),
        registry_pid: next.registry_pid.clone(),
        children,
    })
}
