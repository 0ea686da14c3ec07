//! Resolution pass orchestration.
//!
//! One pass takes a raw fragment document through grouping, merge,
//! evaluation, and delta computation, then fans the changed entities out to
//! a notification sink. Passes are sequential: each runs to completion
//! against the engine's retained snapshot before the next begins. The fire
//! step holds a per-entity lock and releases it before moving on, so no
//! lock spans the whole fan-out.

use crate::delta::{self, ConfigDelta, DeltaKind};
use crate::element::{ConfigDocument, ConfigId, ConfigurationList};
use crate::error::{ConfigError, OnError, Result};
use crate::evaluate::{EvaluationResult, Resolver};
use crate::registry::TypeRegistry;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

/// Receiver for per-entity change notifications.
///
/// Each call may fail independently; a failure is reported in the pass
/// outcome and never aborts sibling notifications.
pub trait NotificationSink {
    /// An entity was added or modified. `snapshot` is its resolved state.
    fn entity_updated(&mut self, delta: &ConfigDelta, snapshot: &EvaluationResult) -> Result<()>;

    /// An entity disappeared from the configuration.
    fn entity_removed(&mut self, delta: &ConfigDelta) -> Result<()>;
}

/// What one pass produced.
#[derive(Debug)]
pub struct PassOutcome {
    /// The non-unchanged delta forest against the previous snapshot.
    pub changes: Vec<ConfigDelta>,
    /// Problems recorded without aborting the pass.
    pub warnings: Vec<String>,
}

/// Drives resolution passes and retains the current snapshot between them.
pub struct ConfigEngine {
    registry: TypeRegistry,
    variables: BTreeMap<String, String>,
    on_error: OnError,
    snapshot: Vec<EvaluationResult>,
    locks: BTreeMap<String, Mutex<()>>,
}

impl ConfigEngine {
    pub fn new(registry: TypeRegistry) -> Self {
        ConfigEngine {
            registry,
            variables: BTreeMap::new(),
            on_error: OnError::default(),
            snapshot: Vec::new(),
            locks: BTreeMap::new(),
        }
    }

    /// Set the policy for passes that produce invalid entities.
    pub fn with_on_error(mut self, on_error: OnError) -> Self {
        self.on_error = on_error;
        self
    }

    /// Add an externally supplied variable visible to every pass.
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// The snapshot produced by the most recent pass.
    pub fn snapshot(&self) -> &[EvaluationResult] {
        &self.snapshot
    }

    /// Run one resolution pass over `document` and notify `sink` of every
    /// changed entity.
    ///
    /// Under [`OnError::Warn`], per-entity failures are recorded in the
    /// outcome and the pass continues with the remaining entities; under
    /// [`OnError::Fail`], the first failure aborts the pass and the retained
    /// snapshot is left untouched.
    pub fn apply(
        &mut self,
        document: &ConfigDocument,
        sink: &mut dyn NotificationSink,
    ) -> Result<PassOutcome> {
        let mut warnings: Vec<String> = Vec::new();
        let resolved = self.resolve_document(document, &mut warnings)?;
        let changes = delta::compare(&self.snapshot, &resolved);

        for change in &changes {
            self.notify(change, &resolved, sink, &mut warnings);
        }

        self.snapshot = resolved;
        Ok(PassOutcome { changes, warnings })
    }

    fn resolve_document(
        &self,
        document: &ConfigDocument,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<EvaluationResult>> {
        // Group top-level fragments by pid, in first-appearance order. The
        // registry decides the kind of fragments that carry no explicit tag.
        let mut lists: Vec<(String, ConfigurationList)> = Vec::new();
        for element in &document.elements {
            let mut element = element.clone();
            self.registry.resolve_kind(&mut element);
            match lists.iter_mut().find(|(pid, _)| *pid == element.pid) {
                Some((_, list)) => list.add(element),
                None => {
                    let pid = element.pid.clone();
                    let mut list = ConfigurationList::new();
                    list.add(element);
                    lists.push((pid, list));
                }
            }
        }

        let resolver = Resolver::new(&self.registry).with_variables(self.variables.clone());
        let mut resolved = Vec::new();
        for (pid, list) in lists {
            let declared_default = self
                .registry
                .entry_for(&pid)
                .and_then(|e| e.default_id.clone());
            let merged = match list.merged(declared_default.as_deref()) {
                Ok(merged) => merged,
                Err(err) => {
                    if self.on_error == OnError::Fail {
                        return Err(err);
                    }
                    warnings.push(err.to_string());
                    continue;
                }
            };
            for element in merged {
                match resolver.resolve(&element) {
                    Ok(result) => {
                        if !result.valid {
                            if self.on_error == OnError::Fail {
                                return Err(ConfigError::InvalidEntity {
                                    config_id: result.config_id.to_string(),
                                    detail: result.warnings.join("; "),
                                });
                            }
                            for warning in &result.warnings {
                                warnings.push(format!("{}: {}", result.config_id, warning));
                            }
                        }
                        resolved.push(result);
                    }
                    Err(err) => {
                        if self.on_error == OnError::Fail {
                            return Err(err);
                        }
                        warnings.push(err.to_string());
                    }
                }
            }
        }
        Ok(resolved)
    }

    /// Fire one delta node, fan it out to the entity's supertypes, and
    /// recurse into its children.
    ///
    /// Each supertype declared in the registry's extends chain receives a
    /// follow-on notification re-keyed to its own pid, so a sink tracking
    /// the supertype sees the change without knowing the concrete subtype.
    fn notify(
        &mut self,
        change: &ConfigDelta,
        resolved: &[EvaluationResult],
        sink: &mut dyn NotificationSink,
        warnings: &mut Vec<String>,
    ) {
        self.fire(change, &change.config_id, resolved, sink, warnings);

        if let Some(pid) = change.registry_pid.clone() {
            for supertype in self.registry.supertypes(&pid) {
                let follow_on = ConfigDelta {
                    config_id: ConfigId {
                        pid: supertype.clone(),
                        id: change.config_id.id.clone(),
                        parent: change.config_id.parent.clone(),
                    },
                    kind: change.kind,
                    reason: change.reason,
                    registry_pid: Some(supertype),
                    children: Vec::new(),
                };
                // The snapshot stays keyed by the concrete entity.
                self.fire(&follow_on, &change.config_id, resolved, sink, warnings);
            }
        }

        for child in &change.children {
            self.notify(child, resolved, sink, warnings);
        }
    }

    /// Fire one delta node under its entity's lock. A removal releases the
    /// lock entry once fired; the entity no longer exists to contend on.
    fn fire(
        &mut self,
        change: &ConfigDelta,
        snapshot_id: &ConfigId,
        resolved: &[EvaluationResult],
        sink: &mut dyn NotificationSink,
        warnings: &mut Vec<String>,
    ) {
        let key = change.config_id.to_string();
        let fired = {
            let lock = self.locks.entry(key.clone()).or_insert_with(|| Mutex::new(()));
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            match change.kind {
                DeltaKind::Removed => sink.entity_removed(change),
                _ => match find_entity(resolved, snapshot_id) {
                    Some(snapshot) => sink.entity_updated(change, snapshot),
                    None => Ok(()),
                },
            }
        };
        if change.kind == DeltaKind::Removed {
            self.locks.remove(&key);
        }
        if let Err(err) = fired {
            warnings.push(format!("notification for '{key}' failed: {err}"));
        }
    }
}

/// Depth-first search of a resolved forest by identity.
fn find_entity<'a>(results: &'a [EvaluationResult], id: &ConfigId) -> Option<&'a EvaluationResult> {
    for result in results {
        if &result.config_id == id {
            return Some(result);
        }
        if let Some(found) = find_entity(&result.nested, id) {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::DeltaReason;
    use crate::registry::{AttributeDefinition, RegistryEntry};

    #[derive(Default)]
    struct RecordingSink {
        updated: Vec<String>,
        removed: Vec<String>,
        fail_on: Option<String>,
    }

    impl NotificationSink for RecordingSink {
        fn entity_updated(&mut self, delta: &ConfigDelta, _: &EvaluationResult) -> Result<()> {
            let id = delta.config_id.to_string();
            if self.fail_on.as_deref() == Some(id.as_str()) {
                return Err(ConfigError::Journal("sink unavailable".to_string()));
            }
            self.updated.push(id);
            Ok(())
        }

        fn entity_removed(&mut self, delta: &ConfigDelta) -> Result<()> {
            self.removed.push(delta.config_id.to_string());
            Ok(())
        }
    }

    fn data_source_registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry.add(
            RegistryEntry::new("dataSource")
                .as_factory()
                .with_attribute(AttributeDefinition {
                    default: vec!["10".to_string()],
                    ..AttributeDefinition::new("maxPoolSize")
                }),
        );
        registry
    }

    const BASE_DOC: &str = r#"
elements:
  - node_name: dataSource
    kind: factory
    id: ds1
    attributes:
      jndiName: jdbc/a
  - node_name: dataSource
    kind: factory
    id: ds1
    attributes:
      maxPoolSize: "20"
"#;

    #[test]
    fn first_pass_merges_and_reports_everything_added() {
        let mut engine = ConfigEngine::new(data_source_registry());
        let mut sink = RecordingSink::default();
        let doc = ConfigDocument::from_yaml(BASE_DOC).unwrap();

        let outcome = engine.apply(&doc, &mut sink).unwrap();
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.changes.len(), 1);
        assert_eq!(outcome.changes[0].kind, DeltaKind::Added);
        assert_eq!(sink.updated, vec!["dataSource[ds1]"]);

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(
            snapshot[0].properties.get("jndiName").and_then(|v| v.as_str()),
            Some("jdbc/a")
        );
        assert_eq!(
            snapshot[0].properties.get("maxPoolSize").and_then(|v| v.as_str()),
            Some("20")
        );
    }

    #[test]
    fn identical_pass_notifies_nothing() {
        let mut engine = ConfigEngine::new(data_source_registry());
        let mut sink = RecordingSink::default();
        let doc = ConfigDocument::from_yaml(BASE_DOC).unwrap();

        engine.apply(&doc, &mut sink).unwrap();
        let outcome = engine.apply(&doc, &mut sink).unwrap();

        assert!(outcome.changes.is_empty());
        assert_eq!(sink.updated.len(), 1);
        assert!(sink.removed.is_empty());
    }

    #[test]
    fn attribute_change_is_a_modified_notification() {
        let mut engine = ConfigEngine::new(data_source_registry());
        let mut sink = RecordingSink::default();

        engine
            .apply(&ConfigDocument::from_yaml(BASE_DOC).unwrap(), &mut sink)
            .unwrap();
        let changed = BASE_DOC.replace("jdbc/a", "jdbc/b");
        let outcome = engine
            .apply(&ConfigDocument::from_yaml(&changed).unwrap(), &mut sink)
            .unwrap();

        assert_eq!(outcome.changes.len(), 1);
        assert_eq!(outcome.changes[0].kind, DeltaKind::Modified);
        assert_eq!(outcome.changes[0].reason, Some(DeltaReason::PropertiesUpdate));
        assert_eq!(sink.updated.len(), 2);
    }

    #[test]
    fn dropped_entity_is_a_removed_notification() {
        let mut engine = ConfigEngine::new(data_source_registry());
        let mut sink = RecordingSink::default();

        engine
            .apply(&ConfigDocument::from_yaml(BASE_DOC).unwrap(), &mut sink)
            .unwrap();
        engine
            .apply(&ConfigDocument::from_yaml("elements: []").unwrap(), &mut sink)
            .unwrap();

        assert_eq!(sink.removed, vec!["dataSource[ds1]"]);
    }

    #[test]
    fn supertype_entities_receive_follow_on_notifications() {
        let mut registry = TypeRegistry::new();
        registry.add(RegistryEntry::new("endpoint").as_factory());
        registry.add(RegistryEntry::new("httpEndpoint").as_factory().extending("endpoint"));
        let mut engine = ConfigEngine::new(registry);
        let mut sink = RecordingSink::default();

        let doc = ConfigDocument::from_yaml(
            "elements:\n  - node_name: httpEndpoint\n    id: h1\n",
        )
        .unwrap();
        engine.apply(&doc, &mut sink).unwrap();
        assert_eq!(sink.updated, vec!["httpEndpoint[h1]", "endpoint[h1]"]);

        engine
            .apply(&ConfigDocument::from_yaml("elements: []").unwrap(), &mut sink)
            .unwrap();
        assert_eq!(sink.removed, vec!["httpEndpoint[h1]", "endpoint[h1]"]);
    }

    #[test]
    fn registry_singleton_types_resolve_without_an_id() {
        let mut registry = TypeRegistry::new();
        registry.add(RegistryEntry::new("httpConnector"));
        let mut engine = ConfigEngine::new(registry);
        let mut sink = RecordingSink::default();

        // No explicit kind tag on the fragment; the registry entry is not a
        // factory, so the entity is a singleton with no synthesized id.
        let doc = ConfigDocument::from_yaml(
            "elements:\n  - node_name: httpConnector\n    attributes:\n      port: \"8080\"\n",
        )
        .unwrap();
        engine.apply(&doc, &mut sink).unwrap();

        assert_eq!(engine.snapshot()[0].config_id, ConfigId::singleton("httpConnector"));
        assert_eq!(sink.updated, vec!["httpConnector"]);
    }

    #[test]
    fn removed_entities_release_their_locks() {
        let mut engine = ConfigEngine::new(data_source_registry());
        let mut sink = RecordingSink::default();

        engine
            .apply(&ConfigDocument::from_yaml(BASE_DOC).unwrap(), &mut sink)
            .unwrap();
        assert_eq!(engine.locks.len(), 1);

        engine
            .apply(&ConfigDocument::from_yaml("elements: []").unwrap(), &mut sink)
            .unwrap();
        assert!(engine.locks.is_empty());
    }

    #[test]
    fn sink_failure_is_reported_not_propagated() {
        let mut engine = ConfigEngine::new(data_source_registry());
        let mut sink = RecordingSink {
            fail_on: Some("dataSource[ds1]".to_string()),
            ..RecordingSink::default()
        };
        let doc = ConfigDocument::from_yaml(
            r#"
elements:
  - node_name: dataSource
    kind: factory
    id: ds1
  - node_name: dataSource
    kind: factory
    id: ds2
"#,
        )
        .unwrap();

        let outcome = engine.apply(&doc, &mut sink).unwrap();
        // The failing entity is reported; its sibling still fires.
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("dataSource[ds1]"));
        assert_eq!(sink.updated, vec!["dataSource[ds2]"]);
    }

    #[test]
    fn invalid_entity_aborts_only_under_fail_policy() {
        let mut registry = TypeRegistry::new();
        registry.add(
            RegistryEntry::new("dataSource")
                .as_factory()
                .with_attribute(AttributeDefinition {
                    required: true,
                    ..AttributeDefinition::new("jndiName")
                }),
        );
        let doc = ConfigDocument::from_yaml(
            "elements:\n  - node_name: dataSource\n    kind: factory\n    id: ds1\n",
        )
        .unwrap();

        let mut sink = RecordingSink::default();
        let mut warn_engine = ConfigEngine::new(registry.clone());
        let outcome = warn_engine.apply(&doc, &mut sink).unwrap();
        assert!(!outcome.warnings.is_empty());
        assert_eq!(warn_engine.snapshot().len(), 1);
        assert!(!warn_engine.snapshot()[0].valid);

        let mut fail_engine = ConfigEngine::new(registry).with_on_error(OnError::Fail);
        let err = fail_engine.apply(&doc, &mut sink).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEntity { .. }));
        assert!(fail_engine.snapshot().is_empty());
    }

    #[test]
    fn engine_variables_reach_attribute_resolution() {
        let mut engine =
            ConfigEngine::new(data_source_registry()).with_variable("dbHost", "db.internal");
        let mut sink = RecordingSink::default();
        let doc = ConfigDocument::from_yaml(
            r#"
elements:
  - node_name: dataSource
    kind: factory
    id: ds1
    attributes:
      url: "jdbc://${dbHost}/orders"
"#,
        )
        .unwrap();

        engine.apply(&doc, &mut sink).unwrap();
        assert_eq!(
            engine.snapshot()[0].properties.get("url").and_then(|v| v.as_str()),
            Some("jdbc://db.internal/orders")
        );
    }
}
