//! Attribute resolution: variable substitution, declared defaults,
//! validation, and nested-element evaluation.
//!
//! One [`Resolver`] serves a whole pass; it creates a fresh
//! [`EvaluationContext`] per top-level element. Variable references use the
//! `${name}` syntax inside attribute string values. A reference that cannot
//! be substituted stays in the output as its literal `${...}` text; only
//! declared failures (cycles, lookup errors) invalidate the entity.

use super::context::{EvaluationContext, EvaluationResult, NestedInfo};
use crate::element::{ConfigElement, ConfigId, ElementKind, RawValue};
use crate::error::{ConfigError, Result};
use crate::expression::{evaluate_expression, PropertyLookup, Value, SERVICE_PID_ATTRIBUTE};
use crate::registry::{AttributeDefinition, AttributeType, TypeRegistry};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// One `${name}` reference. The inner text may be any expression; nested
/// braces are not part of the syntax.
static VARIABLE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^${}]*)\}").expect("invalid variable pattern"));

/// Resolves merged elements into property dictionaries.
pub struct Resolver<'a> {
    registry: &'a TypeRegistry,
    variables: BTreeMap<String, String>,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a TypeRegistry) -> Self {
        Resolver {
            registry,
            variables: BTreeMap::new(),
        }
    }

    /// Add an externally supplied variable.
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Add a set of externally supplied variables.
    pub fn with_variables(mut self, variables: BTreeMap<String, String>) -> Self {
        self.variables.extend(variables);
        self
    }

    /// Resolve one merged element (and its nested children) into an
    /// [`EvaluationResult`].
    ///
    /// Attribute-level failures (cycles, lookup errors, validation) are
    /// recorded as warnings and invalidate the result; they do not abort
    /// sibling attributes. Only structural failures of the element itself
    /// return an error.
    pub fn resolve(&self, element: &ConfigElement) -> Result<EvaluationResult> {
        let entry = self.registry.entry_for(&element.pid);
        let node_name = entry
            .map(|e| e.canonical_name().to_string())
            .unwrap_or_else(|| element.node_name.clone());
        let definitions = entry
            .map(|e| self.registry.complete_attributes(&e.pid))
            .unwrap_or_default();

        let mut result = EvaluationResult::new(element.config_id(), node_name);
        result.registry_pid = entry.map(|e| e.pid.clone());
        result.behavior = element.behavior;

        let mut scope = ElementScope {
            resolver: self,
            element,
            definitions,
            context: EvaluationContext::new(),
            result,
        };
        scope.evaluate()?;
        Ok(scope.result)
    }
}

/// In-progress evaluation of one element. Implements the property-lookup
/// capability the expression evaluator consumes, so `${...}` references see
/// the same memo and cycle guard as direct attribute resolution.
struct ElementScope<'a> {
    resolver: &'a Resolver<'a>,
    element: &'a ConfigElement,
    definitions: BTreeMap<String, AttributeDefinition>,
    context: EvaluationContext,
    result: EvaluationResult,
}

impl PropertyLookup for ElementScope<'_> {
    fn get_property_object(&mut self, name: &str) -> Result<Option<Value>> {
        if name == SERVICE_PID_ATTRIBUTE {
            return Ok(Some(Value::Str(self.result.config_id.to_string())));
        }
        if let Some(memoized) = self.context.memoized(name) {
            return Ok(memoized);
        }
        self.context.push_lookup(name)?;
        let outcome = self.lookup_uncached(name);
        self.context.pop_lookup(name);
        let value = outcome?;
        self.context.memoize(name, value.clone());
        Ok(value)
    }
}

impl ElementScope<'_> {
    /// Lookup order: external variable registry, already-resolved
    /// properties, the element's own raw attributes, declared defaults.
    fn lookup_uncached(&mut self, name: &str) -> Result<Option<Value>> {
        if let Some(raw) = self.resolver.variables.get(name).cloned() {
            let substituted = self.substitute(&raw)?;
            self.result.variables.insert(name.to_string());
            return Ok(Some(Value::Str(substituted)));
        }
        if let Some(value) = self.result.properties.get(name).cloned() {
            return Ok(Some(value));
        }
        if let Some(raw) = self.element.attribute(name).cloned() {
            return self.evaluate_raw(&raw).map(Some);
        }
        if let Some(def) = self.definitions.get(name).cloned() {
            if !def.default.is_empty() {
                return self.evaluate_default(&def).map(Some);
            }
        }
        Ok(None)
    }

    /// Replace every `${name}` reference in one string, left to right.
    ///
    /// A reference that resolves keeps its resolved text; one that does not
    /// keeps its literal `${...}` form. Declared failures propagate.
    fn substitute(&mut self, input: &str) -> Result<String> {
        if !input.contains("${") {
            return Ok(input.to_string());
        }
        let mut out = String::with_capacity(input.len());
        let mut last = 0;
        // Collect spans up front; each resolution below needs `&mut self`.
        let spans: Vec<(usize, usize, String)> = VARIABLE_PATTERN
            .captures_iter(input)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                Some((whole.start(), whole.end(), caps[1].to_string()))
            })
            .collect();
        for (start, end, name) in spans {
            out.push_str(&input[last..start]);
            let replacement = match self.get_property(&name)? {
                Some(value) => Some(value),
                None => evaluate_expression(self, &name)?,
            };
            match replacement {
                Some(value) => out.push_str(&value),
                None => out.push_str(&input[start..end]),
            }
            last = end;
        }
        out.push_str(&input[last..]);
        Ok(out)
    }

    /// Evaluate one raw attribute value into a resolved [`Value`].
    ///
    /// A string that is exactly one `${name}` token keeps the referenced
    /// value's shape (a list stays a list); anything else is treated as
    /// text with embedded substitutions.
    fn evaluate_raw(&mut self, raw: &RawValue) -> Result<Value> {
        match raw {
            RawValue::Str(text) => {
                if let Some(name) = single_reference(text) {
                    if let Some(value) = self.get_property_object(&name)? {
                        return Ok(value);
                    }
                }
                Ok(Value::Str(self.substitute(text)?))
            }
            RawValue::List(items) => {
                let mut resolved = Vec::with_capacity(items.len());
                for item in items {
                    resolved.push(Value::Str(self.substitute(item)?));
                }
                Ok(Value::List(resolved))
            }
        }
    }

    /// Evaluate a declared default: one value resolves to a scalar, several
    /// to a list.
    fn evaluate_default(&mut self, def: &AttributeDefinition) -> Result<Value> {
        if def.default.len() == 1 && !def.is_multi_value() {
            let text = def.default[0].clone();
            return Ok(Value::Str(self.substitute(&text)?));
        }
        let mut resolved = Vec::with_capacity(def.default.len());
        for item in &def.default {
            resolved.push(Value::Str(self.substitute(item)?));
        }
        Ok(Value::List(resolved))
    }

    /// Drive the whole element: declared attributes (final ones last), then
    /// undeclared raw attributes, identity properties, deferred copies, and
    /// nested children.
    fn evaluate(&mut self) -> Result<()> {
        let mut ordered: Vec<AttributeDefinition> = self.definitions.values().cloned().collect();
        ordered.sort_by_key(|def| def.is_final);
        for def in ordered {
            if self.context.is_processed(&def.name) {
                continue;
            }
            self.context.mark_processed(&def.name);
            self.evaluate_declared(&def);
        }

        let raw_names: Vec<String> = self.element.attributes.keys().cloned().collect();
        for name in raw_names {
            if self.context.is_processed(&name) {
                continue;
            }
            self.context.mark_processed(&name);
            if let Some(raw) = self.element.attribute(&name).cloned() {
                match self.evaluate_raw(&raw) {
                    Ok(value) => {
                        self.result.properties.insert(name, value);
                    }
                    Err(err) => self.result.invalidate(err.to_string()),
                }
            }
        }

        self.insert_identity_properties();
        self.context.apply_copies(&mut self.result.properties);
        self.evaluate_nested()?;
        Ok(())
    }

    /// Resolve one declared attribute, applying defaults, the final rule,
    /// and option validation.
    fn evaluate_declared(&mut self, def: &AttributeDefinition) {
        if let Some(source) = &def.copy_of {
            self.context.defer_copy(def.name.clone(), source.clone());
            return;
        }

        let supplied = self.supplied_raw(&def.name);

        // A user-supplied override of a final attribute is rejected: the
        // declared default stays in force and the entity is reported.
        if def.is_final && supplied.is_some() && !def.default.is_empty() {
            self.result.invalidate(
                ConfigError::Validation {
                    attribute: def.name.clone(),
                    value: supplied
                        .as_ref()
                        .and_then(|r| r.as_str())
                        .unwrap_or("<list>")
                        .to_string(),
                    message: "attribute is final and cannot be overridden".to_string(),
                }
                .to_string(),
            );
            match self.evaluate_default(def) {
                Ok(value) => {
                    self.finish_attribute(def, value);
                }
                Err(err) => self.result.invalidate(err.to_string()),
            }
            return;
        }

        let outcome = match supplied {
            Some(raw) => self.evaluate_raw(&raw).map(Some),
            None if !def.default.is_empty() => self.evaluate_default(def).map(Some),
            None => Ok(None),
        };
        match outcome {
            Ok(Some(value)) => self.finish_attribute(def, value),
            Ok(None) => {
                if def.required {
                    self.result.invalidate(
                        ConfigError::Validation {
                            attribute: def.name.clone(),
                            value: String::new(),
                            message: "required attribute is missing".to_string(),
                        }
                        .to_string(),
                    );
                }
            }
            Err(err) => self.result.invalidate(err.to_string()),
        }
    }

    /// The raw value supplied for a declared attribute. Attribute names are
    /// matched case-insensitively, like the processed set; the exact-case
    /// spelling wins when both are present.
    fn supplied_raw(&self, name: &str) -> Option<RawValue> {
        if let Some(raw) = self.element.attribute(name) {
            return Some(raw.clone());
        }
        self.element
            .attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, raw)| raw.clone())
    }

    /// Validate a resolved value against its definition and record it.
    fn finish_attribute(&mut self, def: &AttributeDefinition, value: Value) {
        self.check_declared_type(def, &value);
        let value = self.validate_options(def, value);
        if def.obscured {
            self.result.obscured.insert(def.name.clone());
        }
        if def.attr_type == AttributeType::Reference {
            if let (Some(target_pid), Some(target_id)) = (&def.reference_pid, value.as_str()) {
                self.result
                    .unresolved
                    .push(ConfigId::instance(target_pid.clone(), target_id).to_string());
            }
        }
        self.context.memoize(&def.name, Some(value.clone()));
        self.result.properties.insert(def.name.clone(), value);
    }

    /// Enforce the declared value type on scalar values.
    fn check_declared_type(&mut self, def: &AttributeDefinition, value: &Value) {
        let Some(text) = value.as_str() else {
            return;
        };
        match def.attr_type {
            AttributeType::Long => {
                if text.parse::<i64>().is_err() {
                    self.result.invalidate(
                        ConfigError::Numeric(format!(
                            "attribute '{}' value '{}' is not an integer",
                            def.name, text
                        ))
                        .to_string(),
                    );
                }
            }
            AttributeType::Boolean => {
                if text != "true" && text != "false" {
                    self.result.invalidate(
                        ConfigError::Validation {
                            attribute: def.name.clone(),
                            value: text.to_string(),
                            message: "expected 'true' or 'false'".to_string(),
                        }
                        .to_string(),
                    );
                }
            }
            AttributeType::String | AttributeType::Reference => {}
        }
    }

    /// Enforce a closed option set: an out-of-set value falls back to the
    /// declared default with a warning, or invalidates the entity when no
    /// fallback exists.
    fn validate_options(&mut self, def: &AttributeDefinition, value: Value) -> Value {
        if def.options.is_empty() {
            return value;
        }
        let Some(text) = value.as_str() else {
            return value;
        };
        if def.options.iter().any(|o| o == text) {
            return value;
        }
        let problem = ConfigError::Validation {
            attribute: def.name.clone(),
            value: text.to_string(),
            message: format!("expected one of [{}]", def.options.join(", ")),
        };
        match def.default.first() {
            Some(fallback) => {
                self.result.warn(problem.to_string());
                Value::Str(fallback.clone())
            }
            None => {
                self.result.invalidate(problem.to_string());
                value
            }
        }
    }

    /// Identity properties every resolved entity carries.
    fn insert_identity_properties(&mut self) {
        let display = self.result.config_id.to_string();
        self.result
            .properties
            .insert("config.displayId".to_string(), Value::Str(display));
        if let Some(id) = &self.result.config_id.id {
            self.result
                .properties
                .entry("id".to_string())
                .or_insert_with(|| Value::Str(id.clone()));
        }
        if let Some(parent) = &self.result.config_id.parent {
            self.result
                .properties
                .insert("config.parentPid".to_string(), Value::Str(parent.to_string()));
        }
    }

    /// Record nested children (deduplicated by identity), then resolve each
    /// surviving record as its own entity under this one.
    fn evaluate_nested(&mut self) -> Result<()> {
        let parent_id = self.result.config_id.clone();
        let mut position: BTreeMap<String, usize> = BTreeMap::new();

        let element = self.element;
        for child in &element.children {
            let mut child = child.clone();
            child.parent = Some(parent_id.clone());
            self.resolver.registry.resolve_kind(&mut child);
            let entry = self.resolver.registry.entry_for(&child.pid);
            if child.kind != ElementKind::Singleton {
                let index = position.entry(child.pid.clone()).or_insert(0);
                child.resolve_default_id(None, entry.and_then(|e| e.default_id.as_deref()), *index);
                *index += 1;
            }
            let info = NestedInfo {
                registry_pid: entry.map(|e| e.pid.clone()),
                element: child,
            };
            self.context.add_nested(info)?;
        }

        for info in self.context.take_nested() {
            let nested = self.resolver.resolve(&info.element)?;
            self.result.nested.push(nested);
        }
        Ok(())
    }
}

/// The variable name when `text` is exactly one `${name}` reference.
fn single_reference(text: &str) -> Option<String> {
    let caps = VARIABLE_PATTERN.captures(text)?;
    let whole = caps.get(0)?;
    if whole.start() == 0 && whole.end() == text.len() {
        Some(caps[1].to_string())
    } else {
        None
    }
}
