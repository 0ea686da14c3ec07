//! canopy: declarative configuration resolution.
//!
//! Resolves a tree of declaratively specified configuration fragments into
//! one canonical, typed snapshot. Fragments describing the same entity are
//! merged rather than duplicated, `${...}` substitutions inside attribute
//! values are evaluated against variables and sibling attributes, and
//! successive snapshots are diffed so only the changed entities trigger
//! downstream reconfiguration.
//!
//! The usual entry point is [`engine::ConfigEngine`]: feed it a
//! [`element::ConfigDocument`] per pass and a
//! [`engine::NotificationSink`] to receive the changes.

pub mod delta;
pub mod element;
pub mod engine;
pub mod error;
pub mod evaluate;
pub mod events;
pub mod expression;
pub mod registry;

pub use delta::{ConfigDelta, DeltaKind, DeltaReason};
pub use element::{ConfigDocument, ConfigElement, ConfigId};
pub use engine::{ConfigEngine, NotificationSink, PassOutcome};
pub use error::{ConfigError, OnError, Result};
pub use evaluate::{EvaluationResult, Resolver};
pub use registry::{AttributeDefinition, RegistryEntry, TypeRegistry};
