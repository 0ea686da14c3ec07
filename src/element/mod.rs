//! Element model: typed configuration nodes, identity, and merge.
//!
//! Fragments describing the same entity (equal [`ConfigId`] under the same
//! parent) are combined by the merge algorithm, never duplicated. The
//! variant tag ([`ElementKind`]) decides the identity rule; the per-fragment
//! [`MergeBehavior`] decides how a later fragment combines with an earlier
//! one.

mod document;
mod list;
mod merge;
mod model;
pub mod types;


pub use document::ConfigDocument;
pub use list::ConfigurationList;
pub use merge::merge_fragments;
pub use model::{ConfigElement, ConfigId};
pub use types::{ElementKind, MergeBehavior, RawValue};
