//! Ordered collections of same-kind raw elements.

use super::merge::merge_fragments;
use super::model::{ConfigElement, ConfigId};
use super::types::ElementKind;
use crate::error::Result;

/// An ordered collection of raw elements of one kind (one pid).
///
/// Built fresh per parse of a document; immutable once handed to the merge
/// step except for explicit [`add`](ConfigurationList::add) /
/// [`remove`](ConfigurationList::remove) by the owning document model.
#[derive(Debug, Clone, Default)]
pub struct ConfigurationList {
    elements: Vec<ConfigElement>,
}

impl ConfigurationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element in document order.
    pub fn add(&mut self, element: ConfigElement) {
        self.elements.push(element);
    }

    /// Remove the element with the given sequence number, if present.
    pub fn remove(&mut self, sequence: u64) -> Option<ConfigElement> {
        let idx = self.elements.iter().position(|e| e.sequence == sequence)?;
        Some(self.elements.remove(idx))
    }

    /// The flat collection, in document order.
    pub fn collection(&self) -> &[ConfigElement] {
        &self.elements
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Group elements into buckets keyed by resolved ConfigId, synthesizing
    /// positional default ids for id-less factory fragments.
    ///
    /// Bucket order follows first appearance in the document; fragments
    /// within a bucket keep document order.
    pub fn group_by_id(
        &self,
        declared_default: Option<&str>,
    ) -> Vec<(ConfigId, Vec<ConfigElement>)> {
        let mut buckets: Vec<(ConfigId, Vec<ConfigElement>)> = Vec::new();
        for (index, element) in self.elements.iter().enumerate() {
            let mut element = element.clone();
            element.resolve_default_id(None, declared_default, index);
            let id = element.config_id();
            match buckets.iter_mut().find(|(key, _)| *key == id) {
                Some((_, bucket)) => bucket.push(element),
                None => buckets.push((id, vec![element])),
            }
        }
        buckets
    }

    /// All fragments whose resolved id equals `id`, with the same default-id
    /// synthesis as [`group_by_id`](ConfigurationList::group_by_id).
    pub fn filter_by_id(&self, id: &str, declared_default: Option<&str>) -> Vec<ConfigElement> {
        self.group_by_id(declared_default)
            .into_iter()
            .filter(|(key, _)| key.id.as_deref() == Some(id))
            .flat_map(|(_, bucket)| bucket)
            .collect()
    }

    /// Merge every identity bucket into one element per entity.
    ///
    /// Merged non-singleton elements carry the `Comparable` tag: identity
    /// is resolved and the element is ready for comparison.
    pub fn merged(&self, declared_default: Option<&str>) -> Result<Vec<ConfigElement>> {
        self.group_by_id(declared_default)
            .into_iter()
            .map(|(_, bucket)| {
                let mut element = merge_fragments(&bucket)?;
                if element.kind != ElementKind::Singleton {
                    element.kind = ElementKind::Comparable;
                }
                Ok(element)
            })
            .collect()
    }
}
