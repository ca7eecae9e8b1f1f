use std::collections::{BTreeMap, BTreeSet};

use super::{FileReference, ReferenceId};
use crate::tags::TagId;

/// Tag id -> references carrying it, across all projects.
///
/// Derived data. The reference tag sets are the source of truth and
/// [`TagIndex::rebuild`] must always reproduce the incrementally maintained state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagIndex {
    buckets: BTreeMap<TagId, BTreeSet<ReferenceId>>,
}

impl TagIndex {
    pub fn rebuild<'a>(references: impl IntoIterator<Item = &'a FileReference>) -> Self {
        let mut index = Self::default();
        for reference in references {
            for tag in &reference.tags {
                index.insert(*tag, reference.id);
            }
        }
        index
    }

    pub fn insert(&mut self, tag: TagId, reference: ReferenceId) {
        self.buckets.entry(tag).or_default().insert(reference);
    }

    pub fn remove(&mut self, tag: TagId, reference: ReferenceId) {
        if let Some(bucket) = self.buckets.get_mut(&tag) {
            bucket.remove(&reference);
            if bucket.is_empty() {
                self.buckets.remove(&tag);
            }
        }
    }

    /// Drop `reference` from every bucket named in `tags`.
    pub fn purge<'a>(&mut self, reference: ReferenceId, tags: impl IntoIterator<Item = &'a TagId>) {
        for tag in tags {
            self.remove(*tag, reference);
        }
    }

    /// Drop a whole bucket, returning the references that were in it.
    pub fn drop_tag(&mut self, tag: TagId) -> BTreeSet<ReferenceId> {
        self.buckets.remove(&tag).unwrap_or_default()
    }

    pub fn bucket(&self, tag: TagId) -> Option<&BTreeSet<ReferenceId>> {
        self.buckets.get(&tag)
    }

    pub fn contains(&self, tag: TagId, reference: ReferenceId) -> bool {
        self.buckets
            .get(&tag)
            .map(|b| b.contains(&reference))
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
