//! Read-only filtering over a catalog snapshot.
//!
//! Results always come back in display order: project order first, then the order inside
//! each project. Nothing here mutates the catalog.

use std::collections::BTreeSet;

use crate::catalog::{Catalog, FileReference, ProjectId, ReferenceId};
use crate::error::Result;
use crate::tags::TagId;

#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub project: Option<ProjectId>,
    /// Case-insensitive substring of the display name.
    pub name: Option<String>,
    pub tags: BTreeSet<TagId>,
    /// Intersection of the tag buckets when true, union when false.
    pub match_all: bool,
}

impl SearchQuery {
    pub fn in_project(project: ProjectId) -> Self {
        Self {
            project: Some(project),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = TagId>, match_all: bool) -> Self {
        self.tags = tags.into_iter().collect();
        self.match_all = match_all;
        self
    }
}

pub fn search<'a>(catalog: &'a Catalog, query: &SearchQuery) -> Result<Vec<&'a FileReference>> {
    let allowed = tag_filter(catalog, &query.tags, query.match_all);
    let needle = query
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_lowercase);

    let results = scope(catalog, query.project)?
        .into_iter()
        .filter(|r| allowed.as_ref().map_or(true, |set| set.contains(&r.id)))
        .filter(|r| {
            needle
                .as_ref()
                .map_or(true, |n| r.display_name.to_lowercase().contains(n.as_str()))
        })
        .collect();
    Ok(results)
}

/// Free-text filter over display name and tag names together.
pub fn quick_search<'a>(
    catalog: &'a Catalog,
    project: Option<ProjectId>,
    text: &str,
) -> Result<Vec<&'a FileReference>> {
    let needle = text.trim().to_lowercase();
    let references = scope(catalog, project)?;
    if needle.is_empty() {
        return Ok(references);
    }

    Ok(references
        .into_iter()
        .filter(|r| {
            let mut haystack = r.display_name.to_lowercase();
            for tag in r.tags.iter().filter_map(|t| catalog.tags().get(*t)) {
                haystack.push(' ');
                haystack.push_str(&tag.name.to_lowercase());
            }
            haystack.contains(&needle)
        })
        .collect())
}

fn scope(catalog: &Catalog, project: Option<ProjectId>) -> Result<Vec<&FileReference>> {
    match project {
        Some(id) => catalog.list_by_project(id),
        None => Ok(catalog.all_references().collect()),
    }
}

/// `None` means the tag dimension imposes no restriction.
fn tag_filter(catalog: &Catalog, tags: &BTreeSet<TagId>, match_all: bool) -> Option<BTreeSet<ReferenceId>> {
    if tags.is_empty() {
        return None;
    }

    let index = catalog.index();
    let mut buckets = tags.iter().map(|t| index.bucket(*t).cloned().unwrap_or_default());

    let combined = if match_all {
        let first = buckets.next().unwrap_or_default();
        buckets.fold(first, |acc, bucket| acc.intersection(&bucket).copied().collect())
    } else {
        buckets.fold(BTreeSet::new(), |mut acc, bucket| {
            acc.extend(bucket);
            acc
        })
    };
    Some(combined)
}
