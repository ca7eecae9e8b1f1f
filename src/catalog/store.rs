//! Reference operations: add / remove / tag / status / relocate.
//!
//! Each operation keeps three structures in step: the reference map, the per-project
//! path-key table (dedupe) and the inverted tag index. Validation happens before the
//! first write so a failed call never leaves them out of sync.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use super::{Catalog, FileReference, ProjectId, ReferenceId, Status};
use crate::error::{ExplorerError, Result};
use crate::paths::{self, FileMetadata};
use crate::tags::TagId;

/// Outcome of a bulk add: partial success is the normal case.
#[derive(Debug, Default)]
pub struct AddReport {
    pub added: Vec<ReferenceId>,
    pub rejected: Vec<(PathBuf, ExplorerError)>,
}

impl Catalog {
    /// Add a reference to `path` at the end of the project's display order.
    pub fn add(
        &mut self,
        project: ProjectId,
        path: &Path,
        display_name: Option<&str>,
    ) -> Result<ReferenceId> {
        let pos = self.project_position(project)?;
        let normalized = paths::normalize(path)?;

        let keys = self.path_keys.entry(project).or_default();
        if keys.contains_key(normalized.key()) {
            return Err(ExplorerError::DuplicateReference {
                project: project.0,
                path: normalized.into_path_buf(),
            });
        }

        let id = ReferenceId(self.next_reference_id);
        self.next_reference_id += 1;
        keys.insert(normalized.key().to_string(), id);

        let display_name = display_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| normalized.file_name());

        self.references.insert(
            id,
            FileReference {
                id,
                project,
                path: normalized,
                display_name,
                tags: BTreeSet::new(),
                status: Status::Unknown,
                last_verified: None,
                metadata: None,
            },
        );
        self.projects[pos].references.push(id);
        Ok(id)
    }

    /// Add each path independently, collecting per-path rejections.
    pub fn add_many<P: AsRef<Path>>(&mut self, project: ProjectId, sources: &[P]) -> Result<AddReport> {
        self.project(project)?;
        let mut report = AddReport::default();
        for source in sources {
            let source = source.as_ref();
            match self.add(project, source, None) {
                Ok(id) => report.added.push(id),
                Err(e) if e.is_validation() => report.rejected.push((source.to_path_buf(), e)),
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    /// Expand a dropped folder into its files and add them.
    pub fn add_directory(&mut self, project: ProjectId, dir: &Path, recursive: bool) -> Result<AddReport> {
        self.project(project)?;
        let files = paths::expand_directory(dir, recursive)?;
        self.add_many(project, &files)
    }

    /// Remove a reference from its project and from every index bucket.
    pub fn remove(&mut self, id: ReferenceId) -> Result<FileReference> {
        let reference = self
            .references
            .remove(&id)
            .ok_or_else(|| not_found(id))?;

        self.index.purge(id, reference.tags.iter());
        if let Some(keys) = self.path_keys.get_mut(&reference.project) {
            keys.remove(reference.path.key());
        }
        if let Some(project) = self.projects.iter_mut().find(|p| p.id == reference.project) {
            project.references.retain(|r| *r != id);
        }
        Ok(reference)
    }

    /// Returns false when the reference already carried the tag.
    pub fn tag(&mut self, id: ReferenceId, tag: TagId) -> Result<bool> {
        if !self.tags.contains(tag) {
            return Err(ExplorerError::NotFound(format!("tag {}", tag)));
        }
        let reference = self.references.get_mut(&id).ok_or_else(|| not_found(id))?;
        let added = reference.tags.insert(tag);
        if added {
            self.index.insert(tag, id);
        }
        Ok(added)
    }

    /// Returns false when the reference did not carry the tag.
    pub fn untag(&mut self, id: ReferenceId, tag: TagId) -> Result<bool> {
        if !self.tags.contains(tag) {
            return Err(ExplorerError::NotFound(format!("tag {}", tag)));
        }
        let reference = self.references.get_mut(&id).ok_or_else(|| not_found(id))?;
        let removed = reference.tags.remove(&tag);
        if removed {
            self.index.remove(tag, id);
        }
        Ok(removed)
    }

    /// Replace the whole tag set of a reference.
    pub fn set_tags(&mut self, id: ReferenceId, tags: &[TagId]) -> Result<()> {
        if let Some(unknown) = tags.iter().find(|t| !self.tags.contains(**t)) {
            return Err(ExplorerError::NotFound(format!("tag {}", unknown)));
        }
        let reference = self.references.get_mut(&id).ok_or_else(|| not_found(id))?;

        let new_tags: BTreeSet<TagId> = tags.iter().copied().collect();
        for old in reference.tags.difference(&new_tags) {
            self.index.remove(*old, id);
        }
        for new in new_tags.difference(&reference.tags) {
            self.index.insert(*new, id);
        }
        reference.tags = new_tags;
        Ok(())
    }

    /// Comma-separated tag editing. Unknown names become new tags; the whole call is
    /// rejected before any tag is created if one name is invalid.
    pub fn set_tags_from_text(&mut self, id: ReferenceId, text: &str) -> Result<Vec<TagId>> {
        if !self.references.contains_key(&id) {
            return Err(not_found(id));
        }

        let names: Vec<&str> = text
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .collect();

        let mut ids = Vec::with_capacity(names.len());
        let mut to_create = Vec::new();
        for name in &names {
            match self.tags.find_by_name(name) {
                Some(tag) => ids.push(Some(tag.id)),
                None => {
                    let folded = crate::tags::normalize_tag_name(name);
                    if !to_create.iter().any(|n: &&str| crate::tags::normalize_tag_name(n) == folded) {
                        to_create.push(*name);
                    }
                    ids.push(None);
                }
            }
        }

        for name in to_create {
            self.tags.create(name, None)?;
        }
        let resolved: Vec<TagId> = names
            .iter()
            .zip(ids)
            .filter_map(|(name, id)| id.or_else(|| self.tags.find_by_name(name).map(|t| t.id)))
            .collect();

        self.set_tags(id, &resolved)?;
        Ok(resolved)
    }

    /// Record a verification outcome. `metadata: None` keeps what was cached before, so a
    /// missing file still shows its last known size.
    pub fn set_status(
        &mut self,
        id: ReferenceId,
        status: Status,
        metadata: Option<FileMetadata>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let reference = self.references.get_mut(&id).ok_or_else(|| not_found(id))?;
        reference.status = status;
        if metadata.is_some() {
            reference.metadata = metadata;
        }
        reference.last_verified = Some(at);
        Ok(())
    }

    /// Point a reference at a new physical path. Tags, id and position survive; liveness
    /// goes back to unknown until the next verification.
    pub fn relocate(&mut self, id: ReferenceId, new_path: &Path) -> Result<()> {
        let normalized = paths::normalize(new_path)?;
        let reference = self.references.get(&id).ok_or_else(|| not_found(id))?;
        let project = reference.project;

        let keys = self.path_keys.entry(project).or_default();
        if let Some(existing) = keys.get(normalized.key()) {
            if *existing != id {
                return Err(ExplorerError::DuplicateReference {
                    project: project.0,
                    path: normalized.into_path_buf(),
                });
            }
        }

        let reference = self.references.get_mut(&id).ok_or_else(|| not_found(id))?;
        keys.remove(reference.path.key());
        keys.insert(normalized.key().to_string(), id);

        if reference.display_name == reference.path.file_name() {
            reference.display_name = normalized.file_name();
        }
        reference.path = normalized;
        reference.status = Status::Unknown;
        reference.metadata = None;
        reference.last_verified = None;
        Ok(())
    }

    /// An empty name restores the file-name default.
    pub fn rename_reference(&mut self, id: ReferenceId, display_name: &str) -> Result<()> {
        let reference = self.references.get_mut(&id).ok_or_else(|| not_found(id))?;
        let trimmed = display_name.trim();
        reference.display_name = if trimmed.is_empty() {
            reference.path.file_name()
        } else {
            trimmed.to_string()
        };
        Ok(())
    }

    pub fn get(&self, id: ReferenceId) -> Result<&FileReference> {
        self.references.get(&id).ok_or_else(|| not_found(id))
    }

    pub fn contains_reference(&self, id: ReferenceId) -> bool {
        self.references.contains_key(&id)
    }

    /// References of one project in display order.
    pub fn list_by_project(&self, project: ProjectId) -> Result<Vec<&FileReference>> {
        let project = self.project(project)?;
        Ok(project
            .references
            .iter()
            .filter_map(|id| self.references.get(id))
            .collect())
    }
}

fn not_found(id: ReferenceId) -> ExplorerError {
    ExplorerError::NotFound(format!("reference {}", id))
}
