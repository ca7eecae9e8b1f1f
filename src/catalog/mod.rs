pub mod index;
mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use crate::error::{ExplorerError, Result};
use crate::paths::{FileMetadata, NormalizedPath};
use crate::tags::{Tag, TagId, TagRegistry};

pub use index::TagIndex;
pub use store::AddReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceId(pub u64);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Liveness of a reference target as last seen by the verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Unknown,
    Present,
    Missing,
    PermissionDenied,
}

impl Status {
    /// Only a present target can be opened or edited.
    pub fn is_available(&self) -> bool {
        matches!(self, Status::Present)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Unknown => "unknown",
            Status::Present => "present",
            Status::Missing => "missing",
            Status::PermissionDenied => "permission_denied",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    /// Display order.
    pub references: Vec<ReferenceId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileReference {
    pub id: ReferenceId,
    pub project: ProjectId,
    pub path: NormalizedPath,
    pub display_name: String,
    pub tags: BTreeSet<TagId>,
    pub status: Status,
    pub last_verified: Option<DateTime<Utc>>,
    pub metadata: Option<FileMetadata>,
}

/// The in-memory catalog: projects, references, the tag registry and the inverted
/// tag index.
///
/// Every mutating method validates first and only then touches state, so a rejected call
/// leaves the catalog exactly as it was. Callers sharing a catalog serialize mutations
/// through [`crate::session::Explorer`].
#[derive(Debug, Clone)]
pub struct Catalog {
    tags: TagRegistry,
    projects: Vec<Project>,
    references: HashMap<ReferenceId, FileReference>,
    /// Per-project dedupe table: folded path key -> reference.
    path_keys: HashMap<ProjectId, HashMap<String, ReferenceId>>,
    index: TagIndex,
    next_project_id: u64,
    next_reference_id: u64,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            tags: TagRegistry::new(),
            projects: Vec::new(),
            references: HashMap::new(),
            path_keys: HashMap::new(),
            index: TagIndex::default(),
            next_project_id: 1,
            next_reference_id: 1,
        }
    }

    /// Assemble a catalog from persisted parts, rejecting anything that breaks an invariant.
    pub(crate) fn from_parts(
        tags: Vec<Tag>,
        projects: Vec<Project>,
        references: Vec<FileReference>,
    ) -> Result<Self> {
        let corrupt = |msg: String| ExplorerError::CorruptStore(msg);

        let mut catalog = Self::new();
        catalog.tags = TagRegistry::from_tags(tags)?;

        let mut by_id: HashMap<ReferenceId, FileReference> = HashMap::new();
        for reference in references {
            if by_id.contains_key(&reference.id) {
                return Err(corrupt(format!("duplicate reference id {}", reference.id)));
            }
            if let Some(tag) = reference.tags.iter().find(|t| !catalog.tags.contains(**t)) {
                return Err(corrupt(format!(
                    "reference {} carries undefined tag {}",
                    reference.id, tag
                )));
            }
            by_id.insert(reference.id, reference);
        }

        let mut seen_projects = HashSet::new();
        for project in projects {
            if !seen_projects.insert(project.id) {
                return Err(corrupt(format!("duplicate project id {}", project.id)));
            }
            if validate_name(&project.name).is_err() {
                return Err(corrupt(format!("project {} has an empty name", project.id)));
            }
            let keys = catalog.path_keys.entry(project.id).or_default();
            for ref_id in &project.references {
                let mut reference = by_id.remove(ref_id).ok_or_else(|| {
                    if catalog.references.contains_key(ref_id) {
                        corrupt(format!("reference {} is listed more than once", ref_id))
                    } else {
                        corrupt(format!("project {} lists undefined reference {}", project.id, ref_id))
                    }
                })?;
                if keys.insert(reference.path.key().to_string(), *ref_id).is_some() {
                    return Err(corrupt(format!(
                        "project {} references {} more than once",
                        project.id, reference.path
                    )));
                }
                reference.project = project.id;
                catalog.references.insert(*ref_id, reference);
            }
            catalog.next_project_id = catalog.next_project_id.max(project.id.0 + 1);
            catalog.projects.push(project);
        }

        if let Some(orphan) = by_id.keys().min() {
            return Err(corrupt(format!("reference {} belongs to no project", orphan)));
        }

        catalog.next_reference_id = catalog
            .references
            .keys()
            .map(|id| id.0 + 1)
            .max()
            .unwrap_or(1);
        catalog.index = TagIndex::rebuild(catalog.references.values());
        Ok(catalog)
    }

    // ========================================================================
    // Projects
    // ========================================================================

    pub fn create_project(&mut self, name: &str) -> Result<ProjectId> {
        let name = validate_name(name)?;
        let id = ProjectId(self.next_project_id);
        self.next_project_id += 1;
        self.projects.push(Project {
            id,
            name,
            references: Vec::new(),
        });
        self.path_keys.insert(id, HashMap::new());
        Ok(id)
    }

    /// Removes every reference of the project (and their index entries), then the project.
    /// Files on disk are never touched; tag definitions survive.
    pub fn delete_project(&mut self, id: ProjectId) -> Result<Project> {
        let ref_ids = self.project(id)?.references.clone();
        for ref_id in ref_ids {
            self.remove(ref_id)?;
        }
        let pos = self.project_position(id)?;
        self.path_keys.remove(&id);
        Ok(self.projects.remove(pos))
    }

    pub fn rename_project(&mut self, id: ProjectId, name: &str) -> Result<()> {
        let name = validate_name(name)?;
        let pos = self.project_position(id)?;
        self.projects[pos].name = name;
        Ok(())
    }

    /// Replace the display order. `order` must be exactly a permutation of the current
    /// reference ids.
    pub fn reorder(&mut self, id: ProjectId, order: &[ReferenceId]) -> Result<()> {
        let pos = self.project_position(id)?;
        let current = &self.projects[pos].references;

        if order.len() != current.len() {
            return Err(ExplorerError::InvalidOrder(format!(
                "expected {} references, got {}",
                current.len(),
                order.len()
            )));
        }
        let wanted: HashSet<ReferenceId> = current.iter().copied().collect();
        let mut seen = HashSet::with_capacity(order.len());
        for ref_id in order {
            if !wanted.contains(ref_id) {
                return Err(ExplorerError::InvalidOrder(format!(
                    "reference {} is not in project {}",
                    ref_id, id
                )));
            }
            if !seen.insert(*ref_id) {
                return Err(ExplorerError::InvalidOrder(format!(
                    "reference {} appears twice",
                    ref_id
                )));
            }
        }

        self.projects[pos].references = order.to_vec();
        Ok(())
    }

    pub fn list_projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn project(&self, id: ProjectId) -> Result<&Project> {
        self.projects
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| ExplorerError::NotFound(format!("project {}", id)))
    }

    fn project_position(&self, id: ProjectId) -> Result<usize> {
        self.projects
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| ExplorerError::NotFound(format!("project {}", id)))
    }

    // ========================================================================
    // Tags
    // ========================================================================

    pub fn create_tag(&mut self, name: &str, color: Option<String>) -> Result<TagId> {
        self.tags.create(name, color)
    }

    pub fn rename_tag(&mut self, id: TagId, name: &str) -> Result<()> {
        self.tags.rename(id, name)
    }

    pub fn set_tag_color(&mut self, id: TagId, color: Option<String>) -> Result<()> {
        self.tags.set_color(id, color)
    }

    /// Deletes the definition and strips it from every reference carrying it. Deleting an
    /// unknown tag is a no-op that returns false.
    pub fn delete_tag(&mut self, id: TagId) -> Result<bool> {
        if !self.tags.delete(id) {
            return Ok(false);
        }
        for ref_id in self.index.drop_tag(id) {
            if let Some(reference) = self.references.get_mut(&ref_id) {
                reference.tags.remove(&id);
            }
        }
        Ok(true)
    }

    pub fn tags(&self) -> &TagRegistry {
        &self.tags
    }

    pub fn list_tags(&self) -> &[Tag] {
        self.tags.list()
    }

    pub fn index(&self) -> &TagIndex {
        &self.index
    }

    /// True when the incremental index matches a full rebuild.
    pub fn index_is_consistent(&self) -> bool {
        self.index == TagIndex::rebuild(self.references.values())
    }

    pub fn reference_count(&self) -> usize {
        self.references.len()
    }

    /// References in project order, then display order.
    pub fn all_references(&self) -> impl Iterator<Item = &FileReference> {
        self.projects
            .iter()
            .flat_map(|p| p.references.iter())
            .filter_map(|id| self.references.get(id))
    }
}

pub(crate) fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ExplorerError::InvalidName(name.to_string()));
    }
    Ok(trimmed.to_string())
}
