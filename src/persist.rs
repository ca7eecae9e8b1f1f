//! On-disk catalog format.
//!
//! One JSON document per store:
//!
//! ```json
//! {
//!   "version": 1,
//!   "tags": [{ "id": 1, "name": "urgent", "color": "#d33" }],
//!   "projects": [{ "id": 1, "name": "Research", "references": [1, 2] }],
//!   "references": {
//!     "1": { "path": "/docs/paper.txt", "displayName": "paper.txt", "tagIds": [1],
//!            "status": "present", "lastVerified": "2024-05-01T10:00:00Z",
//!            "metadata": { "size": 1024, "modified": null, "kind": "text" } }
//!   }
//! }
//! ```
//!
//! Loading never repairs: any violated invariant fails the load with `CorruptStore`, so a
//! damaged store is never silently replaced by an empty catalog on the next save.

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::catalog::{Catalog, FileReference, Project, ProjectId, ReferenceId, Status};
use crate::error::{ExplorerError, Result};
use crate::paths::{self, FileMetadata};
use crate::tags::{Tag, TagId};

/// Bump when the document layout changes incompatibly.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub projects: Vec<ProjectRecord>,
    #[serde(default, deserialize_with = "unique_references")]
    pub references: BTreeMap<ReferenceId, ReferenceRecord>,
}

fn default_version() -> u32 {
    FORMAT_VERSION
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: ProjectId,
    pub name: String,
    #[serde(default)]
    pub references: Vec<ReferenceId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceRecord {
    pub path: PathBuf,
    pub display_name: String,
    #[serde(default)]
    pub tag_ids: Vec<TagId>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub last_verified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<FileMetadata>,
}

/// JSON objects silently keep the last duplicate key; a store with a repeated reference id
/// must be rejected instead.
fn unique_references<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<ReferenceId, ReferenceRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    struct UniqueVisitor;

    impl<'de> Visitor<'de> for UniqueVisitor {
        type Value = BTreeMap<ReferenceId, ReferenceRecord>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of reference id to reference")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
            let mut out = BTreeMap::new();
            while let Some((id, record)) = map.next_entry::<ReferenceId, ReferenceRecord>()? {
                if out.insert(id, record).is_some() {
                    return Err(serde::de::Error::custom(format!("duplicate reference id {}", id)));
                }
            }
            Ok(out)
        }
    }

    deserializer.deserialize_map(UniqueVisitor)
}

// ============================================================================
// Catalog <-> document
// ============================================================================

pub fn to_document(catalog: &Catalog) -> StoreDocument {
    let projects = catalog
        .list_projects()
        .iter()
        .map(|p| ProjectRecord {
            id: p.id,
            name: p.name.clone(),
            references: p.references.clone(),
        })
        .collect();

    let references = catalog
        .all_references()
        .map(|r| (r.id, record_for(r)))
        .collect();

    StoreDocument {
        version: FORMAT_VERSION,
        app_version: Some(env!("CARGO_PKG_VERSION").to_string()),
        saved_at: Some(Utc::now()),
        tags: catalog.list_tags().to_vec(),
        projects,
        references,
    }
}

fn record_for(reference: &FileReference) -> ReferenceRecord {
    ReferenceRecord {
        path: reference.path.as_path().to_path_buf(),
        display_name: reference.display_name.clone(),
        tag_ids: reference.tags.iter().copied().collect(),
        status: reference.status,
        last_verified: reference.last_verified,
        metadata: reference.metadata.clone(),
    }
}

pub fn from_document(document: StoreDocument) -> Result<Catalog> {
    if document.version > FORMAT_VERSION {
        return Err(ExplorerError::CorruptStore(format!(
            "format version {} is newer than supported version {}",
            document.version, FORMAT_VERSION
        )));
    }

    let mut references = Vec::with_capacity(document.references.len());
    for (id, record) in document.references {
        let path = paths::from_stored(&record.path)
            .map_err(|e| ExplorerError::CorruptStore(format!("reference {}: {}", id, e)))?;
        let tags: BTreeSet<TagId> = record.tag_ids.iter().copied().collect();
        if tags.len() != record.tag_ids.len() {
            return Err(ExplorerError::CorruptStore(format!(
                "reference {} lists a tag twice",
                id
            )));
        }
        references.push(FileReference {
            id,
            // Assigned from the owning project record.
            project: ProjectId(0),
            path,
            display_name: record.display_name,
            tags,
            status: record.status,
            last_verified: record.last_verified,
            metadata: record.metadata,
        });
    }

    let projects = document
        .projects
        .into_iter()
        .map(|p| Project {
            id: p.id,
            name: p.name,
            references: p.references,
        })
        .collect();

    Catalog::from_parts(document.tags, projects, references)
}

// ============================================================================
// Files
// ============================================================================

/// Load the catalog stored at `path`. A store that does not exist yet is an empty catalog;
/// one that exists but cannot be trusted is an error.
pub fn load(path: &Path) -> Result<Catalog> {
    if !path.exists() {
        log::info!("[persist] No store at {:?}, starting with an empty catalog", path);
        return Ok(Catalog::new());
    }

    let started = Instant::now();
    let document = read_document(path)?;
    let catalog = from_document(document).map_err(|e| {
        log::warn!("[persist] Refusing to load {:?}: {}", path, e);
        e
    })?;

    log::info!(
        "[persist] Loaded {} projects, {} references, {} tags from {:?} in {:?}",
        catalog.list_projects().len(),
        catalog.reference_count(),
        catalog.list_tags().len(),
        path,
        started.elapsed()
    );
    Ok(catalog)
}

/// Write the catalog atomically: either the previous store or the new one is on disk
/// afterwards, never a partial file.
pub fn save(path: &Path, catalog: &Catalog) -> Result<()> {
    let started = Instant::now();
    write_document(path, &to_document(catalog))?;
    log::info!(
        "[persist] Saved {} projects, {} references to {:?} in {:?}",
        catalog.list_projects().len(),
        catalog.reference_count(),
        path,
        started.elapsed()
    );
    Ok(())
}

pub fn read_document(path: &Path) -> Result<StoreDocument> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| {
        log::warn!("[persist] Failed to parse {:?}: {}", path, e);
        ExplorerError::CorruptStore(format!("cannot parse {}: {}", path.display(), e))
    })
}

pub fn write_document(path: &Path, document: &StoreDocument) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let content = serde_json::to_vec_pretty(document)?;
    atomic_write_file(path, &content)
}

/// Write to a sibling temp file, fsync, then rename over the target.
pub(crate) fn atomic_write_file(path: &Path, content: &[u8]) -> Result<()> {
    let file_name = path.file_name().unwrap_or_default().to_string_lossy();
    let temp_path = path.with_file_name(format!("{}.tmp", file_name));

    let mut file = fs::File::create(&temp_path)?;
    file.write_all(content)?;
    file.sync_all()?;
    drop(file);

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }
    Ok(())
}

// ============================================================================
// Project exchange
// ============================================================================

/// The store shape restricted to one project and the tags/references it uses.
pub fn export_project(catalog: &Catalog, project: ProjectId) -> Result<StoreDocument> {
    let source = catalog.project(project)?;
    let references = catalog.list_by_project(project)?;

    let used: BTreeSet<TagId> = references.iter().flat_map(|r| r.tags.iter().copied()).collect();
    let tags = catalog
        .list_tags()
        .iter()
        .filter(|t| used.contains(&t.id))
        .cloned()
        .collect();

    Ok(StoreDocument {
        version: FORMAT_VERSION,
        app_version: Some(env!("CARGO_PKG_VERSION").to_string()),
        saved_at: Some(Utc::now()),
        tags,
        projects: vec![ProjectRecord {
            id: source.id,
            name: source.name.clone(),
            references: source.references.clone(),
        }],
        references: references.into_iter().map(|r| (r.id, record_for(r))).collect(),
    })
}

/// Import an exported project as a new project with fresh ids. Tags are matched by name
/// and created when missing. All-or-nothing.
pub fn import_project(catalog: &mut Catalog, document: StoreDocument) -> Result<ProjectId> {
    if document.projects.len() != 1 {
        return Err(ExplorerError::CorruptStore(format!(
            "expected exactly one project, found {}",
            document.projects.len()
        )));
    }
    // Validates the document against the same invariants as a full store.
    let incoming = from_document(document)?;
    let source = &incoming.list_projects()[0];

    let mut staged = catalog.clone();
    let mut tag_map: HashMap<TagId, TagId> = HashMap::new();
    for tag in incoming.list_tags() {
        let target = match staged.tags().find_by_name(&tag.name) {
            Some(existing) => existing.id,
            None => staged.create_tag(&tag.name, tag.color.clone())?,
        };
        tag_map.insert(tag.id, target);
    }

    let project = staged.create_project(&source.name)?;
    for reference in incoming.list_by_project(source.id)? {
        let id = staged.add(project, reference.path.as_path(), Some(&reference.display_name))?;
        let tags: Vec<TagId> = reference.tags.iter().filter_map(|t| tag_map.get(t).copied()).collect();
        staged.set_tags(id, &tags)?;
        if let Some(at) = reference.last_verified {
            staged.set_status(id, reference.status, reference.metadata.clone(), at)?;
        }
    }

    *catalog = staged;
    Ok(project)
}
