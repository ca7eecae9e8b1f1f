//! Global tag namespace.
//!
//! Tags are project-agnostic. A tag stays defined while nothing carries it; removing its
//! associations is the catalog's job (see `Catalog::delete_tag`).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ExplorerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(pub u64);

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Case-normalized form used for uniqueness and lookup.
pub fn normalize_tag_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Clone)]
pub struct TagRegistry {
    /// Creation order is the listing order.
    tags: Vec<Tag>,
    next_id: u64,
}

impl Default for TagRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TagRegistry {
    pub fn new() -> Self {
        Self {
            tags: Vec::new(),
            next_id: 1,
        }
    }

    /// Rebuild from persisted tags, keeping their ids.
    pub(crate) fn from_tags(tags: Vec<Tag>) -> Result<Self> {
        let mut registry = Self::new();
        for tag in tags {
            let name = Self::validate(&tag.name).map_err(|_| {
                ExplorerError::CorruptStore(format!("tag {} has an invalid name {:?}", tag.id, tag.name))
            })?;
            if registry.get(tag.id).is_some() {
                return Err(ExplorerError::CorruptStore(format!("duplicate tag id {}", tag.id)));
            }
            if registry.find_by_name(&name).is_some() {
                return Err(ExplorerError::CorruptStore(format!("duplicate tag name {:?}", name)));
            }
            registry.next_id = registry.next_id.max(tag.id.0 + 1);
            registry.tags.push(tag);
        }
        Ok(registry)
    }

    pub fn create(&mut self, name: &str, color: Option<String>) -> Result<TagId> {
        let name = Self::validate(name)?;
        if self.find_by_name(&name).is_some() {
            return Err(ExplorerError::DuplicateTag(name));
        }

        let id = TagId(self.next_id);
        self.next_id += 1;
        self.tags.push(Tag { id, name, color });
        Ok(id)
    }

    /// Associations reference the id, so they are unaffected.
    pub fn rename(&mut self, id: TagId, new_name: &str) -> Result<()> {
        let new_name = Self::validate(new_name)?;
        if let Some(existing) = self.find_by_name(&new_name) {
            if existing.id != id {
                return Err(ExplorerError::DuplicateTag(new_name));
            }
        }
        let tag = self
            .tags
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| ExplorerError::NotFound(format!("tag {}", id)))?;
        tag.name = new_name;
        Ok(())
    }

    pub fn set_color(&mut self, id: TagId, color: Option<String>) -> Result<()> {
        let tag = self
            .tags
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| ExplorerError::NotFound(format!("tag {}", id)))?;
        tag.color = color;
        Ok(())
    }

    /// Removes the definition. Returns whether anything was removed.
    pub fn delete(&mut self, id: TagId) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t.id != id);
        self.tags.len() != before
    }

    pub fn get(&self, id: TagId) -> Option<&Tag> {
        self.tags.iter().find(|t| t.id == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Tag> {
        let wanted = normalize_tag_name(name);
        self.tags.iter().find(|t| normalize_tag_name(&t.name) == wanted)
    }

    pub fn list(&self) -> &[Tag] {
        &self.tags
    }

    pub fn contains(&self, id: TagId) -> bool {
        self.get(id).is_some()
    }

    fn validate(name: &str) -> Result<String> {
        let trimmed = name.trim();
        if trimmed.is_empty() || trimmed.contains(',') {
            return Err(ExplorerError::InvalidName(name.to_string()));
        }
        Ok(trimmed.to_string())
    }
}
