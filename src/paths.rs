//! Path resolution for file references.
//!
//! Every path that enters the catalog goes through [`normalize`], which turns it into an
//! absolute form plus a comparison key. The key applies the platform case-folding rule:
//! Windows and macOS volumes are case-insensitive by default, so two spellings of the same
//! file must collapse to one key there, while Linux keeps paths byte-exact.
//!
//! The display form is never folded; it is what gets persisted and shown.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{ExplorerError, Result};

/// An absolute path together with its case-folded comparison key.
#[derive(Debug, Clone)]
pub struct NormalizedPath {
    path: PathBuf,
    key: String,
}

impl NormalizedPath {
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.path
    }

    /// Last path component, used as the default display name.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.to_string_lossy().to_string())
    }
}

impl PartialEq for NormalizedPath {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for NormalizedPath {}

impl Hash for NormalizedPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Resolve `path` to its normalized absolute form.
///
/// Existing paths are canonicalized so symlinked spellings dedupe against their target.
/// Paths that do not exist (yet) are made absolute against the working directory and
/// cleaned lexically.
pub fn normalize(path: &Path) -> Result<NormalizedPath> {
    if path.as_os_str().is_empty() {
        return Err(ExplorerError::path_invalid(path, "empty path"));
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        let cwd = std::env::current_dir().map_err(|e| {
            ExplorerError::path_invalid(path, format!("cannot read working directory: {}", e))
        })?;
        cwd.join(path)
    };

    let resolved = match fs::canonicalize(&absolute) {
        Ok(canonical) => strip_verbatim_prefix(canonical),
        Err(_) => clean_lexically(&absolute)
            .ok_or_else(|| ExplorerError::path_invalid(path, "escapes the filesystem root"))?,
    };

    Ok(from_absolute(resolved))
}

/// Rebuild a normalized path from its persisted display form without touching the disk.
/// Dot segments and trailing separators are cleaned so the key matches what
/// [`normalize`] would have produced.
pub(crate) fn from_stored(path: &Path) -> Result<NormalizedPath> {
    if !path.is_absolute() {
        return Err(ExplorerError::path_invalid(path, "stored path is not absolute"));
    }
    let cleaned = clean_lexically(path)
        .ok_or_else(|| ExplorerError::path_invalid(path, "escapes the filesystem root"))?;
    Ok(from_absolute(cleaned))
}

fn from_absolute(path: PathBuf) -> NormalizedPath {
    let key = fold_case(&path.to_string_lossy());
    NormalizedPath { path, key }
}

/// True when both paths resolve to the same comparison key.
pub fn equals(a: &Path, b: &Path) -> bool {
    match (normalize(a), normalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

pub fn exists(path: &Path) -> bool {
    path.exists()
}

/// Regular files under `dir`, hidden entries skipped, sorted by path.
pub fn expand_directory(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ExplorerError::path_invalid(dir, "not a directory"));
    }

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .sort_by_file_name();

    let mut files = Vec::new();
    for entry in walker
        .into_iter()
        .filter_entry(|e| !e.file_name().to_string_lossy().starts_with('.'))
    {
        match entry {
            Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
            Ok(_) => {}
            Err(e) => log::warn!("[paths] Skipping unreadable entry under {:?}: {}", dir, e),
        }
    }
    Ok(files)
}

fn clean_lexically(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                _ => return None,
            },
            Component::Normal(part) => out.push(part),
        }
    }
    Some(out)
}

#[cfg(windows)]
fn strip_verbatim_prefix(path: PathBuf) -> PathBuf {
    let stripped = path
        .to_str()
        .and_then(|raw| raw.strip_prefix(r"\\?\"))
        .filter(|rest| !rest.starts_with("UNC"))
        .map(PathBuf::from);
    stripped.unwrap_or(path)
}

#[cfg(not(windows))]
fn strip_verbatim_prefix(path: PathBuf) -> PathBuf {
    path
}

#[cfg(windows)]
fn fold_case(raw: &str) -> String {
    raw.replace('/', "\\").to_lowercase()
}

#[cfg(target_os = "macos")]
fn fold_case(raw: &str) -> String {
    raw.to_lowercase()
}

#[cfg(not(any(windows, target_os = "macos")))]
fn fold_case(raw: &str) -> String {
    raw.to_string()
}

// ============================================================================
// Probing
// ============================================================================

/// Closed set of file kinds the explorer distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Text,
    Document,
    Image,
    Other,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "txt" | "md" => FileKind::Text,
            "pdf" | "docx" | "odt" | "odf" | "html" | "htm" => FileKind::Document,
            "jpg" | "jpeg" | "png" | "gif" => FileKind::Image,
            _ => FileKind::Other,
        }
    }
}

/// Metadata captured when a reference is verified present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub kind: FileKind,
}

/// What the filesystem says about a path right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Present(FileMetadata),
    Missing,
    PermissionDenied,
}

/// Stat `path` and, for regular files, confirm it can be opened for reading.
pub fn probe(path: &Path) -> Probe {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::PermissionDenied => return Probe::PermissionDenied,
        Err(e) => {
            if e.kind() != ErrorKind::NotFound {
                log::debug!("[paths] Treating {:?} as missing: {}", path, e);
            }
            return Probe::Missing;
        }
    };

    if metadata.is_file() {
        if let Err(e) = fs::File::open(path) {
            if e.kind() == ErrorKind::PermissionDenied {
                return Probe::PermissionDenied;
            }
        }
    }

    Probe::Present(FileMetadata {
        size: metadata.len(),
        modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        kind: FileKind::from_path(path),
    })
}
