//! Hand-off to the platform's default handlers. Nothing here renders or modifies files.

use std::path::Path;

use crate::catalog::FileReference;
use crate::error::{ExplorerError, Result};
use crate::paths;

/// Open the referenced file with its default application.
pub fn open(reference: &FileReference) -> Result<()> {
    let path = available_path(reference)?;
    log::info!("[launch] Opening {:?}", path);
    opener::open(path).map_err(|e| ExplorerError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
}

/// Open the directory that contains the referenced file.
pub fn reveal(reference: &FileReference) -> Result<()> {
    let target = available_path(reference)?;
    let dir = if target.is_dir() {
        target
    } else {
        target.parent().unwrap_or(target)
    };
    log::info!("[launch] Revealing {:?}", dir);
    opener::open(dir).map_err(|e| ExplorerError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
}

/// Existence is re-checked at launch time; the cached status may be old.
fn available_path(reference: &FileReference) -> Result<&Path> {
    let path = reference.path.as_path();
    if !paths::exists(path) {
        return Err(ExplorerError::Unavailable(path.to_path_buf()));
    }
    Ok(path)
}
