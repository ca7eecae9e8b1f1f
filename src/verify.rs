//! Liveness verification.
//!
//! The verifier only ever writes status, cached metadata and the verification timestamp.
//! Scans are incremental: every reference is committed as soon as it has been probed, so a
//! cancelled scan leaves visited references fresh and the rest untouched.

use chrono::Utc;
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use crate::catalog::{Catalog, ProjectId, ReferenceId, Status};
use crate::error::Result;
use crate::paths::{self, FileMetadata, Probe};

/// Cooperative cancellation flag shared with a running scan.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn same_as(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub checked: usize,
    pub present: usize,
    pub missing: usize,
    pub denied: usize,
    /// Removed from the catalog while the scan was running.
    pub vanished: usize,
    /// Relocated while the scan was running; the old path's result was discarded.
    pub relocated: usize,
    /// Never probed because the scan was cancelled.
    pub skipped: usize,
    pub cancelled: bool,
}

pub(crate) fn outcome(probe: Probe) -> (Status, Option<FileMetadata>) {
    match probe {
        Probe::Present(meta) => (Status::Present, Some(meta)),
        Probe::Missing => (Status::Missing, None),
        Probe::PermissionDenied => (Status::PermissionDenied, None),
    }
}

/// Record a probe of `probed` on reference `id`, unless the reference has since moved to
/// another path. Returns whether the status was written.
pub(crate) fn commit(
    catalog: &mut Catalog,
    id: ReferenceId,
    probed: &Path,
    status: Status,
    metadata: Option<FileMetadata>,
) -> Result<bool> {
    if catalog.get(id)?.path.as_path() != probed {
        return Ok(false);
    }
    catalog.set_status(id, status, metadata, Utc::now())?;
    Ok(true)
}

/// Probe one reference and record the result.
pub fn verify(catalog: &mut Catalog, id: ReferenceId) -> Result<Status> {
    let path = catalog.get(id)?.path.as_path().to_path_buf();
    let (status, metadata) = outcome(paths::probe(&path));
    catalog.set_status(id, status, metadata, Utc::now())?;
    Ok(status)
}

/// Verify one project, or the whole catalog, against a shared catalog.
///
/// Probing happens outside the lock; each result is committed under a short write lock.
/// A reference removed between the snapshot and its commit is counted as vanished, one
/// relocated in that window as relocated; neither gets the stale result.
pub fn verify_all(
    catalog: &RwLock<Catalog>,
    project: Option<ProjectId>,
    cancel: &CancelToken,
) -> Result<VerifyReport> {
    let started = Instant::now();
    let targets: Vec<(ReferenceId, PathBuf)> = {
        let guard = catalog.read().unwrap_or_else(PoisonError::into_inner);
        let references = match project {
            Some(id) => guard.list_by_project(id)?,
            None => guard.all_references().collect(),
        };
        let targets = references
            .into_iter()
            .map(|r| (r.id, r.path.as_path().to_path_buf()))
            .collect();
        targets
    };

    let present = AtomicUsize::new(0);
    let missing = AtomicUsize::new(0);
    let denied = AtomicUsize::new(0);
    let vanished = AtomicUsize::new(0);
    let relocated = AtomicUsize::new(0);
    let skipped = AtomicUsize::new(0);

    targets.par_iter().for_each(|(id, path)| {
        if cancel.is_cancelled() {
            skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let (status, metadata) = outcome(paths::probe(path));
        let mut guard = catalog.write().unwrap_or_else(PoisonError::into_inner);
        match commit(&mut guard, *id, path, status, metadata) {
            Ok(true) => {
                let counter = match status {
                    Status::Present => &present,
                    Status::PermissionDenied => &denied,
                    _ => &missing,
                };
                counter.fetch_add(1, Ordering::Relaxed);
            }
            Ok(false) => {
                log::debug!("[verify] Reference {} moved mid-scan, dropping result for {:?}", id, path);
                relocated.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                log::debug!("[verify] Reference {} went away mid-scan: {}", id, e);
                vanished.fetch_add(1, Ordering::Relaxed);
            }
        }
    });

    let skipped = skipped.into_inner();
    let report = VerifyReport {
        checked: targets.len() - skipped,
        present: present.into_inner(),
        missing: missing.into_inner(),
        denied: denied.into_inner(),
        vanished: vanished.into_inner(),
        relocated: relocated.into_inner(),
        skipped,
        cancelled: cancel.is_cancelled(),
    };

    log::info!(
        "[verify] {} checked ({} present, {} missing, {} denied, {} vanished, {} relocated, {} skipped) in {:?}{}",
        report.checked,
        report.present,
        report.missing,
        report.denied,
        report.vanished,
        report.relocated,
        report.skipped,
        started.elapsed(),
        if report.cancelled { " - cancelled" } else { "" }
    );
    Ok(report)
}
