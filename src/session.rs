//! Process-wide catalog handle.
//!
//! [`Explorer`] owns the loaded catalog for the lifetime of a session: it is created by
//! [`Explorer::open`] (lock + load) and torn down by [`Explorer::shutdown`] (cancel and
//! drain scans, flush, unlock). Nothing reaches the store after the lock is released. All mutations run under one write lock, so the reference map and the tag
//! index are only ever observed together. Reads take the read lock and hand out owned
//! copies.
//!
//! Verification and saving can run on background threads. Saves are serialized and
//! always write a snapshot at least as new as the previous one.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::catalog::{AddReport, Catalog, FileReference, Project, ProjectId, ReferenceId, Status};
use crate::config::ExplorerConfig;
use crate::error::{ExplorerError, Result};
use crate::paths;
use crate::persist::{self, StoreDocument};
use crate::query::{self, SearchQuery};
use crate::store_lock::StoreLock;
use crate::tags::{Tag, TagId};
use crate::verify::{self, CancelToken, VerifyReport};

struct Inner {
    config: ExplorerConfig,
    catalog: RwLock<Catalog>,
    /// Bumped by every committed mutation.
    generation: AtomicU64,
    saved_generation: AtomicU64,
    save_lock: Mutex<()>,
    store_lock: Mutex<Option<StoreLock>>,
    scans: Mutex<Vec<CancelToken>>,
    /// Signalled whenever a scan leaves `scans`.
    scans_idle: Condvar,
    /// Set once shutdown begins. No new scans or autosaves start after this.
    closed: AtomicBool,
    /// Set under `save_lock` once the final flush is done. Flushes become no-ops.
    released: AtomicBool,
}

/// Removes a background scan from the registry when its thread ends, even by panic.
struct ScanRegistration {
    explorer: Explorer,
    token: CancelToken,
}

impl Drop for ScanRegistration {
    fn drop(&mut self) {
        let mut scans = self.explorer.lock_scans();
        scans.retain(|t| !t.same_as(&self.token));
        self.explorer.inner.scans_idle.notify_all();
    }
}

#[derive(Clone)]
pub struct Explorer {
    inner: Arc<Inner>,
}

/// A verification running on a background thread.
pub struct VerifyHandle {
    cancel: CancelToken,
    handle: JoinHandle<Result<VerifyReport>>,
}

impl VerifyHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn join(self) -> Result<VerifyReport> {
        self.handle
            .join()
            .unwrap_or_else(|_| Err(thread_panicked("verification")))
    }
}

/// A save running on a background thread. Not cancellable: the temp-file-then-rename
/// write either lands completely or not at all.
pub struct SaveHandle {
    handle: JoinHandle<Result<bool>>,
}

impl SaveHandle {
    pub fn join(self) -> Result<bool> {
        self.handle.join().unwrap_or_else(|_| Err(thread_panicked("save")))
    }
}

fn thread_panicked(what: &str) -> ExplorerError {
    ExplorerError::Io(io::Error::new(
        io::ErrorKind::Other,
        format!("{} thread panicked", what),
    ))
}

impl Explorer {
    /// Lock the configured store, load it, and kick off load-time verification if enabled.
    pub fn open(config: ExplorerConfig) -> Result<Self> {
        Self::open_with(config, false)
    }

    /// Like [`Explorer::open`], taking over a lock held by another process when `force`.
    pub fn open_with(config: ExplorerConfig, force: bool) -> Result<Self> {
        let mut lock = StoreLock::acquire(&config.lock_path(), config.lock_stale_secs, force)?;
        lock.start_heartbeat(Duration::from_secs(config.heartbeat_secs.max(1)));

        let catalog = persist::load(&config.store_path)?;
        let verify_on_load = config.verify_on_load;
        let explorer = Self::build(config, catalog, Some(lock));

        if verify_on_load && explorer.read(|c| c.reference_count()) > 0 {
            // Detached: shutdown() cancels it through the scan registry.
            let _ = explorer.spawn_verify_all(None);
        }
        Ok(explorer)
    }

    /// A session over an already-built catalog, without a store lock.
    pub fn from_catalog(config: ExplorerConfig, catalog: Catalog) -> Self {
        Self::build(config, catalog, None)
    }

    fn build(config: ExplorerConfig, catalog: Catalog, lock: Option<StoreLock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                catalog: RwLock::new(catalog),
                generation: AtomicU64::new(0),
                saved_generation: AtomicU64::new(0),
                save_lock: Mutex::new(()),
                store_lock: Mutex::new(lock),
                scans: Mutex::new(Vec::new()),
                scans_idle: Condvar::new(),
                closed: AtomicBool::new(false),
                released: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &ExplorerConfig {
        &self.inner.config
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, Catalog> {
        self.inner.catalog.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, Catalog> {
        self.inner.catalog.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against a consistent view of the catalog.
    pub fn read<R>(&self, f: impl FnOnce(&Catalog) -> R) -> R {
        f(&self.read_guard())
    }

    pub fn snapshot(&self) -> Catalog {
        self.read_guard().clone()
    }

    /// Apply a mutation under the write lock. Failed mutations leave no trace and do not
    /// trigger a save.
    fn mutate<R>(&self, f: impl FnOnce(&mut Catalog) -> Result<R>) -> Result<R> {
        let result = {
            let mut catalog = self.write_guard();
            let result = f(&mut catalog)?;
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
            result
        };
        self.after_mutation();
        Ok(result)
    }

    fn after_mutation(&self) {
        if self.inner.config.autosave && !self.inner.closed.load(Ordering::SeqCst) {
            // Flushed again on shutdown, so a detached save is fine.
            let _ = self.spawn_save();
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.generation.load(Ordering::SeqCst) != self.inner.saved_generation.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Projects
    // ========================================================================

    pub fn create_project(&self, name: &str) -> Result<ProjectId> {
        self.mutate(|c| c.create_project(name))
    }

    pub fn delete_project(&self, id: ProjectId) -> Result<Project> {
        self.mutate(|c| c.delete_project(id))
    }

    pub fn rename_project(&self, id: ProjectId, name: &str) -> Result<()> {
        self.mutate(|c| c.rename_project(id, name))
    }

    pub fn reorder(&self, id: ProjectId, order: &[ReferenceId]) -> Result<()> {
        self.mutate(|c| c.reorder(id, order))
    }

    pub fn list_projects(&self) -> Vec<Project> {
        self.read(|c| c.list_projects().to_vec())
    }

    /// The listing a UI shows when a project is selected. Re-verifies the project in the
    /// background when `verify_on_open` is set.
    pub fn open_project(&self, id: ProjectId) -> Result<Vec<FileReference>> {
        let references = self.list_by_project(id)?;
        if self.inner.config.verify_on_open && !references.is_empty() {
            let _ = self.spawn_verify_all(Some(id));
        }
        Ok(references)
    }

    // ========================================================================
    // References
    // ========================================================================

    pub fn add(&self, project: ProjectId, path: &Path, display_name: Option<&str>) -> Result<ReferenceId> {
        self.mutate(|c| c.add(project, path, display_name))
    }

    pub fn add_many<P: AsRef<Path>>(&self, project: ProjectId, sources: &[P]) -> Result<AddReport> {
        self.mutate(|c| c.add_many(project, sources))
    }

    pub fn add_directory(&self, project: ProjectId, dir: &Path, recursive: bool) -> Result<AddReport> {
        self.mutate(|c| c.add_directory(project, dir, recursive))
    }

    pub fn remove(&self, id: ReferenceId) -> Result<FileReference> {
        self.mutate(|c| c.remove(id))
    }

    pub fn relocate(&self, id: ReferenceId, new_path: &Path) -> Result<()> {
        self.mutate(|c| c.relocate(id, new_path))
    }

    pub fn rename_reference(&self, id: ReferenceId, display_name: &str) -> Result<()> {
        self.mutate(|c| c.rename_reference(id, display_name))
    }

    pub fn get(&self, id: ReferenceId) -> Result<FileReference> {
        self.read(|c| c.get(id).cloned())
    }

    pub fn list_by_project(&self, id: ProjectId) -> Result<Vec<FileReference>> {
        self.read(|c| Ok(c.list_by_project(id)?.into_iter().cloned().collect()))
    }

    // ========================================================================
    // Tags
    // ========================================================================

    pub fn create_tag(&self, name: &str, color: Option<String>) -> Result<TagId> {
        self.mutate(|c| c.create_tag(name, color))
    }

    pub fn rename_tag(&self, id: TagId, name: &str) -> Result<()> {
        self.mutate(|c| c.rename_tag(id, name))
    }

    pub fn set_tag_color(&self, id: TagId, color: Option<String>) -> Result<()> {
        self.mutate(|c| c.set_tag_color(id, color))
    }

    pub fn delete_tag(&self, id: TagId) -> Result<bool> {
        self.mutate(|c| c.delete_tag(id))
    }

    pub fn list_tags(&self) -> Vec<Tag> {
        self.read(|c| c.list_tags().to_vec())
    }

    pub fn tag(&self, id: ReferenceId, tag: TagId) -> Result<bool> {
        self.mutate(|c| c.tag(id, tag))
    }

    pub fn untag(&self, id: ReferenceId, tag: TagId) -> Result<bool> {
        self.mutate(|c| c.untag(id, tag))
    }

    pub fn set_tags_from_text(&self, id: ReferenceId, text: &str) -> Result<Vec<TagId>> {
        self.mutate(|c| c.set_tags_from_text(id, text))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn search(&self, query: &SearchQuery) -> Result<Vec<FileReference>> {
        self.read(|c| Ok(query::search(c, query)?.into_iter().cloned().collect()))
    }

    pub fn quick_search(&self, project: Option<ProjectId>, text: &str) -> Result<Vec<FileReference>> {
        self.read(|c| Ok(query::quick_search(c, project, text)?.into_iter().cloned().collect()))
    }

    // ========================================================================
    // Verification
    // ========================================================================

    /// Verify one reference now. The filesystem is probed outside the catalog lock; if the
    /// reference was relocated meanwhile the result is dropped and the current status returned.
    pub fn verify(&self, id: ReferenceId) -> Result<Status> {
        let path = self.read(|c| c.get(id).map(|r| r.path.as_path().to_path_buf()))?;
        let (status, metadata) = verify::outcome(paths::probe(&path));
        let (written, current) = {
            let mut catalog = self.write_guard();
            let written = verify::commit(&mut catalog, id, &path, status, metadata)?;
            if written {
                self.inner.generation.fetch_add(1, Ordering::SeqCst);
            }
            (written, catalog.get(id)?.status)
        };
        if written {
            self.after_mutation();
        }
        Ok(current)
    }

    /// Verify a project (or everything) on the calling thread.
    pub fn verify_all(&self, project: Option<ProjectId>, cancel: &CancelToken) -> Result<VerifyReport> {
        let report = verify::verify_all(&self.inner.catalog, project, cancel)?;
        self.after_scan(&report);
        Ok(report)
    }

    /// Verify on a background thread. After shutdown has begun the scan starts cancelled.
    pub fn spawn_verify_all(&self, project: Option<ProjectId>) -> VerifyHandle {
        let cancel = CancelToken::new();
        {
            let mut scans = self.lock_scans();
            if self.inner.closed.load(Ordering::SeqCst) {
                cancel.cancel();
            } else {
                scans.push(cancel.clone());
            }
        }

        let registration = ScanRegistration {
            explorer: self.clone(),
            token: cancel.clone(),
        };
        let handle = thread::spawn(move || {
            let token = registration.token.clone();
            registration.explorer.verify_all(project, &token)
        });
        VerifyHandle { cancel, handle }
    }

    fn after_scan(&self, report: &VerifyReport) {
        if report.present + report.missing + report.denied > 0 {
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
            self.after_mutation();
        }
    }

    fn lock_scans(&self) -> MutexGuard<'_, Vec<CancelToken>> {
        self.inner.scans.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Save if anything changed since the last save. Returns whether a write happened.
    pub fn flush(&self) -> Result<bool> {
        let _serial = self.inner.save_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.inner.released.load(Ordering::SeqCst) {
            return Ok(false);
        }

        let (document, generation) = {
            let catalog = self.read_guard();
            (
                persist::to_document(&catalog),
                self.inner.generation.load(Ordering::SeqCst),
            )
        };
        if generation == self.inner.saved_generation.load(Ordering::SeqCst) {
            return Ok(false);
        }

        persist::write_document(&self.inner.config.store_path, &document)?;
        self.inner.saved_generation.store(generation, Ordering::SeqCst);
        log::debug!("[session] Flushed generation {}", generation);
        Ok(true)
    }

    pub fn spawn_save(&self) -> SaveHandle {
        let explorer = self.clone();
        let handle = thread::spawn(move || {
            let result = explorer.flush();
            if let Err(e) = &result {
                log::error!("[session] Background save failed: {}", e);
            }
            result
        });
        SaveHandle { handle }
    }

    pub fn export_project(&self, id: ProjectId) -> Result<StoreDocument> {
        self.read(|c| persist::export_project(c, id))
    }

    pub fn import_project(&self, document: StoreDocument) -> Result<ProjectId> {
        self.mutate(|c| persist::import_project(c, document))
    }

    /// Cancel running scans and wait for them to finish, flush, and release the store lock.
    /// Mutations after this stay in memory; the store is never written again.
    pub fn shutdown(&self) -> Result<()> {
        self.inner.closed.store(true, Ordering::SeqCst);
        {
            let mut scans = self.lock_scans();
            for token in scans.iter() {
                token.cancel();
            }
            while !scans.is_empty() {
                scans = self
                    .inner
                    .scans_idle
                    .wait(scans)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
        self.flush()?;
        {
            let _serial = self.inner.save_lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.inner.released.store(true, Ordering::SeqCst);
        }

        let lock = self
            .inner
            .store_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(lock) = lock {
            lock.release()?;
        }
        Ok(())
    }
}
