//! Store Lock
//!
//! Keeps a second explorer process from writing the same catalog store. The lock is a small
//! JSON file next to the store, refreshed by a heartbeat so a lock left behind by a crashed
//! process can be recognised as stale.
//!
//! - Holder identified by hostname + pid
//! - Heartbeat refresh on a tokio task (when a runtime is available)
//! - Force-acquire backs up the old lock with a conflict-style name

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::error::{ExplorerError, Result};
use crate::persist::atomic_write_file;

/// Contents of `<store>.lock`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreLockInfo {
    pub hostname: String,
    pub pid: u32,
    pub app_version: String,
    pub locked_at: DateTime<Utc>,
    pub heartbeat: DateTime<Utc>,
}

impl StoreLockInfo {
    fn is_mine(&self) -> bool {
        self.hostname == *HOSTNAME && self.pid == std::process::id()
    }

    fn is_stale(&self, stale_secs: i64) -> bool {
        Utc::now().signed_duration_since(self.heartbeat).num_seconds() > stale_secs
    }
}

/// Hostname (resolved once per process)
static HOSTNAME: Lazy<String> = Lazy::new(|| {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
});

pub fn get_hostname() -> String {
    HOSTNAME.clone()
}

fn read_lock_file(lock_path: &Path) -> Result<StoreLockInfo> {
    let content = fs::read_to_string(lock_path)?;
    Ok(serde_json::from_str(&content)?)
}

fn write_lock_file(lock_path: &Path, info: &StoreLockInfo) -> Result<()> {
    let content = serde_json::to_vec_pretty(info)?;
    atomic_write_file(lock_path, &content)
}

fn backup_lock_file(lock_path: &Path, old_info: &StoreLockInfo) {
    let timestamp = Utc::now().format("%Y-%m-%d %H-%M-%S");
    let file_name = lock_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "store.lock".to_string());
    let backup_path = lock_path.with_file_name(format!(
        "{} (Explorer Conflict {} from {}).json",
        file_name, timestamp, old_info.hostname
    ));

    match fs::copy(lock_path, &backup_path) {
        Ok(_) => log::info!("[store_lock] Old lock backed up to {:?}", backup_path),
        Err(e) => log::warn!("[store_lock] Failed to back up old lock: {}", e),
    }
}

/// Lock status without acquiring: holder and whether its heartbeat is stale.
pub fn check(lock_path: &Path, stale_secs: i64) -> Option<(StoreLockInfo, bool)> {
    let info = read_lock_file(lock_path).ok()?;
    let stale = info.is_stale(stale_secs);
    Some((info, stale))
}

/// Held lock. Dropping it stops the heartbeat and removes the lock file if still ours.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
    info: StoreLockInfo,
    heartbeat_running: Arc<AtomicBool>,
    heartbeat_handle: Option<JoinHandle<()>>,
}

impl StoreLock {
    pub fn acquire(lock_path: &Path, stale_secs: i64, force: bool) -> Result<Self> {
        log::info!("[store_lock] Acquiring {:?}", lock_path);

        if let Some(parent) = lock_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        if lock_path.exists() {
            match read_lock_file(lock_path) {
                Ok(existing) if existing.is_mine() => {
                    log::info!("[store_lock] Reclaiming lock held by this process");
                }
                Ok(existing) => {
                    let stale = existing.is_stale(stale_secs);
                    if !force {
                        log::warn!(
                            "[store_lock] Store locked by {} (pid {}), stale: {}",
                            existing.hostname,
                            existing.pid,
                            stale
                        );
                        return Err(ExplorerError::StoreLocked {
                            holder: existing,
                            stale,
                        });
                    }
                    backup_lock_file(lock_path, &existing);
                    log::info!("[store_lock] Force acquiring lock from {}", existing.hostname);
                }
                Err(e) => {
                    log::warn!("[store_lock] Unreadable lock file, overwriting: {}", e);
                }
            }
        }

        let now = Utc::now();
        let info = StoreLockInfo {
            hostname: get_hostname(),
            pid: std::process::id(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            locked_at: now,
            heartbeat: now,
        };
        write_lock_file(lock_path, &info)?;
        log::info!("[store_lock] Lock acquired");

        Ok(Self {
            path: lock_path.to_path_buf(),
            info,
            heartbeat_running: Arc::new(AtomicBool::new(false)),
            heartbeat_handle: None,
        })
    }

    pub fn info(&self) -> &StoreLockInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Refresh the heartbeat every `interval` on the current tokio runtime. Without a
    /// runtime the lock simply ages; other processes may then treat it as stale.
    pub fn start_heartbeat(&mut self, interval: Duration) {
        if self.heartbeat_handle.is_some() {
            return;
        }
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                log::debug!("[store_lock] No async runtime, heartbeat disabled");
                return;
            }
        };

        self.heartbeat_running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.heartbeat_running);
        let lock_path = self.path.clone();
        let info = self.info.clone();

        self.heartbeat_handle = Some(handle.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately.
            ticker.tick().await;

            while running.load(Ordering::SeqCst) {
                ticker.tick().await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }

                let mut updated = info.clone();
                updated.heartbeat = Utc::now();
                if let Err(e) = write_lock_file(&lock_path, &updated) {
                    log::error!("[store_lock] Failed to update heartbeat: {}", e);
                } else {
                    log::debug!("[store_lock] Heartbeat updated");
                }
            }
            log::debug!("[store_lock] Heartbeat task stopped");
        }));
    }

    pub fn release(mut self) -> Result<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<()> {
        self.heartbeat_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.heartbeat_handle.take() {
            handle.abort();
        }

        if !self.path.exists() {
            return Ok(());
        }
        if let Ok(existing) = read_lock_file(&self.path) {
            if !existing.is_mine() {
                log::warn!("[store_lock] Lock file now belongs to another process, not removing");
                return Ok(());
            }
        }
        fs::remove_file(&self.path)?;
        log::info!("[store_lock] Lock released");
        Ok(())
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            log::error!("[store_lock] Failed to release {:?}: {}", self.path, e);
        }
    }
}
