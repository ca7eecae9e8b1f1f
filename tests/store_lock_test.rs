//! Tests for the store lock
//!
//! A second explorer pointed at the same store must be refused unless it forces the lock.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

use explorer_lib::store_lock::{self, StoreLock};
use explorer_lib::ExplorerError;

fn lock_path(temp_dir: &TempDir) -> PathBuf {
    temp_dir.path().join("projects.json.lock")
}

fn write_foreign_lock(path: &Path, heartbeat: chrono::DateTime<chrono::Utc>) {
    let fake_lock = serde_json::json!({
        "hostname": "OTHER-DEVICE",
        "pid": 99999,
        "app_version": "0.1.0",
        "locked_at": heartbeat.to_rfc3339(),
        "heartbeat": heartbeat.to_rfc3339()
    });
    fs::write(path, serde_json::to_string_pretty(&fake_lock).unwrap()).unwrap();
}

#[tokio::test]
async fn test_acquire_and_release_lock() {
    let temp_dir = TempDir::new().unwrap();
    let path = lock_path(&temp_dir);

    let lock = StoreLock::acquire(&path, 120, false).unwrap();
    assert!(path.exists(), "Lock file should exist");
    assert_eq!(lock.info().pid, std::process::id());
    assert_eq!(lock.info().hostname, store_lock::get_hostname());

    lock.release().unwrap();
    assert!(!path.exists(), "Lock file should be removed after release");
}

#[tokio::test]
async fn test_reacquire_by_same_process() {
    let temp_dir = TempDir::new().unwrap();
    let path = lock_path(&temp_dir);

    let first = StoreLock::acquire(&path, 120, false).unwrap();
    let second = StoreLock::acquire(&path, 120, false).unwrap();
    println!("Reclaimed lock held by this process: {:?}", second.info());

    second.release().unwrap();
    first.release().unwrap();
    assert!(!path.exists());
}

#[tokio::test]
async fn test_lock_denied_by_another_device() {
    let temp_dir = TempDir::new().unwrap();
    let path = lock_path(&temp_dir);
    write_foreign_lock(&path, chrono::Utc::now());

    match StoreLock::acquire(&path, 120, false) {
        Err(ExplorerError::StoreLocked { holder, stale }) => {
            assert_eq!(holder.hostname, "OTHER-DEVICE");
            assert!(!stale, "Lock should not be stale (recent heartbeat)");
            println!("Lock correctly denied - held by: {}", holder.hostname);
        }
        Err(other) => panic!("Expected StoreLocked, got: {:?}", other),
        Ok(lock) => panic!("Expected StoreLocked, acquired {:?}", lock.info()),
    }
    assert!(path.exists(), "Foreign lock must be left in place");
}

#[tokio::test]
async fn test_stale_lock_detection() {
    let temp_dir = TempDir::new().unwrap();
    let path = lock_path(&temp_dir);
    write_foreign_lock(&path, chrono::Utc::now() - chrono::Duration::seconds(600));

    match StoreLock::acquire(&path, 120, false) {
        Err(ExplorerError::StoreLocked { stale, .. }) => {
            assert!(stale, "Ten-minute-old heartbeat should be stale");
        }
        Err(other) => panic!("Expected StoreLocked, got: {:?}", other),
        Ok(lock) => panic!("Expected StoreLocked, acquired {:?}", lock.info()),
    }

    let (holder, stale) = store_lock::check(&path, 120).expect("lock should be readable");
    assert_eq!(holder.pid, 99999);
    assert!(stale);
}

#[tokio::test]
async fn test_force_acquire_backs_up_old_lock() {
    let temp_dir = TempDir::new().unwrap();
    let path = lock_path(&temp_dir);
    write_foreign_lock(&path, chrono::Utc::now());

    let lock = StoreLock::acquire(&path, 120, true).unwrap();
    assert_eq!(lock.info().pid, std::process::id());

    let backups: Vec<_> = fs::read_dir(temp_dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains("Explorer Conflict"))
        .collect();
    assert_eq!(backups.len(), 1, "Old lock should be backed up once");
    let backup_name = backups[0].file_name().to_string_lossy().to_string();
    assert!(backup_name.contains("OTHER-DEVICE"), "Backup names the old holder: {}", backup_name);

    lock.release().unwrap();
}

#[tokio::test]
async fn test_unreadable_lock_is_overwritten() {
    let temp_dir = TempDir::new().unwrap();
    let path = lock_path(&temp_dir);
    fs::write(&path, "not a lock").unwrap();

    let lock = StoreLock::acquire(&path, 120, false).unwrap();
    let (holder, _) = store_lock::check(&path, 120).expect("lock should now be readable");
    assert_eq!(holder.pid, std::process::id());
    lock.release().unwrap();
}

#[tokio::test]
async fn test_release_leaves_foreign_lock_alone() {
    let temp_dir = TempDir::new().unwrap();
    let path = lock_path(&temp_dir);

    let lock = StoreLock::acquire(&path, 120, false).unwrap();
    // Another device took over in the meantime.
    write_foreign_lock(&path, chrono::Utc::now());

    lock.release().unwrap();
    assert!(path.exists(), "Lock now held by someone else must survive");
}

#[tokio::test]
async fn test_heartbeat_refreshes_lock() {
    let temp_dir = TempDir::new().unwrap();
    let path = lock_path(&temp_dir);

    let mut lock = StoreLock::acquire(&path, 120, false).unwrap();
    let initial = lock.info().heartbeat;
    lock.start_heartbeat(Duration::from_millis(50));

    tokio::time::sleep(Duration::from_millis(300)).await;
    let (holder, stale) = store_lock::check(&path, 120).expect("lock should be readable");
    assert!(holder.heartbeat > initial, "Heartbeat should have moved forward");
    assert!(!stale);

    lock.release().unwrap();
    assert!(!path.exists());
}

#[test]
fn test_get_hostname() {
    let hostname = store_lock::get_hostname();
    assert!(!hostname.is_empty(), "Hostname should not be empty");
    println!("Hostname: {}", hostname);
}
