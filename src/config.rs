//! Runtime configuration.
//!
//! Precedence, lowest first: built-in defaults, `config.json` beside the store, environment
//! (`EXPLORER_STORE`, `EXPLORER_AUTOSAVE`), then whatever the caller overrides afterwards
//! (the CLI applies `--store`).

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

const CONFIG_FILE_NAME: &str = "config.json";
const STORE_FILE_NAME: &str = "projects.json";

/// Platform application-data directory for the explorer (computed once).
static APP_DATA_DIR: Lazy<PathBuf> = Lazy::new(app_data_dir);

fn app_data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(app_data) = std::env::var("APPDATA") {
            return PathBuf::from(app_data).join("ClarityExplorer");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("ClarityExplorer");
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("clarity-explorer");
        }
    }

    // Fallback: temp directory
    std::env::temp_dir().join("clarity-explorer")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    pub store_path: PathBuf,
    /// Flush after every successful mutation.
    pub autosave: bool,
    /// Start a background verification of every reference right after loading.
    pub verify_on_load: bool,
    /// Re-verify a project whenever it is opened.
    pub verify_on_open: bool,
    /// A store lock whose heartbeat is older than this is considered abandoned.
    pub lock_stale_secs: i64,
    pub heartbeat_secs: u64,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            store_path: APP_DATA_DIR.join(STORE_FILE_NAME),
            autosave: true,
            verify_on_load: true,
            verify_on_open: false,
            lock_stale_secs: 120,
            heartbeat_secs: 15,
        }
    }
}

impl ExplorerConfig {
    /// Defaults, then `config.json` from the application directory, then environment.
    pub fn load() -> Result<Self> {
        let mut config = Self::read_file(&APP_DATA_DIR.join(CONFIG_FILE_NAME))?;
        config.apply_env();
        Ok(config)
    }

    /// Configuration for an explicit store, honoring a `config.json` next to it.
    pub fn for_store(store_path: &Path) -> Result<Self> {
        let config_path = store_path
            .parent()
            .map(|dir| dir.join(CONFIG_FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
        let mut config = Self::read_file(&config_path)?;
        config.apply_env();
        config.store_path = store_path.to_path_buf();
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        log::debug!("[config] Loaded {:?}", path);
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(store) = std::env::var("EXPLORER_STORE") {
            if !store.trim().is_empty() {
                self.store_path = PathBuf::from(store);
            }
        }
        if let Ok(autosave) = std::env::var("EXPLORER_AUTOSAVE") {
            match autosave.trim().to_lowercase().as_str() {
                "0" | "false" | "no" | "off" => self.autosave = false,
                "1" | "true" | "yes" | "on" => self.autosave = true,
                other => log::warn!("[config] Ignoring EXPLORER_AUTOSAVE={:?}", other),
            }
        }
    }

    pub fn lock_path(&self) -> PathBuf {
        let file_name = self
            .store_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| STORE_FILE_NAME.to_string());
        self.store_path.with_file_name(format!("{}.lock", file_name))
    }
}
