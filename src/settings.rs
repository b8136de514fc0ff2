//! Persistent settings and the task link registry
//!
//! The engine owns exactly one piece of durable state beyond the filesystem
//! itself: a settings document holding the two configured roots, the remote
//! API base URL, and the `linkedTasks` mapping from task identifier to the
//! workspace-relative path it is linked to.
//!
//! The document lives behind the [`SettingsStore`] trait so the surrounding
//! application can supply whatever key-value store it already uses;
//! [`JsonSettingsStore`] is the file-backed implementation used by the CLI
//! and tests. Every registry mutation is a full load-modify-save of the
//! document. There is no partial-key atomicity beyond the store's own
//! durability; concurrent writers racing on the same task id resolve as
//! last-write-wins, which is the accepted behavior for a single-user tool.

use crate::error::Result;
use crate::utils::atomic_write;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// The persisted settings document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Absolute root of the local workspace mirror
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_path: Option<PathBuf>,
    /// Absolute root of the remote source tree
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_path: Option<PathBuf>,
    /// Base URL of the remote snapshot API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    /// Mapping from task identifier to its linked workspace-relative path
    #[serde(default)]
    pub linked_tasks: BTreeMap<String, PathBuf>,
}

/// Durable storage for the settings document
///
/// The store reads and writes the document as a whole; the registry layers
/// read-modify-write on top of it.
pub trait SettingsStore: Send + Sync {
    /// Load the current document; a missing store yields the default document
    fn load(&self) -> Result<Settings>;
    /// Persist the document
    fn save(&self, settings: &Settings) -> Result<()>;
}

/// File-backed settings store (pretty-printed JSON, atomic writes)
#[derive(Debug)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    /// Create a store backed by the given file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> Result<Settings> {
        if !self.path.exists() {
            return Ok(Settings::default());
        }
        let raw = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_vec_pretty(settings)?;
        atomic_write(&self.path, &raw)
    }
}

/// The mapping from task identifier to linked workspace path
///
/// One link per task id; created by a successful Link operation and removed
/// by Unlink. An in-process mutex covers the load-modify-save window so two
/// threads in the same process cannot interleave a mutation; cross-process
/// races remain last-write-wins.
#[derive(Clone)]
pub struct LinkRegistry {
    store: Arc<dyn SettingsStore>,
    write_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for LinkRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkRegistry").finish_non_exhaustive()
    }
}

impl LinkRegistry {
    /// Create a registry over a settings store
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// The linked relative path for a task, if any
    pub fn get(&self, task_id: &str) -> Result<Option<PathBuf>> {
        Ok(self.store.load()?.linked_tasks.get(task_id).cloned())
    }

    /// Link a task to a workspace-relative path (replaces any existing link)
    pub fn set(&self, task_id: &str, relative_path: &Path) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut settings = self.store.load()?;
        settings
            .linked_tasks
            .insert(task_id.to_string(), relative_path.to_path_buf());
        self.store.save(&settings)?;
        debug!(task_id, path = ?relative_path, "registered task link");
        Ok(())
    }

    /// Remove a task's link; removing an absent link is a no-op
    pub fn remove(&self, task_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut settings = self.store.load()?;
        if settings.linked_tasks.remove(task_id).is_some() {
            self.store.save(&settings)?;
            debug!(task_id, "removed task link");
        }
        Ok(())
    }

    /// The whole mapping
    pub fn all(&self) -> Result<BTreeMap<String, PathBuf>> {
        Ok(self.store.load()?.linked_tasks)
    }
}
