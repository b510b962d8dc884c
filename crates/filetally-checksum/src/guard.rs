//! Single-flight guard for checksum runs.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use filetally_core::path_key;

/// Tracks which manifests currently have an active run.
///
/// Cloning shares the registry. Two runs targeting the same manifest path
/// (compared case-insensitively) cannot hold a guard at the same time.
#[derive(Debug, Clone, Default)]
pub struct RunRegistry {
    active: Arc<Mutex<HashSet<String>>>,
}

impl RunRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `path`, or return `None` if a run already holds it.
    pub fn try_acquire(&self, path: &Path) -> Option<RunGuard> {
        let key = registry_key(path);
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(key.clone()) {
            return None;
        }
        Some(RunGuard {
            registry: self.clone(),
            key,
            path: path.to_path_buf(),
        })
    }

    /// Whether a run currently holds `path`.
    pub fn is_active(&self, path: &Path) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&registry_key(path))
    }
}

fn registry_key(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    path_key(&absolute.to_string_lossy())
}

/// Releases its manifest when dropped.
#[derive(Debug)]
pub struct RunGuard {
    registry: RunRegistry,
    key: String,
    path: PathBuf,
}

impl RunGuard {
    /// The manifest this guard holds.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.registry
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}
