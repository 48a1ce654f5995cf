//! Artifact store: the run-scoped registry of binaries produced so far
//!
//! Keys are case-insensitive base filenames. A later registration of the
//! same key replaces the earlier one, and every project built afterwards
//! sees the replacement. The store is the only state shared between
//! project builds, so one mutex around the map is all the locking needed.

mod patcher;

pub use patcher::{PatchReport, PatchedReference, ResourcePatcher};

use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// A produced binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    /// Base filename as produced (original case)
    pub name: String,
    pub path: PathBuf,
    /// Id of the project that produced it
    pub owner: String,
    /// Logical timestamp: registration order within the run
    pub sequence: u64,
}

#[derive(Debug, Default)]
struct Registry {
    entries: HashMap<String, Artifact>,
    next_sequence: u64,
}

/// Cloneable handle to one run's artifact registry
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    inner: Arc<Mutex<Registry>>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers or replaces the artifact under `key`; returns the replaced one
    pub fn put(&self, key: &str, path: &Path, owner: &str) -> Option<Artifact> {
        let mut registry = self.registry();
        let sequence = registry.next_sequence;
        registry.next_sequence += 1;

        let artifact = Artifact {
            name: key.to_string(),
            path: path.to_path_buf(),
            owner: owner.to_string(),
            sequence,
        };
        let previous = registry.entries.insert(key.to_lowercase(), artifact);
        if let Some(prev) = &previous {
            debug!(key, previous_owner = %prev.owner, owner, "Replacing artifact");
        }
        previous
    }

    pub fn get(&self, key: &str) -> Option<Artifact> {
        self.registry().entries.get(&key.to_lowercase()).cloned()
    }

    /// Point-in-time copy of every registered artifact, sorted by key
    pub fn snapshot(&self) -> Vec<Artifact> {
        let mut artifacts: Vec<Artifact> = self.registry().entries.values().cloned().collect();
        artifacts.sort_by_key(|a| a.name.to_lowercase());
        artifacts
    }

    pub fn len(&self) -> usize {
        self.registry().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers the files a project produced, plus import-library aliases
    ///
    /// MinGW import libraries (`foo.dll.a`, `libfoo.a`) are also reachable as
    /// `foo.lib`, the name MSVC-oriented manifests refer to them by.
    pub fn register_outputs(&self, owner: &str, files: &[PathBuf]) -> Vec<Artifact> {
        let mut registered = Vec::new();
        for file in files {
            let Some(name) = file.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };
            self.put(&name, file, owner);
            if let Some(alias) = import_library_alias(&name) {
                if self.get(&alias).map_or(true, |a| a.owner == owner) {
                    self.put(&alias, file, owner);
                }
            }
            if let Some(artifact) = self.get(&name) {
                registered.push(artifact);
            }
        }
        registered
    }
}

/// `foo.dll.a` and `libfoo.a` map to `foo.lib`
fn import_library_alias(name: &str) -> Option<String> {
    let lower = name.to_lowercase();
    if let Some(stem) = lower.strip_suffix(".dll.a") {
        return Some(format!("{}.lib", &name[..stem.len()]));
    }
    if lower.starts_with("lib") && lower.ends_with(".a") && lower.len() > 5 {
        return Some(format!("{}.lib", &name[3..name.len() - 2]));
    }
    None
}

/// Whether a file looks like a Windows build output worth registering
pub fn is_binary_output(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    [".exe", ".dll", ".lib", ".a", ".ocx", ".sys"]
        .iter()
        .any(|ext| name.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_case_insensitive() {
        let store = ArtifactStore::new();
        assert!(store.get("LibA.dll").is_none());

        store.put("LibA.dll", Path::new("/out/LibA/LibA.dll"), "LibA");
        let artifact = store.get("liba.DLL").unwrap();
        assert_eq!(artifact.path, PathBuf::from("/out/LibA/LibA.dll"));
        assert_eq!(artifact.owner, "LibA");
    }

    #[test]
    fn test_last_writer_wins() {
        let store = ArtifactStore::new();
        store.put("core.dll", Path::new("/out/a/core.dll"), "a");
        let previous = store.put("Core.dll", Path::new("/out/b/Core.dll"), "b");

        assert_eq!(previous.unwrap().owner, "a");
        assert_eq!(store.len(), 1);
        let current = store.get("core.dll").unwrap();
        assert_eq!(current.owner, "b");
        assert_eq!(current.sequence, 1);
    }

    #[test]
    fn test_clones_share_registry() {
        let store = ArtifactStore::new();
        let handle = store.clone();
        handle.put("x.exe", Path::new("/out/x.exe"), "x");
        assert!(store.get("X.EXE").is_some());
    }

    #[test]
    fn test_register_outputs_with_aliases() {
        let store = ArtifactStore::new();
        let registered = store.register_outputs(
            "LibA",
            &[
                PathBuf::from("/out/LibA/LibA.dll"),
                PathBuf::from("/out/LibA/LibA.dll.a"),
            ],
        );
        assert_eq!(registered.len(), 2);
        assert_eq!(
            store.get("LibA.lib").unwrap().path,
            PathBuf::from("/out/LibA/LibA.dll.a")
        );
        assert_eq!(store.snapshot().len(), 3);
    }

    #[test]
    fn test_import_library_alias() {
        assert_eq!(import_library_alias("Foo.dll.a").as_deref(), Some("Foo.lib"));
        assert_eq!(import_library_alias("libzip.a").as_deref(), Some("zip.lib"));
        assert_eq!(import_library_alias("lib.a"), None);
        assert_eq!(import_library_alias("foo.dll"), None);
    }
}
