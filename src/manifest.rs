//! # State Manifest Module
//!
//! Questo modulo rende esplicito lo stato di ogni directory gestita.
//!
//! ## Responsabilità:
//! - Definisce `DirectoryState` (Original / Staged / Applied)
//! - Persiste lo stato in un manifest JSON accanto al backup mirror
//! - Registra file in staging, file applicati e digest dei backup
//! - Fornisce un lock esclusivo per directory contro run concorrenti
//!
//! ## Layout:
//! ```text
//! <images_root>/.image-pipeline/<dir>/state.json
//! <images_root>/.image-pipeline/<dir>/lock
//! ```
//!
//! ## Stato senza manifest:
//! Se il manifest non esiste lo stato viene dedotto dal filesystem:
//! staging presente → `Staged`, altrimenti `Original`.
//!
//! ## Esempio struttura manifest:
//! ```json
//! {
//!   "state": "applied",
//!   "updated_at": 1727250000,
//!   "staged": [],
//!   "applied": ["page-1.jpg", "page-1.webp"],
//!   "backups": { "page-1.jpg": "9f86d081884c7d65..." }
//! }
//! ```

use crate::error::PipelineError;
use crate::utils::unix_now;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const MANIFEST_FILE: &str = "state.json";
const LOCK_FILE: &str = "lock";

/// Lifecycle of a managed directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryState {
    /// No staged files; live files are whatever the site ships
    #[default]
    Original,
    /// `optimized/` holds converted files, live files unchanged
    Staged,
    /// Staged files were promoted over the live files
    Applied,
}

impl fmt::Display for DirectoryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Original => "original",
            Self::Staged => "staged",
            Self::Applied => "applied",
        };
        f.write_str(name)
    }
}

/// Persisted record for one managed directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub state: DirectoryState,
    pub updated_at: u64,
    /// File names currently in the staging directory
    pub staged: Vec<String>,
    /// File names written into the live directory by the last apply
    pub applied: Vec<String>,
    /// File name → SHA-256 of its copy in the backup mirror
    pub backups: BTreeMap<String, String>,
}

impl Manifest {
    /// Manifest deduced from the filesystem when none was ever written
    pub fn inferred(staging_exists: bool) -> Self {
        Self {
            state: if staging_exists {
                DirectoryState::Staged
            } else {
                DirectoryState::Original
            },
            ..Default::default()
        }
    }

    pub fn transition(&mut self, state: DirectoryState) {
        debug!("State transition {} -> {}", self.state, state);
        self.state = state;
        self.updated_at = unix_now();
    }
}

/// Reads and writes the manifest of one directory
pub struct StateStore {
    state_dir: PathBuf,
}

impl StateStore {
    pub fn new(state_dir: PathBuf) -> Self {
        Self { state_dir }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.state_dir.join(MANIFEST_FILE)
    }

    /// Load the manifest, or infer it from the staging directory if absent
    pub async fn load(&self, staging_dir: &Path) -> Result<Manifest, PipelineError> {
        let path = self.manifest_path();
        if !path.exists() {
            return Ok(Manifest::inferred(staging_dir.is_dir()));
        }

        let content = tokio::fs::read_to_string(&path).await?;
        serde_json::from_str(&content).map_err(|e| {
            PipelineError::Manifest(format!("{}: {}", path.display(), e))
        })
    }

    /// Atomically replace the manifest on disk
    pub async fn save(&self, manifest: &Manifest) -> Result<(), PipelineError> {
        tokio::fs::create_dir_all(&self.state_dir).await?;
        let content = serde_json::to_vec_pretty(manifest)?;
        let state_dir = self.state_dir.clone();
        let target = self.manifest_path();

        tokio::task::spawn_blocking(move || -> Result<(), PipelineError> {
            let mut tmp = tempfile::NamedTempFile::new_in(&state_dir)?;
            tmp.write_all(&content)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&target).map_err(|e| PipelineError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| PipelineError::Manifest(format!("manifest writer task failed: {}", e)))?
    }

    /// Take the exclusive lock for this directory. A lock left behind by a
    /// process that no longer runs is removed and taken over.
    pub fn lock(&self, dir: &Path) -> Result<DirectoryLock, PipelineError> {
        std::fs::create_dir_all(&self.state_dir)?;
        let path = self.state_dir.join(LOCK_FILE);

        match create_lock_file(&path) {
            Ok(lock) => return Ok(lock),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }

        if !lock_is_stale(&path) {
            return Err(PipelineError::Locked(dir.to_path_buf()));
        }

        warn!("🔓 Removing stale lock {}", path.display());
        std::fs::remove_file(&path)?;
        match create_lock_file(&path) {
            Ok(lock) => Ok(lock),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(PipelineError::Locked(dir.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn create_lock_file(path: &Path) -> std::io::Result<DirectoryLock> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    if let Err(e) = writeln!(file, "{}", std::process::id()) {
        debug!("Could not record pid in {}: {}", path.display(), e);
    }
    debug!("Acquired lock {}", path.display());
    Ok(DirectoryLock {
        path: path.to_path_buf(),
    })
}

/// A lock is stale when it names a pid that is no longer running.
/// Unreadable locks, or platforms without a process table to check, count as held.
fn lock_is_stale(path: &Path) -> bool {
    let pid = match std::fs::read_to_string(path) {
        Ok(content) => match content.trim().parse::<u32>() {
            Ok(pid) => pid,
            Err(_) => return false,
        },
        Err(_) => return false,
    };
    !process_is_running(pid)
}

#[cfg(target_os = "linux")]
fn process_is_running(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_is_running(_pid: u32) -> bool {
    true
}

/// Held while an operation mutates a directory; released on drop
#[derive(Debug)]
pub struct DirectoryLock {
    path: PathBuf,
}

impl Drop for DirectoryLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_manifest_is_inferred() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path().join("state"));
        let staging = temp.path().join("optimized");

        let manifest = store.load(&staging).await.unwrap();
        assert_eq!(manifest.state, DirectoryState::Original);

        tokio::fs::create_dir(&staging).await.unwrap();
        let manifest = store.load(&staging).await.unwrap();
        assert_eq!(manifest.state, DirectoryState::Staged);
    }

    #[tokio::test]
    async fn test_manifest_save_load() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path().join("state").join("gallery"));

        let mut manifest = Manifest::default();
        manifest.transition(DirectoryState::Applied);
        manifest.applied = vec!["a.webp".to_string()];
        manifest.backups.insert("a.png".to_string(), "00ff".to_string());
        store.save(&manifest).await.unwrap();

        let loaded = store.load(&temp.path().join("missing")).await.unwrap();
        assert_eq!(loaded, manifest);
        assert!(loaded.updated_at > 0);
    }

    #[tokio::test]
    async fn test_corrupt_manifest_is_reported() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path().to_path_buf());
        tokio::fs::write(store.manifest_path(), "{not json").await.unwrap();

        let err = store.load(temp.path()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Manifest(_)));
    }

    #[test]
    fn test_lock_is_exclusive_and_released() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path().join("state"));
        let dir = temp.path().join("gallery");

        let guard = store.lock(&dir).unwrap();
        let second = store.lock(&dir);
        assert!(matches!(second, Err(PipelineError::Locked(_))));

        drop(guard);
        assert!(store.lock(&dir).is_ok());
    }

    #[test]
    fn test_unreadable_lock_is_kept() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path().to_path_buf());
        std::fs::write(temp.path().join(LOCK_FILE), "not a pid").unwrap();

        let result = store.lock(&temp.path().join("gallery"));
        assert!(matches!(result, Err(PipelineError::Locked(_))));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_lock_of_dead_process_is_taken_over() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(temp.path().to_path_buf());
        let lock_path = temp.path().join(LOCK_FILE);
        // Above the kernel's pid_max, so never a running process
        std::fs::write(&lock_path, format!("{}\n", u32::MAX)).unwrap();

        let guard = store.lock(&temp.path().join("gallery")).unwrap();
        let owner = std::fs::read_to_string(&lock_path).unwrap();
        assert_eq!(owner.trim(), std::process::id().to_string());

        drop(guard);
        assert!(!lock_path.exists());
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&DirectoryState::Staged).unwrap();
        assert_eq!(json, "\"staged\"");
        assert_eq!(DirectoryState::Applied.to_string(), "applied");
    }
}
