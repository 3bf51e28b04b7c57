//! # Library Manager
//!
//! Backup, apply e restore per una singola directory gestita.
//!
//! Ogni operazione prende il lock della directory, legge il manifest,
//! verifica le precondizioni sullo stato e salva il manifest aggiornato.
//!
//! ## Transizioni:
//! - backup: nessun cambio di stato, aggiorna i digest dei file nel mirror
//! - apply: `Staged` → `Applied` (staging consumato e rimosso)
//! - restore: → `Original` (o `Staged` se esiste ancora uno staging)

use crate::config::{BackupPolicy, Config};
use crate::error::PipelineError;
use crate::file_manager::FileManager;
use crate::manifest::{DirectoryState, Manifest, StateStore};
use crate::pipeline::path_resolver::PathResolver;
use crate::progress::FormatTally;
use anyhow::Result;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outcome of backing up one directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupReport {
    pub dir: PathBuf,
    pub copied: usize,
    pub skipped_existing: usize,
}

/// Outcome of applying one directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub dir: PathBuf,
    pub files: usize,
    pub formats: FormatTally,
    pub backup: Option<BackupReport>,
}

/// Outcome of restoring one directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub dir: PathBuf,
    pub restored: usize,
    pub removed_derivatives: usize,
    pub digest_mismatches: usize,
}

/// Moves files between staging, live directory and backup mirror
pub struct LibraryManager {
    config: Config,
}

impl LibraryManager {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn store(&self, rel: &Path) -> StateStore {
        StateStore::new(PathResolver::state_dir(&self.config, rel))
    }

    /// Copy the eligible images of a directory into its backup mirror.
    /// `Ok(None)` when the directory does not exist.
    pub async fn backup_directory(&self, rel: &Path) -> Result<Option<BackupReport>> {
        let live = PathResolver::live_dir(&self.config, rel);
        if !live.is_dir() {
            debug!("Skipping missing directory {}", live.display());
            return Ok(None);
        }

        let store = self.store(rel);
        let _lock = store.lock(&live)?;
        let mut manifest = store.load(&PathResolver::staging_dir(&self.config, rel)).await?;

        let report = self.backup_locked(rel, &mut manifest).await;
        store.save(&manifest).await?;
        report.map(Some)
    }

    /// Backup body; caller holds the lock and saves the manifest.
    async fn backup_locked(&self, rel: &Path, manifest: &mut Manifest) -> Result<BackupReport> {
        let live = PathResolver::live_dir(&self.config, rel);
        let mirror = PathResolver::backup_dir(&self.config, rel);
        let modified = live_is_modified(manifest);

        if self.config.backup_policy == BackupPolicy::Overwrite && modified {
            return Err(PipelineError::InvalidState {
                dir: live,
                state: manifest.state,
                operation: "overwrite the backup of",
            }
            .into());
        }

        if !mirror.exists() {
            tokio::fs::create_dir_all(&mirror).await?;
            info!("📁 Created backup directory: {}", mirror.display());
        }

        // Files that apply introduced are never originals
        let introduced: BTreeSet<&str> = manifest.applied.iter().map(String::as_str).collect();
        let mut report = BackupReport {
            dir: live.clone(),
            ..Default::default()
        };
        let mut digests = Vec::new();

        for source in FileManager::find_source_images(&live).await? {
            let name = FileManager::file_name(&source);
            if introduced.contains(name.as_str()) {
                debug!("Not backing up {} (written by apply)", name);
                continue;
            }

            let target = mirror.join(&name);
            if self.config.backup_policy == BackupPolicy::CopyIfAbsent && target.exists() {
                report.skipped_existing += 1;
                if !manifest.backups.contains_key(&name) {
                    digests.push((name, FileManager::sha256_file(&target).await?));
                }
                continue;
            }

            FileManager::copy_file(&source, &target).await?;
            digests.push((name.clone(), FileManager::sha256_file(&target).await?));
            report.copied += 1;
            info!("💾 Backed up: {}", name);
        }

        manifest.backups.extend(digests);
        if report.skipped_existing > 0 {
            info!(
                "💾 {}: {} files already in backup, kept",
                live.display(),
                report.skipped_existing
            );
        }
        Ok(report)
    }

    /// Promote staged files over the live directory and drop the staging dir.
    /// `Ok(None)` when the directory does not exist or has nothing staged.
    pub async fn apply_directory(&self, rel: &Path) -> Result<Option<ApplyReport>> {
        let live = PathResolver::live_dir(&self.config, rel);
        if !live.is_dir() {
            debug!("Skipping missing directory {}", live.display());
            return Ok(None);
        }

        let store = self.store(rel);
        let _lock = store.lock(&live)?;
        let staging = PathResolver::staging_dir(&self.config, rel);
        let mut manifest = store.load(&staging).await?;

        if !staging.is_dir() {
            info!("⚠️  {}: no optimized images to apply", live.display());
            if manifest.state == DirectoryState::Staged {
                // Staging removed by hand; fall back to what the disk says
                manifest.staged.clear();
                manifest.transition(settled_state(&manifest));
                store.save(&manifest).await?;
            }
            return Ok(None);
        }

        let mut report = ApplyReport {
            dir: live.clone(),
            ..Default::default()
        };

        if self.config.backup_before_apply {
            match self.backup_locked(rel, &mut manifest).await {
                Ok(backup) => report.backup = Some(backup),
                Err(e) => {
                    store.save(&manifest).await?;
                    return Err(e);
                }
            }
        }

        if let Err(e) = self.copy_staged(&staging, &live, &mut manifest, &mut report).await {
            // Staging stays in place so apply can be retried; files already
            // copied are recorded so restore can remove them
            store.save(&manifest).await?;
            return Err(e);
        }

        tokio::fs::remove_dir_all(&staging).await?;
        info!("🧹 Removed staging directory: {}", staging.display());
        manifest.staged.clear();

        if report.files == 0 {
            info!("⚠️  {}: staging held no images, nothing applied", live.display());
            manifest.transition(settled_state(&manifest));
            store.save(&manifest).await?;
            return Ok(None);
        }

        manifest.transition(DirectoryState::Applied);
        store.save(&manifest).await?;

        Ok(Some(report))
    }

    /// Copy every staged image into `live`. Names that did not exist there
    /// before are added to `manifest.applied` ahead of the copy, so a
    /// failure halfway still leaves a complete record.
    async fn copy_staged(
        &self,
        staging: &Path,
        live: &Path,
        manifest: &mut Manifest,
        report: &mut ApplyReport,
    ) -> Result<()> {
        for staged in FileManager::list_files(staging).await? {
            let name = FileManager::file_name(&staged);
            if !FileManager::is_staged_output(&staged) {
                debug!("Skipping {} (not an image)", name);
                continue;
            }
            let target = live.join(&name);
            let introduced = !target.exists();
            let known = manifest.applied.contains(&name);

            if !introduced && !known && !manifest.backups.contains_key(&name) {
                warn!("Overwriting {} which has no backup", target.display());
            }
            if introduced && !known {
                manifest.applied.push(name.clone());
                manifest.applied.sort();
            }

            FileManager::copy_file(&staged, &target).await?;
            report.files += 1;
            report.formats.record_path(&target);
            info!("✅ Applied: {}", name);
        }

        Ok(())
    }

    /// Copy the backup mirror back over the live directory and remove the
    /// derivatives apply introduced. `Ok(None)` when the directory or its
    /// mirror does not exist.
    pub async fn restore_directory(&self, rel: &Path) -> Result<Option<RestoreReport>> {
        let live = PathResolver::live_dir(&self.config, rel);
        if !live.is_dir() {
            debug!("Skipping missing directory {}", live.display());
            return Ok(None);
        }

        let mirror = PathResolver::backup_dir(&self.config, rel);
        if !mirror.is_dir() {
            info!("⚠️  {}: no backup found", live.display());
            return Ok(None);
        }

        let store = self.store(rel);
        let _lock = store.lock(&live)?;
        let staging = PathResolver::staging_dir(&self.config, rel);
        let mut manifest = store.load(&staging).await?;

        let mut report = RestoreReport {
            dir: live.clone(),
            ..Default::default()
        };

        for backup in FileManager::list_files(&mirror).await? {
            let name = FileManager::file_name(&backup);

            if let Some(expected) = manifest.backups.get(&name) {
                let actual = FileManager::sha256_file(&backup).await?;
                if &actual != expected {
                    warn!("Backup of {} changed since it was taken (digest mismatch)", name);
                    report.digest_mismatches += 1;
                }
            }

            FileManager::copy_file(&backup, &live.join(&name)).await?;
            report.restored += 1;
            info!("✅ Restored: {}", name);
        }

        for name in &manifest.applied {
            let derivative = live.join(name);
            if mirror.join(name).exists() || !derivative.is_file() {
                continue;
            }
            tokio::fs::remove_file(&derivative).await?;
            report.removed_derivatives += 1;
            info!("🧹 Removed derivative: {}", name);
        }

        manifest.applied.clear();
        manifest.transition(if staging.is_dir() {
            DirectoryState::Staged
        } else {
            DirectoryState::Original
        });
        store.save(&manifest).await?;

        Ok(Some(report))
    }
}

/// State of a directory with no staging area left
fn settled_state(manifest: &Manifest) -> DirectoryState {
    if manifest.applied.is_empty() {
        DirectoryState::Original
    } else {
        DirectoryState::Applied
    }
}

/// True once apply has written into the live directory and restore has not undone it
fn live_is_modified(manifest: &Manifest) -> bool {
    manifest.state == DirectoryState::Applied || !manifest.applied.is_empty()
}
