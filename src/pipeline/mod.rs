//! # Pipeline Module
//!
//! Entry point delle operazioni eseguite su tutte le directory gestite:
//! - `directory_processor`: Conversione di una directory nello staging
//! - `library_manager`: Backup / apply / restore di una directory
//! - `path_resolver`: Logica di calcolo path centralizzata
//!
//! L'aggiornamento dei riferimenti (`refs`) è delegato a `crate::references`.
//!
//! `Pipeline` itera `Config::managed_dirs` in ordine e aggrega i report.
//! Le directory inesistenti vengono saltate senza errore.

pub mod directory_processor;
pub mod library_manager;
pub mod path_resolver;

pub use directory_processor::{DirectoryProcessor, DirectoryReport, FileReport};
pub use library_manager::{ApplyReport, BackupReport, LibraryManager, RestoreReport};
pub use path_resolver::PathResolver;

use crate::config::{ApplyFailurePolicy, Config};
use crate::file_manager::FileManager;
use crate::manifest::{DirectoryState, StateStore};
use crate::progress::{ConversionStats, FormatTally};
use crate::references::{ReferenceSummary, ReferenceUpdater};
use crate::tool_check::ToolChecker;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// A directory whose operation failed, with the rendered error
#[derive(Debug, Clone)]
pub struct DirectoryFailure {
    pub dir: PathBuf,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct OptimizeSummary {
    pub directories: Vec<DirectoryReport>,
    /// Directories left alone because they are already applied
    pub skipped_applied: Vec<PathBuf>,
    pub failed: Vec<DirectoryFailure>,
    pub stats: ConversionStats,
}

#[derive(Debug, Default)]
pub struct BackupSummary {
    pub directories: Vec<BackupReport>,
    pub failed: Vec<DirectoryFailure>,
}

impl BackupSummary {
    pub fn total_copied(&self) -> usize {
        self.directories.iter().map(|r| r.copied).sum()
    }
}

#[derive(Debug, Default)]
pub struct ApplySummary {
    pub directories: Vec<ApplyReport>,
    pub failed: Vec<DirectoryFailure>,
    pub totals: FormatTally,
}

#[derive(Debug, Default)]
pub struct RestoreSummary {
    pub directories: Vec<RestoreReport>,
    pub failed: Vec<DirectoryFailure>,
}

impl RestoreSummary {
    pub fn total_restored(&self) -> usize {
        self.directories.iter().map(|r| r.restored).sum()
    }
}

/// Read-only view of one managed directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryStatus {
    pub dir: PathBuf,
    pub exists: bool,
    pub state: DirectoryState,
    pub staged_files: usize,
    pub backup_files: usize,
}

/// Runs operations across every managed directory
#[derive(Debug)]
pub struct Pipeline {
    config: Config,
    show_progress: bool,
}

impl Pipeline {
    /// Create a pipeline after validating the configuration
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            show_progress: false,
        })
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn managed(&self) -> impl Iterator<Item = &PathBuf> {
        self.config.managed_dirs.iter()
    }

    fn live_dir(&self, rel: &Path) -> PathBuf {
        PathResolver::live_dir(&self.config, rel)
    }

    /// Convert every managed directory into its staging area.
    /// Fails before touching anything when a tool is missing.
    pub async fn optimize(&self, force: bool) -> Result<OptimizeSummary> {
        ToolChecker::new(&self.config.tools).verify().await?;

        let processor = DirectoryProcessor::new(&self.config).with_progress(self.show_progress);
        let mut summary = OptimizeSummary::default();

        for rel in self.managed() {
            let live = self.live_dir(rel);
            if !live.is_dir() {
                continue;
            }

            match self.optimize_directory(&processor, rel, force).await {
                Ok(Some(report)) => {
                    summary.stats += &report.stats;
                    summary.directories.push(report);
                }
                Ok(None) => summary.skipped_applied.push(live),
                Err(e) => record_failure(&mut summary.failed, live, e),
            }
        }

        info!("🎉 Image optimization complete! {}", summary.stats.format_summary());
        info!("💡 Optimized files are in each directory's {}/ subdirectory", self.config.staging_dir_name);
        info!("💡 Review them, then run `image-pipeline apply`");
        Ok(summary)
    }

    async fn optimize_directory(
        &self,
        processor: &DirectoryProcessor,
        rel: &Path,
        force: bool,
    ) -> Result<Option<DirectoryReport>> {
        let live = self.live_dir(rel);
        let store = StateStore::new(PathResolver::state_dir(&self.config, rel));
        let _lock = store.lock(&live)?;
        let staging = PathResolver::staging_dir(&self.config, rel);
        let mut manifest = store.load(&staging).await?;

        if manifest.state == DirectoryState::Applied && !force {
            warn!(
                "⚠️  {}: already applied, skipping (use --force to optimize the applied images again)",
                live.display()
            );
            return Ok(None);
        }

        let report = processor.process_directory(&live).await?;
        let staged = report.staged_names();
        if !staged.is_empty() {
            manifest.staged = staged;
            manifest.transition(DirectoryState::Staged);
            store.save(&manifest).await?;
        } else if staging.is_dir() && FileManager::list_files(&staging).await?.is_empty() {
            // Every conversion failed; an empty staging dir would read as `Staged`
            match tokio::fs::remove_dir(&staging).await {
                Ok(()) => debug!("Removed empty staging directory {}", staging.display()),
                Err(e) => debug!("Keeping staging directory {}: {}", staging.display(), e),
            }
        }
        Ok(Some(report))
    }

    /// Copy the eligible images of every managed directory into the backup mirror
    pub async fn backup(&self) -> Result<BackupSummary> {
        let manager = LibraryManager::new(self.config.clone());
        let mut summary = BackupSummary::default();

        for rel in self.managed() {
            let live = self.live_dir(rel);
            match manager.backup_directory(rel).await {
                Ok(Some(report)) => summary.directories.push(report),
                Ok(None) => {}
                Err(e) => record_failure(&mut summary.failed, live, e),
            }
        }

        info!(
            "🎉 Backup complete: {} files copied to {}",
            summary.total_copied(),
            PathResolver::backup_root(&self.config).display()
        );
        Ok(summary)
    }

    /// Promote staged images in every managed directory
    pub async fn apply(&self) -> Result<ApplySummary> {
        let manager = LibraryManager::new(self.config.clone());
        let mut summary = ApplySummary::default();

        info!("⚙️  Configuration:");
        info!("   - Backup originals first: {}", self.config.backup_before_apply);
        info!("   - Backup policy: {:?}", self.config.backup_policy);
        info!("   - On failure: {:?}", self.config.apply_failure_policy);

        for rel in self.managed() {
            let live = self.live_dir(rel);
            if live.is_dir() {
                info!("📁 Applying: {}", live.display());
            }

            match manager.apply_directory(rel).await {
                Ok(Some(report)) => {
                    summary.totals += report.formats;
                    summary.directories.push(report);
                }
                Ok(None) => {}
                Err(e) => match self.config.apply_failure_policy {
                    ApplyFailurePolicy::AbortRun => {
                        error!("❌ {}: {:#}", live.display(), e);
                        return Err(e.context(format!("apply aborted at {}", live.display())));
                    }
                    ApplyFailurePolicy::AbortDirectory => {
                        record_failure(&mut summary.failed, live, e)
                    }
                },
            }
        }

        info!("🎉 Apply complete!");
        info!("📊 Statistics:");
        info!("   - WebP images: {}", summary.totals.webp);
        info!("   - JPG images: {}", summary.totals.jpg);
        info!("   - PNG images: {}", summary.totals.png);
        if self.config.backup_before_apply {
            info!(
                "   - Originals backed up to: {}",
                PathResolver::backup_root(&self.config).display()
            );
        }
        info!("💡 To go back to the originals run `image-pipeline restore`");
        Ok(summary)
    }

    /// Copy backups back over every managed directory
    pub async fn restore(&self) -> Result<RestoreSummary> {
        let manager = LibraryManager::new(self.config.clone());
        let mut summary = RestoreSummary::default();

        let backup_root = PathResolver::backup_root(&self.config);
        if !backup_root.is_dir() {
            info!("❌ No backup directory found at {}", backup_root.display());
            return Ok(summary);
        }

        for rel in self.managed() {
            let live = self.live_dir(rel);
            match manager.restore_directory(rel).await {
                Ok(Some(report)) => {
                    info!("   {} files restored in {}", report.restored, live.display());
                    summary.directories.push(report);
                }
                Ok(None) => {}
                Err(e) => record_failure(&mut summary.failed, live, e),
            }
        }

        info!("🎉 Restore complete: {} files restored", summary.total_restored());
        info!("💡 The backup is kept in {}", backup_root.display());
        Ok(summary)
    }

    /// State of every managed directory, without taking locks
    pub async fn status(&self) -> Result<Vec<DirectoryStatus>> {
        let mut statuses = Vec::new();

        for rel in self.managed() {
            let live = self.live_dir(rel);
            let staging = PathResolver::staging_dir(&self.config, rel);
            let mirror = PathResolver::backup_dir(&self.config, rel);
            let exists = live.is_dir();

            let state = if exists {
                StateStore::new(PathResolver::state_dir(&self.config, rel))
                    .load(&staging)
                    .await?
                    .state
            } else {
                DirectoryState::Original
            };

            statuses.push(DirectoryStatus {
                dir: live,
                exists,
                state,
                staged_files: count_files(&staging).await?,
                backup_files: count_files(&mirror).await?,
            });
        }

        Ok(statuses)
    }

    /// Point site sources at the WebP versions of applied images
    pub async fn refs(&self, dry_run: bool) -> Result<ReferenceSummary> {
        ReferenceUpdater::new(self.config.clone()).update(dry_run).await
    }
}

fn record_failure(failed: &mut Vec<DirectoryFailure>, dir: PathBuf, e: anyhow::Error) {
    error!("❌ {}: {:#}", dir.display(), e);
    failed.push(DirectoryFailure {
        dir,
        error: format!("{:#}", e),
    });
}

async fn count_files(dir: &Path) -> Result<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }
    Ok(FileManager::list_files(dir).await?.len())
}
