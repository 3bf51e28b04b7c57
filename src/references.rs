//! # Reference Updater
//!
//! Riscrive gli URL delle immagini nei sorgenti del sito verso le versioni WebP.
//!
//! ## Flusso:
//! 1. Per ogni directory gestita costruisce la mappa `originale → <stem>.webp`,
//!    solo per le immagini che hanno già un `.webp` accanto nella directory live
//! 2. Scansiona `reference_sources` (file singoli, o directory visitate con
//!    `walkdir` per `.ts/.tsx/.js/.jsx/.mdx`)
//! 3. Sostituisce ogni `/<url prefix>/<dir>/<originale>` con l'URL WebP
//! 4. Prima di riscrivere un file ne salva una copia `<file>.backup`
//!
//! Con `dry_run` vengono solo riportate le sostituzioni.

use crate::config::Config;
use crate::file_manager::FileManager;
use crate::pipeline::PathResolver;
use crate::profile::OutputFormat;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const SOURCE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mdx"];
const SKIPPED_DIRS: &[&str] = &["node_modules", ".next", ".git"];

/// One URL rewrite: original asset URL → WebP asset URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlMapping {
    pub from: String,
    pub to: String,
}

/// Rewrites found in one source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpdate {
    pub path: PathBuf,
    /// Mappings that matched at least once, with their occurrence count
    pub replaced: Vec<(UrlMapping, usize)>,
    /// `<file>.backup`, `None` on dry run
    pub backup: Option<PathBuf>,
}

impl FileUpdate {
    pub fn occurrences(&self) -> usize {
        self.replaced.iter().map(|(_, n)| n).sum()
    }
}

#[derive(Debug, Default)]
pub struct ReferenceSummary {
    pub mappings: usize,
    pub files_scanned: usize,
    pub updated: Vec<FileUpdate>,
    pub dry_run: bool,
}

impl ReferenceSummary {
    pub fn total_replacements(&self) -> usize {
        self.updated.iter().map(FileUpdate::occurrences).sum()
    }
}

pub struct ReferenceUpdater {
    config: Config,
}

impl ReferenceUpdater {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Mappings for every managed directory that exists and lives under the public root
    pub async fn build_mappings(&self) -> Result<Vec<UrlMapping>> {
        let mut mappings = Vec::new();

        for rel in &self.config.managed_dirs {
            let live = PathResolver::live_dir(&self.config, rel);
            if !live.is_dir() {
                continue;
            }
            let Some(prefix) = PathResolver::url_prefix(&self.config, rel) else {
                warn!(
                    "⚠️  {} is not under the public root {}, skipping",
                    live.display(),
                    self.config.public_root.display()
                );
                continue;
            };

            let mut count = 0;
            for source in FileManager::find_source_images(&live).await? {
                let webp = PathResolver::staged_output(&live, &source, OutputFormat::Webp);
                if !webp.is_file() {
                    continue;
                }
                mappings.push(UrlMapping {
                    from: format!("{}/{}", prefix, FileManager::file_name(&source)),
                    to: format!("{}/{}", prefix, FileManager::file_name(&webp)),
                });
                count += 1;
            }

            if count > 0 {
                info!("   {}: {} images with a WebP version", prefix, count);
            }
        }

        Ok(mappings)
    }

    /// Site source files to scan, in a stable order
    pub fn collect_sources(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();

        for source in &self.config.reference_sources {
            if source.is_file() {
                files.push(source.clone());
            } else if source.is_dir() {
                let walker = WalkDir::new(source)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_entry(|e| !is_skipped_dir(e.path()))
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file() && is_site_source(e.path()));
                files.extend(walker.map(|e| e.into_path()));
            } else {
                warn!("⚠️  File not found: {}", source.display());
            }
        }

        files
    }

    /// Rewrite image URLs in the site sources
    pub async fn update(&self, dry_run: bool) -> Result<ReferenceSummary> {
        info!("🔍 Updating image references...");
        let mappings = self.build_mappings().await?;
        let mut summary = ReferenceSummary {
            mappings: mappings.len(),
            dry_run,
            ..Default::default()
        };

        if mappings.is_empty() {
            info!("ℹ️  No images with a WebP version, nothing to update");
            return Ok(summary);
        }

        for path in self.collect_sources() {
            summary.files_scanned += 1;
            if let Some(update) = update_file(&path, &mappings, dry_run).await? {
                info!("📝 {}: {} references", path.display(), update.occurrences());
                for (mapping, _) in &update.replaced {
                    info!("     {} → {}", mapping.from, mapping.to);
                }
                summary.updated.push(update);
            } else {
                debug!("No references to update in {}", path.display());
            }
        }

        if dry_run {
            info!(
                "🔍 Dry run: {} references in {} files would be updated",
                summary.total_replacements(),
                summary.updated.len()
            );
        } else {
            info!(
                "🎉 Updated {} references in {} files",
                summary.total_replacements(),
                summary.updated.len()
            );
            if !summary.updated.is_empty() {
                info!("💡 The previous versions are kept as .backup files");
            }
        }

        Ok(summary)
    }
}

/// Apply `mappings` to one file. `Ok(None)` when nothing matched.
async fn update_file(
    path: &Path,
    mappings: &[UrlMapping],
    dry_run: bool,
) -> Result<Option<FileUpdate>> {
    let original = tokio::fs::read_to_string(path).await?;
    let (content, replaced) = rewrite(&original, mappings);

    if replaced.is_empty() {
        return Ok(None);
    }

    let backup = if dry_run {
        None
    } else {
        let backup = backup_path(path);
        tokio::fs::copy(path, &backup).await?;
        info!("💾 Backed up {}", backup.display());
        tokio::fs::write(path, content).await?;
        Some(backup)
    };

    Ok(Some(FileUpdate {
        path: path.to_path_buf(),
        replaced,
        backup,
    }))
}

/// Replace every mapped URL in `content`
fn rewrite(content: &str, mappings: &[UrlMapping]) -> (String, Vec<(UrlMapping, usize)>) {
    let mut content = content.to_string();
    let mut replaced = Vec::new();

    for mapping in mappings {
        let count = content.matches(mapping.from.as_str()).count();
        if count > 0 {
            content = content.replace(&mapping.from, &mapping.to);
            replaced.push((mapping.clone(), count));
        }
    }

    (content, replaced)
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".backup");
    PathBuf::from(name)
}

fn is_site_source(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            SOURCE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn is_skipped_dir(path: &Path) -> bool {
    path.file_name()
        .map(|name| SKIPPED_DIRS.iter().any(|s| name == *s))
        .unwrap_or(false)
}
