//! # Directory Processor
//!
//! Worker che converte le immagini di una singola directory nello staging.
//!
//! ## Flusso:
//! 1. Lista non ricorsiva dei file eleggibili (jpg/jpeg/png), ordinati per nome
//! 2. Nessun file → nessun side effect
//! 3. Crea `<dir>/optimized/`
//! 4. Per ogni file: classificazione, una conversione per formato del profilo
//!
//! ## Concorrenza:
//! I file vengono distribuiti su task tokio limitati da un semaforo con
//! `workers` permessi (default 1 = sequenziale). I formati di uno stesso file
//! sono sempre convertiti in ordine. Il report mantiene l'ordine di listing.

use crate::config::Config;
use crate::converter::{ConversionResult, Converter};
use crate::file_manager::FileManager;
use crate::pipeline::path_resolver::PathResolver;
use crate::profile::{OutputFormat, ProfileKind, ProfileSet};
use crate::progress::{ConversionStats, ProgressManager};
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::info;

/// Results for one source file
#[derive(Debug, Clone)]
pub struct FileReport {
    pub source: PathBuf,
    pub profile: ProfileKind,
    pub original_size: u64,
    pub conversions: Vec<(OutputFormat, ConversionResult)>,
}

/// Results for one directory, files in listing order
#[derive(Debug, Clone, Default)]
pub struct DirectoryReport {
    pub dir: PathBuf,
    pub files: Vec<FileReport>,
    pub stats: ConversionStats,
}

impl DirectoryReport {
    /// Names of the files successfully written to staging
    pub fn staged_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .files
            .iter()
            .flat_map(|f| f.conversions.iter())
            .filter(|(_, result)| result.success)
            .map(|(_, result)| FileManager::file_name(&result.output_path))
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

/// Converts every eligible image of a directory into its staging area
pub struct DirectoryProcessor {
    converter: Converter,
    profiles: Arc<ProfileSet>,
    workers: usize,
    staging_dir_name: String,
    show_progress: bool,
}

impl DirectoryProcessor {
    pub fn new(config: &Config) -> Self {
        Self {
            converter: Converter::new(config),
            profiles: Arc::new(config.profiles.clone()),
            workers: config.workers.max(1),
            staging_dir_name: config.staging_dir_name.clone(),
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Process one directory; returns an empty report when nothing is eligible
    pub async fn process_directory(&self, dir: &Path) -> Result<DirectoryReport> {
        let images = FileManager::find_source_images(dir).await?;
        let mut report = DirectoryReport {
            dir: dir.to_path_buf(),
            ..Default::default()
        };

        if images.is_empty() {
            info!("📁 {}: no images to optimize", dir.display());
            return Ok(report);
        }

        info!("📁 {}: found {} image files", dir.display(), images.len());

        let staging = dir.join(&self.staging_dir_name);
        tokio::fs::create_dir_all(&staging).await?;

        let progress = if self.show_progress {
            ProgressManager::new(images.len() as u64)
        } else {
            ProgressManager::hidden()
        };

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = Vec::with_capacity(images.len());

        for source in images {
            // Waiting here bounds the number of in-flight files
            let permit = semaphore.clone().acquire_owned().await?;
            let converter = self.converter.clone();
            let profiles = Arc::clone(&self.profiles);
            let staging = staging.clone();
            let progress = progress.clone();

            tasks.push(tokio::spawn(async move {
                let _permit = permit;
                let file_report = Self::process_file(&converter, &profiles, &source, &staging).await;
                progress.update(&FileManager::file_name(&source));
                file_report
            }));
        }

        for joined in futures::future::join_all(tasks).await {
            let file_report = joined?;
            report.stats.files += 1;
            for (format, result) in &file_report.conversions {
                if result.success {
                    report.stats.add_success(*format, result.original_size, result.new_size);
                } else {
                    report.stats.add_failure();
                }
            }
            report.files.push(file_report);
        }

        progress.finish();
        Ok(report)
    }

    async fn process_file(
        converter: &Converter,
        profiles: &ProfileSet,
        source: &Path,
        staging: &Path,
    ) -> FileReport {
        let kind = ProfileSet::classify_kind(source);
        let profile = profiles.get(kind);
        let original_size = FileManager::file_size(source).await.unwrap_or(0);

        info!(
            "🖼️  Processing {} ({}) → {}px, quality {}% [{}]",
            FileManager::file_name(source),
            FileManager::format_size(original_size),
            profile.max_width,
            profile.quality,
            kind.name()
        );

        let mut conversions = Vec::with_capacity(profile.formats.len());
        for format in &profile.formats {
            let output = PathResolver::staged_output(staging, source, *format);
            let result = converter.convert(source, &output, profile).await;

            if result.success {
                let dims = result
                    .dimensions
                    .map(|(w, h)| format!(", {}x{}", w, h))
                    .unwrap_or_default();
                info!(
                    "   ✅ {}: {} ({:.1}% smaller{})",
                    format,
                    FileManager::format_size(result.new_size),
                    result.reduction_percent(),
                    dims
                );
            }
            conversions.push((*format, result));
        }

        FileReport {
            source: source.to_path_buf(),
            profile: kind,
            original_size,
            conversions,
        }
    }
}
