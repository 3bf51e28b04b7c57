//! # File Management Module
//!
//! Questo modulo gestisce le operazioni sui file delle directory gestite.
//!
//! ## Responsabilità:
//! - Discovery non ricorsiva delle immagini in una directory
//! - Filtro dei file "eleggibili" per estensione (case-insensitive)
//! - Copia di file e calcolo digest SHA-256 per i backup
//! - Utilità per dimensioni e percentuali di riduzione
//!
//! ## Formati eleggibili:
//! - **Sorgenti**: JPG, JPEG, PNG
//! - **Output in staging**: JPG, JPEG, PNG, WebP
//!
//! ## Ordine di listing:
//! I file sono restituiti ordinati per nome, così l'ordine di elaborazione
//! è stabile tra piattaforme.

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncReadExt;

const SOURCE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
const STAGED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Check if a file is a source image candidate for optimization
    pub fn is_source_image(path: &Path) -> bool {
        Self::has_extension(path, SOURCE_EXTENSIONS)
    }

    /// Check if a file is something optimize may have produced
    pub fn is_staged_output(path: &Path) -> bool {
        Self::has_extension(path, STAGED_EXTENSIONS)
    }

    fn has_extension(path: &Path, allowed: &[&str]) -> bool {
        if let Some(ext) = path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            allowed.contains(&ext_lower.as_str())
        } else {
            false
        }
    }

    /// Regular files directly inside `dir`, sorted by name
    pub async fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }

        files.sort();
        Ok(files)
    }

    /// Eligible source images directly inside `dir`, sorted by name
    pub async fn find_source_images(dir: &Path) -> Result<Vec<PathBuf>> {
        let files = Self::list_files(dir).await?;
        Ok(files.into_iter().filter(|p| Self::is_source_image(p)).collect())
    }

    /// Size of a file in bytes
    pub async fn file_size(path: &Path) -> Result<u64> {
        Ok(fs::metadata(path).await?.len())
    }

    /// Copy `from` over `to`, creating parent directories as needed
    pub async fn copy_file(from: &Path, to: &Path) -> Result<u64> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).await?;
        }
        let copied = fs::copy(from, to).await.map_err(|e| {
            anyhow::anyhow!("Failed to copy {} -> {}: {}", from.display(), to.display(), e)
        })?;
        Ok(copied)
    }

    /// Hex encoded SHA-256 of a file's content
    pub async fn sha256_file(path: &Path) -> Result<String> {
        let mut file = fs::File::open(path).await?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; 64 * 1024];

        loop {
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(hex::encode(hasher.finalize()))
    }

    /// File name as an owned string (lossy)
    pub fn file_name(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Calculate percentage reduction (negative when the file grew)
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}
