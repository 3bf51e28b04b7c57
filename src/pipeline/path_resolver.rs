//! # Path Resolution Module
//!
//! Centralizza il calcolo di tutti i path derivati da una directory gestita:
//! directory live, staging, backup mirror, manifest di stato e URL pubblici.

use crate::config::Config;
use crate::profile::OutputFormat;
use std::path::{Component, Path, PathBuf};

/// Utility per calcolare i path in modo centralizzato
pub struct PathResolver;

impl PathResolver {
    /// Directory servita dal sito
    pub fn live_dir(config: &Config, rel: &Path) -> PathBuf {
        config.images_root.join(rel)
    }

    /// `<dir>/optimized/`
    pub fn staging_dir(config: &Config, rel: &Path) -> PathBuf {
        Self::live_dir(config, rel).join(&config.staging_dir_name)
    }

    /// `<images_root>/backup/`
    pub fn backup_root(config: &Config) -> PathBuf {
        config.images_root.join(&config.backup_dir_name)
    }

    /// `<images_root>/backup/<rel>/`
    pub fn backup_dir(config: &Config, rel: &Path) -> PathBuf {
        Self::backup_root(config).join(rel)
    }

    /// `<images_root>/.image-pipeline/<rel>/`
    pub fn state_dir(config: &Config, rel: &Path) -> PathBuf {
        config.images_root.join(&config.state_dir_name).join(rel)
    }

    /// Output path for `source` converted to `format` inside `staging`
    pub fn staged_output(staging: &Path, source: &Path, format: OutputFormat) -> PathBuf {
        let stem = source.file_stem().unwrap_or_default().to_string_lossy();
        staging.join(format!("{}.{}", stem, format.extension()))
    }

    /// Public URL prefix of a managed directory, e.g. `/assets/images/ai-portfolio`.
    /// `None` when the images root is not inside the public root.
    pub fn url_prefix(config: &Config, rel: &Path) -> Option<String> {
        let under_public = config.images_root.strip_prefix(&config.public_root).ok()?;
        let segments: Vec<String> = under_public
            .join(rel)
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().to_string()),
                _ => None,
            })
            .collect();
        Some(format!("/{}", segments.join("/")))
    }
}
