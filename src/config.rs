//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione della pipeline.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con directory gestite, profili e policy
//! - Fornisce validazione robusta dei parametri
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default identici al layout del sito
//!
//! ## Parametri di configurazione:
//! - `images_root`: Radice delle immagini (default: `public/assets/images`)
//! - `public_root`: Radice servita come `/` dal sito (default: `public`)
//! - `managed_dirs`: Directory gestite, relative a `images_root`
//! - `staging_dir_name`: Sottodirectory di staging (default: `optimized`)
//! - `backup_dir_name`: Radice dei backup sotto `images_root` (default: `backup`)
//! - `state_dir_name`: Radice dei manifest di stato (default: `.image-pipeline`)
//! - `tools`: Path dei binari `magick` e `cwebp`
//! - `webp_effort`: Parametro `-m` di cwebp (0-6, default: 6)
//! - `profiles`: Preset portfolio / video / small
//! - `workers`: Conversioni parallele per directory (default: 1 = sequenziale)
//! - `backup_before_apply`: Backup automatico prima di apply (default: true)
//! - `backup_policy`: `copy_if_absent` (default) oppure `overwrite`
//! - `apply_failure_policy`: `abort_directory` (default) oppure `abort_run`
//! - `reference_sources`: File/directory del sito da aggiornare con `refs`
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     images_root: PathBuf::from("/tmp/site/images"),
//!     workers: 4,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use crate::error::PipelineError;
use crate::profile::{ImageProfile, ProfileSet};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// File name looked up in the working directory when `--config` is not given
pub const LOCAL_CONFIG_FILE: &str = "image-pipeline.json";

/// External binaries used by the converter and the tool check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPaths {
    /// ImageMagick 7 entry point
    pub magick: PathBuf,
    /// WebP encoder
    pub cwebp: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            magick: PathBuf::from("magick"),
            cwebp: PathBuf::from("cwebp"),
        }
    }
}

/// What backup does when the mirror already holds a file of the same name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupPolicy {
    /// First backup wins; existing mirror files are never replaced
    #[default]
    CopyIfAbsent,
    /// Always copy the current live file (refused once a directory is applied)
    Overwrite,
}

/// How far a failed copy during apply propagates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyFailurePolicy {
    /// Stop the failing directory, keep its staging dir, move on to the next one
    #[default]
    AbortDirectory,
    /// Stop the whole run at the first failure
    AbortRun,
}

/// Configuration for the image pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root containing every managed directory and the backup mirror
    pub images_root: PathBuf,
    /// Directory served as `/` by the site, used to build asset URLs
    pub public_root: PathBuf,
    /// Managed directories, relative to `images_root`
    pub managed_dirs: Vec<PathBuf>,
    /// Staging subdirectory created inside each managed directory
    pub staging_dir_name: String,
    /// Backup mirror root, relative to `images_root`
    pub backup_dir_name: String,
    /// State manifests root, relative to `images_root`
    pub state_dir_name: String,
    /// External tool locations
    pub tools: ToolPaths,
    /// cwebp compression effort (0-6)
    pub webp_effort: u8,
    /// Quality/size presets
    pub profiles: ProfileSet,
    /// Number of files converted concurrently inside one directory
    pub workers: usize,
    /// Take a backup of each directory right before applying it
    pub backup_before_apply: bool,
    /// Behaviour of backup on files already present in the mirror
    pub backup_policy: BackupPolicy,
    /// Behaviour of apply when a copy fails
    pub apply_failure_policy: ApplyFailurePolicy,
    /// Site source files (or directories) whose image URLs `refs` rewrites
    pub reference_sources: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            images_root: PathBuf::from("public/assets/images"),
            public_root: PathBuf::from("public"),
            managed_dirs: vec![
                PathBuf::from("planning-portfolio"),
                PathBuf::from("ai-portfolio"),
                PathBuf::from("product-planning"),
                PathBuf::from("video-planning"),
            ],
            staging_dir_name: "optimized".to_string(),
            backup_dir_name: "backup".to_string(),
            state_dir_name: ".image-pipeline".to_string(),
            tools: ToolPaths::default(),
            webp_effort: 6,
            profiles: ProfileSet::default(),
            workers: 1,
            backup_before_apply: true,
            backup_policy: BackupPolicy::default(),
            apply_failure_policy: ApplyFailurePolicy::default(),
            reference_sources: vec![
                PathBuf::from("src/app/page.tsx"),
                PathBuf::from("src/app/planning-portfolio/page.tsx"),
                PathBuf::from("src/app/ai-portfolio/page.tsx"),
                PathBuf::from("src/app/product-planning/page.tsx"),
            ],
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.workers == 0 {
            return Err(invalid("Number of workers must be greater than 0"));
        }

        if self.webp_effort > 6 {
            return Err(invalid("WebP effort must be between 0 and 6"));
        }

        for (kind, profile) in self.profiles.iter() {
            validate_profile(kind.name(), profile)?;
        }

        for name in [&self.staging_dir_name, &self.backup_dir_name, &self.state_dir_name] {
            if !is_single_component(Path::new(name.as_str())) {
                return Err(invalid(format!(
                    "'{}' must be a single directory name",
                    name
                )));
            }
        }

        if self.backup_dir_name == self.state_dir_name {
            return Err(invalid("Backup and state directories must differ"));
        }

        let mut seen = HashSet::new();
        for dir in &self.managed_dirs {
            if dir.as_os_str().is_empty() || dir.is_absolute() {
                return Err(invalid(format!(
                    "Managed directory must be a non-empty path relative to images_root: {}",
                    dir.display()
                )));
            }
            if dir.components().any(|c| !matches!(c, Component::Normal(_))) {
                return Err(invalid(format!(
                    "Managed directory may not contain '.', '..' or prefixes: {}",
                    dir.display()
                )));
            }
            if dir.starts_with(&self.backup_dir_name) || dir.starts_with(&self.state_dir_name) {
                return Err(invalid(format!(
                    "Managed directory overlaps the backup or state root: {}",
                    dir.display()
                )));
            }
            // Distinct relative paths give distinct backup mirrors
            if !seen.insert(dir.clone()) {
                return Err(invalid(format!(
                    "Managed directory listed twice: {}",
                    dir.display()
                )));
            }
        }

        Ok(())
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Resolve the configuration: explicit path, then `./image-pipeline.json`,
    /// then the user config dir, then defaults.
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(anyhow::anyhow!("Config file does not exist: {}", path.display()));
            }
            debug!("Loading configuration from {}", path.display());
            return Self::from_file(path).await;
        }

        let mut candidates = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("image-pipeline").join("config.json"));
        }

        for candidate in candidates {
            if candidate.exists() {
                debug!("Loading configuration from {}", candidate.display());
                return Self::from_file(&candidate).await;
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }
}

fn validate_profile(name: &str, profile: &ImageProfile) -> Result<(), PipelineError> {
    if profile.quality == 0 || profile.quality > 100 {
        return Err(invalid(format!("{} profile quality must be between 1 and 100", name)));
    }
    if profile.max_width == 0 {
        return Err(invalid(format!("{} profile max_width must be greater than 0", name)));
    }
    if profile.formats.is_empty() {
        return Err(invalid(format!("{} profile must list at least one format", name)));
    }
    Ok(())
}

fn is_single_component(path: &Path) -> bool {
    let mut components = path.components();
    matches!(components.next(), Some(Component::Normal(_))) && components.next().is_none()
}

fn invalid(msg: impl Into<String>) -> PipelineError {
    PipelineError::Validation(msg.into())
}
