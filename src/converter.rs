//! # Format Converter Module
//!
//! Produce un derivato ridimensionato e ricompresso per ogni coppia
//! (file sorgente, formato di destinazione) invocando un tool esterno.
//!
//! ## Dispatch per estensione di destinazione
//!
//! | Estensione     | Tool   | Argomenti                                                          |
//! |----------------|--------|--------------------------------------------------------------------|
//! | `.webp`        | cwebp  | `-q <quality> -m <effort> -resize <width> 0 <src> -o <dst>`        |
//! | `.jpg`/`.jpeg` | magick | `<src> -resize <width>x> -quality <quality> -interlace JPEG <dst>` |
//! | `.png`         | magick | `<src> -resize <width>x> -quality <quality> <dst>`                 |
//!
//! `<width>x>` è il qualificatore "only-shrink" di ImageMagick: le immagini
//! più piccole di `max_width` non vengono mai ingrandite. cwebp invece
//! ridimensiona sempre alla larghezza indicata (altezza 0 = proporzionale).
//!
//! ## Error handling
//!
//! Un fallimento (spawn, exit code non zero, output mancante) non è mai
//! fatale: `convert` restituisce un `ConversionResult` con `success = false`
//! e il chiamante passa al formato/file successivo.

use crate::config::{Config, ToolPaths};
use crate::error::PipelineError;
use crate::file_manager::FileManager;
use crate::profile::{ImageProfile, OutputFormat};
use crate::args;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// A fully resolved external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Outcome of one (file, format) conversion. Printed, never persisted.
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub success: bool,
    pub output_path: PathBuf,
    pub original_size: u64,
    pub new_size: u64,
    /// Pixel size of the output when its header could be read
    pub dimensions: Option<(u32, u32)>,
    pub error: Option<String>,
}

impl ConversionResult {
    fn failed(output_path: &Path, original_size: u64, error: String) -> Self {
        Self {
            success: false,
            output_path: output_path.to_path_buf(),
            original_size,
            new_size: 0,
            dimensions: None,
            error: Some(error),
        }
    }

    pub fn reduction_percent(&self) -> f64 {
        FileManager::calculate_reduction(self.original_size, self.new_size)
    }
}

/// Invokes cwebp / magick for each requested output
#[derive(Debug, Clone)]
pub struct Converter {
    tools: ToolPaths,
    webp_effort: u8,
}

impl Converter {
    pub fn new(config: &Config) -> Self {
        Self {
            tools: config.tools.clone(),
            webp_effort: config.webp_effort,
        }
    }

    /// Build the command for converting `input` into `output` with `profile`.
    pub fn build_invocation(
        &self,
        input: &Path,
        output: &Path,
        profile: &ImageProfile,
    ) -> Result<ToolInvocation, PipelineError> {
        let format = OutputFormat::from_path(output).ok_or_else(|| PipelineError::Conversion {
            path: output.to_path_buf(),
            reason: "unsupported destination extension".to_string(),
        })?;

        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        let shrink_only = format!("{}x>", profile.max_width);

        let invocation = match format {
            OutputFormat::Webp => ToolInvocation {
                program: self.tools.cwebp.clone(),
                args: args![
                    "-q", profile.quality,
                    "-m", self.webp_effort,
                    "-resize", profile.max_width, 0,
                    input,
                    "-o", output,
                ],
            },
            OutputFormat::Jpg => ToolInvocation {
                program: self.tools.magick.clone(),
                args: args![
                    input,
                    "-resize", shrink_only,
                    "-quality", profile.quality,
                    "-interlace", "JPEG",
                    output,
                ],
            },
            OutputFormat::Png => ToolInvocation {
                program: self.tools.magick.clone(),
                args: args![
                    input,
                    "-resize", shrink_only,
                    "-quality", profile.quality,
                    output,
                ],
            },
        };

        Ok(invocation)
    }

    /// Convert one file into one format. Never returns an error: failures
    /// are reported through `ConversionResult::success`.
    pub async fn convert(&self, input: &Path, output: &Path, profile: &ImageProfile) -> ConversionResult {
        let original_size = FileManager::file_size(input).await.unwrap_or(0);

        let invocation = match self.build_invocation(input, output, profile) {
            Ok(invocation) => invocation,
            Err(e) => {
                warn!("❌ {}", e);
                return ConversionResult::failed(output, original_size, e.to_string());
            }
        };

        debug!("Running {:?} {:?}", invocation.program, invocation.args);
        let start_time = std::time::Instant::now();
        let run = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .output()
            .await;
        let elapsed = start_time.elapsed();

        let reason = match run {
            Ok(out) if out.status.success() => None,
            Ok(out) => Some(format!(
                "{} exited with {}: {}",
                invocation.program.display(),
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )),
            Err(e) => Some(format!("failed to run {}: {}", invocation.program.display(), e)),
        };

        if let Some(reason) = reason {
            warn!("❌ Optimization failed for {} after {:?}: {}", input.display(), elapsed, reason);
            return ConversionResult::failed(output, original_size, reason);
        }

        let new_size = match FileManager::file_size(output).await {
            Ok(size) => size,
            Err(_) => {
                let reason = format!("{} reported success but wrote no output", invocation.program.display());
                warn!("❌ {}", reason);
                return ConversionResult::failed(output, original_size, reason);
            }
        };

        debug!("Converted {} -> {} in {:?}", input.display(), output.display(), elapsed);

        ConversionResult {
            success: true,
            output_path: output.to_path_buf(),
            original_size,
            new_size,
            dimensions: image::image_dimensions(output).ok(),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn converter() -> Converter {
        Converter::new(&Config::default())
    }

    #[test]
    fn test_webp_invocation() {
        let inv = converter()
            .build_invocation(Path::new("in.png"), Path::new("out/in.webp"), &ImageProfile::portfolio())
            .unwrap();
        assert_eq!(inv.program, PathBuf::from("cwebp"));
        assert_eq!(
            inv.args,
            vec!["-q", "85", "-m", "6", "-resize", "1200", "0", "in.png", "-o", "out/in.webp"]
        );
    }

    #[test]
    fn test_jpeg_invocation_is_progressive_and_shrink_only() {
        let inv = converter()
            .build_invocation(Path::new("cover.png"), Path::new("cover.JPEG"), &ImageProfile::video())
            .unwrap();
        assert_eq!(inv.program, PathBuf::from("magick"));
        assert_eq!(
            inv.args,
            vec!["cover.png", "-resize", "600x>", "-quality", "80", "-interlace", "JPEG", "cover.JPEG"]
        );
    }

    #[test]
    fn test_png_invocation() {
        let inv = converter()
            .build_invocation(Path::new("icon.png"), Path::new("icon.png.out.png"), &ImageProfile::small())
            .unwrap();
        assert_eq!(
            inv.args,
            vec!["icon.png", "-resize", "300x>", "-quality", "90", "icon.png.out.png"]
        );
    }

    #[test]
    fn test_unknown_destination_is_rejected() {
        let err = converter()
            .build_invocation(Path::new("a.png"), Path::new("a.gif"), &ImageProfile::small())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Conversion { .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_soft_failure() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("a.png");
        tokio::fs::write(&input, b"png bytes").await.unwrap();

        let mut config = Config::default();
        config.tools.cwebp = PathBuf::from("no-such-cwebp-binary");
        let result = Converter::new(&config)
            .convert(&input, &temp.path().join("a.webp"), &ImageProfile::small())
            .await;

        assert!(!result.success);
        assert_eq!(result.original_size, 9);
        assert!(result.error.is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_tool_reports_sizes() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        // Fake cwebp: writes 4 bytes to the path following -o
        let script = temp.path().join("fake-cwebp");
        std::fs::write(
            &script,
            "#!/bin/sh\nwhile [ \"$#\" -gt 0 ]; do if [ \"$1\" = \"-o\" ]; then printf 'tiny' > \"$2\"; fi; shift; done\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let input = temp.path().join("page-1.png");
        tokio::fs::write(&input, vec![7u8; 16]).await.unwrap();

        let mut config = Config::default();
        config.tools.cwebp = script;
        let result = Converter::new(&config)
            .convert(&input, &temp.path().join("page-1.webp"), &ImageProfile::portfolio())
            .await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.original_size, 16);
        assert_eq!(result.new_size, 4);
        assert_eq!(result.reduction_percent(), 75.0);
        assert_eq!(result.dimensions, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_a_soft_failure() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("a.png");
        tokio::fs::write(&input, b"x").await.unwrap();

        let mut config = Config::default();
        config.tools.magick = PathBuf::from("false");
        let result = Converter::new(&config)
            .convert(&input, &temp.path().join("a.jpg"), &ImageProfile::portfolio())
            .await;

        assert!(!result.success);
    }
}
