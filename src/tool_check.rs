//! # Tool Availability Check
//!
//! Probes the external binaries the converter shells out to (`magick` and
//! `cwebp`) by running their version query. A failed probe is fatal: the
//! caller aborts before touching any directory.

use crate::config::ToolPaths;
use crate::error::PipelineError;
use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// One external tool to probe
#[derive(Debug, Clone)]
pub struct ToolProbe {
    /// Display name (also used for installation hints)
    pub name: &'static str,
    /// Binary to execute
    pub program: PathBuf,
    /// Version query flag
    pub version_arg: &'static str,
}

/// Verifies required tools before processing
pub struct ToolChecker {
    probes: Vec<ToolProbe>,
}

impl ToolChecker {
    pub fn new(tools: &ToolPaths) -> Self {
        Self {
            probes: vec![
                ToolProbe {
                    name: "magick",
                    program: tools.magick.clone(),
                    version_arg: "-version",
                },
                ToolProbe {
                    name: "cwebp",
                    program: tools.cwebp.clone(),
                    version_arg: "-version",
                },
            ],
        }
    }

    /// Check every tool in order, failing on the first missing one
    pub async fn verify(&self) -> Result<(), PipelineError> {
        for probe in &self.probes {
            if Self::probe(probe).await {
                info!("✅ {} is installed", probe.name);
            } else {
                return Err(PipelineError::MissingTool {
                    tool: probe.name.to_string(),
                    hint: Self::install_hint(probe.name),
                });
            }
        }
        Ok(())
    }

    /// Run the version query; any spawn error or non-zero exit counts as missing
    pub async fn probe(probe: &ToolProbe) -> bool {
        if let Some(resolved) = find_in_system_path(&probe.program) {
            debug!("{} resolved to {:?}", probe.name, resolved);
        }

        let result = Command::new(&probe.program)
            .arg(probe.version_arg)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match result {
            Ok(status) => status.success(),
            Err(e) => {
                debug!("Probe for {} failed: {}", probe.name, e);
                false
            }
        }
    }

    /// Get installation instructions for a tool on the current platform
    pub fn install_hint(tool_name: &str) -> String {
        let package = match tool_name {
            "magick" => "imagemagick",
            "cwebp" => "webp",
            other => other,
        };

        if cfg!(target_os = "macos") {
            format!("brew install {}", package)
        } else if cfg!(target_os = "linux") {
            format!("sudo apt-get install {}", package)
        } else if cfg!(windows) {
            format!("winget install {}", package)
        } else {
            format!("install the '{}' package", package)
        }
    }
}

/// Find tool in system PATH (absolute or relative paths are returned as is)
fn find_in_system_path(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 {
        return Some(program.to_path_buf());
    }

    let extension = if cfg!(windows) { ".exe" } else { "" };
    let tool_with_ext = format!("{}{}", program.to_string_lossy(), extension);

    env::split_paths(&env::var_os("PATH")?)
        .map(|dir| dir.join(&tool_with_ext))
        .find(|path| path.exists())
}
