//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom della pipeline.
//!
//! ## Responsabilità:
//! - Definisce `PipelineError` enum per categorizzare gli errori possibili
//! - Fornisce messaggi di errore descrittivi e strutturati
//! - Integra con `thiserror` per automatic error conversion
//!
//! ## Categorie di errori:
//! - `Io`: Errori di I/O (file non trovati, permessi, etc.)
//! - `MissingTool`: Tool esterno mancante (magick, cwebp), con hint di installazione
//! - `Conversion`: Invocazione di un tool fallita
//! - `Manifest`: File di stato illeggibile o non scrivibile
//! - `InvalidState`: Operazione non permessa nello stato corrente della directory
//! - `Locked`: Un'altra invocazione sta lavorando sulla stessa directory
//! - `Validation`: Errori di validazione configurazione
//!
//! ## Esempio:
//! ```rust,ignore
//! if !probe_ok {
//!     return Err(PipelineError::MissingTool {
//!         tool: "cwebp".to_string(),
//!         hint: "brew install webp".to_string(),
//!     });
//! }
//! ```

use crate::manifest::DirectoryState;
use std::path::PathBuf;

/// Custom error types for the image pipeline
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Required tool '{tool}' is not available. Install it with: {hint}")]
    MissingTool { tool: String, hint: String },

    #[error("Conversion failed for {path}: {reason}")]
    Conversion { path: PathBuf, reason: String },

    #[error("State manifest error: {0}")]
    Manifest(String),

    #[error("Cannot {operation} {dir}: directory is in state {state}")]
    InvalidState {
        dir: PathBuf,
        state: DirectoryState,
        operation: &'static str,
    },

    #[error("Directory {0} is locked by another run (remove the lock file if no run is active)")]
    Locked(PathBuf),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Manifest(err.to_string())
    }
}
