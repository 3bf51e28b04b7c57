//! # Portfolio Image Pipeline Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per i test di integrazione
//!
//! ## Architettura dei moduli:
//! - `config`: Configurazione esplicita (directory, profili, policy)
//! - `error`: Tipi di errore custom
//! - `tool_check`: Verifica della presenza di `magick` e `cwebp`
//! - `profile`: Classificazione delle immagini in profili di qualità
//! - `converter`: Invocazione dei tool esterni per un singolo output
//! - `manifest`: Stato esplicito di ogni directory e lock
//! - `file_manager`: Operazioni sui file e discovery immagini
//! - `pipeline`: Optimize / backup / apply / restore / status su tutte le directory
//! - `references`: Aggiornamento degli URL nei sorgenti del sito
//! - `progress`: Progress bar e statistiche
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use portfolio_image_pipeline::{Config, Pipeline};
//!
//! let pipeline = Pipeline::new(Config::default())?;
//! pipeline.optimize(false).await?;
//! pipeline.apply().await?;
//! ```

pub mod config;
pub mod converter;
pub mod error;
pub mod file_manager;
pub mod manifest;
pub mod pipeline;
pub mod profile;
pub mod progress;
pub mod references;
pub mod tool_check;
pub mod utils;

pub use config::{ApplyFailurePolicy, BackupPolicy, Config};
pub use error::PipelineError;
pub use manifest::DirectoryState;
pub use pipeline::{DirectoryStatus, Pipeline};
pub use profile::{ImageProfile, OutputFormat, ProfileKind, ProfileSet};
pub use references::ReferenceUpdater;
