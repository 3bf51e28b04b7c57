//! # Portfolio Image Pipeline - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing dei sottocomandi con `clap`
//! - Inizializzazione del logging con `tracing` (`RUST_LOG` o `--verbose`)
//! - Caricamento della configurazione e override da CLI
//! - Traduzione dell'esito in exit code
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI
//! 2. Configura il logging (INFO o DEBUG a seconda del flag verbose)
//! 3. Carica `Config` (--config, ./image-pipeline.json, config dir utente, default)
//! 4. Applica gli override `--root` / `--workers` e valida
//! 5. Esegue il sottocomando sulla `Pipeline`
//!
//! ## Esempio di utilizzo:
//! ```bash
//! image-pipeline optimize --workers 4
//! image-pipeline apply
//! image-pipeline restore
//! ```
//!
//! Exit code 1 quando manca un tool, la configurazione non è valida o una
//! directory è fallita. Le singole conversioni fallite non cambiano l'exit code.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use portfolio_image_pipeline::pipeline::DirectoryFailure;
use portfolio_image_pipeline::{Config, DirectoryState, Pipeline, PipelineError};

#[derive(Parser)]
#[command(name = "image-pipeline")]
#[command(about = "Optimize, back up, apply and restore the site's portfolio images")]
struct Cli {
    /// Configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Images root containing the managed directories
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Number of files converted in parallel inside a directory
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert every eligible image into the directory's staging area
    Optimize {
        /// Optimize directories that were already applied
        #[arg(long)]
        force: bool,
    },
    /// Copy the original images into the backup mirror
    Backup,
    /// Promote staged images over the live ones
    Apply,
    /// Copy the backups back over the live directories
    Restore,
    /// Show the state of every managed directory
    Status,
    /// Point site sources at the WebP versions of the images
    Refs {
        /// Report the rewrites without touching any file
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            match e.downcast_ref::<PipelineError>() {
                Some(PipelineError::MissingTool { tool, hint }) => {
                    error!("❌ {} is not installed", tool);
                    info!("💡 Install it with: {}", hint);
                }
                _ => error!("❌ {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Run the selected command; `Ok(false)` when some directory failed
async fn run(cli: Cli) -> Result<bool> {
    let mut config = Config::load(cli.config.as_deref()).await?;
    if let Some(root) = cli.root {
        config.images_root = root;
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }

    let pipeline = Pipeline::new(config)?.with_progress(!cli.verbose);

    let failed = match cli.command {
        Command::Optimize { force } => {
            info!("🚀 Starting image optimization...");
            pipeline.optimize(force).await?.failed
        }
        Command::Backup => {
            info!("💾 Backing up original images...");
            pipeline.backup().await?.failed
        }
        Command::Apply => {
            info!("🔄 Applying optimized images...");
            pipeline.apply().await?.failed
        }
        Command::Restore => {
            info!("🔄 Restoring original images...");
            pipeline.restore().await?.failed
        }
        Command::Status => {
            print_status(&pipeline).await?;
            Vec::new()
        }
        Command::Refs { dry_run } => {
            pipeline.refs(dry_run).await?;
            Vec::new()
        }
    };

    report_failures(&failed);
    Ok(failed.is_empty())
}

async fn print_status(pipeline: &Pipeline) -> Result<()> {
    info!("📊 Images root: {}", pipeline.config().images_root.display());

    for status in pipeline.status().await? {
        if !status.exists {
            info!("   ⚪ {}: missing", status.dir.display());
            continue;
        }

        let icon = match status.state {
            DirectoryState::Original => "🟢",
            DirectoryState::Staged => "🟡",
            DirectoryState::Applied => "🔵",
        };
        info!(
            "   {} {}: {} ({} staged, {} backed up)",
            icon,
            status.dir.display(),
            status.state,
            status.staged_files,
            status.backup_files
        );
    }

    Ok(())
}

fn report_failures(failed: &[DirectoryFailure]) {
    if failed.is_empty() {
        return;
    }

    error!("❌ {} directories failed:", failed.len());
    for failure in failed {
        error!("   - {}: {}", failure.dir.display(), failure.error);
    }
}
