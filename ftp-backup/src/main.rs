//! ftp-backup - command line entry point
//!
//! Archives the content directory, ships it to the configured FTP/SFTP
//! server and applies retention. The process exit code mirrors the outcome.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ftp_backup::executor::{BackupOutcome, RunOptions};
use ftp_backup::utils::format::format_timestamp;
use ftp_backup::{utils, BackupOrchestrator, Config};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create, upload and prune in one go
    Run,

    /// Create a backup, optionally without uploading it
    Create {
        #[arg(long)]
        no_upload: bool,
    },

    /// List local backups, newest first
    List,

    /// Apply retention without creating a new backup
    Prune,

    /// Show archives stored on the remote server
    RemoteStats,

    /// Print a configuration file with default values
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Command::InitConfig = args.command {
        print!("{}", Config::default().to_toml()?);
        return Ok(());
    }

    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::debug!("Starting ftp-backup v{}", env!("CARGO_PKG_VERSION"));

    let orchestrator = Arc::new(BackupOrchestrator::new(config));

    match args.command {
        Command::Run => finish(run(orchestrator, RunOptions::default()).await?),
        Command::Create { no_upload } => {
            finish(run(orchestrator, RunOptions { upload: !no_upload }).await?)
        }
        Command::Prune => {
            let outcome = tokio::task::spawn_blocking(move || orchestrator.prune()).await?;
            finish(outcome)
        }
        Command::List => {
            let store = orchestrator.store();
            let archives = store.list()?;
            if archives.is_empty() {
                println!("No backups in {}", store.dir().display());
            }
            for archive in &archives {
                println!(
                    "{:<40} {:>12} {}",
                    archive.name,
                    utils::format::format_size(archive.size_bytes),
                    format_timestamp(archive.mtime)
                );
            }
            let stats = store.stats()?;
            println!("{} backups, {}", stats.count, stats.total_size_formatted);
            Ok(())
        }
        Command::RemoteStats => {
            let stats = tokio::task::spawn_blocking(move || orchestrator.remote_stats()).await??;
            for file in &stats.files {
                println!(
                    "{:<40} {:>12} {}",
                    file.filename, file.size_formatted, file.modified_formatted
                );
            }
            println!(
                "{} remote backups, {} (latest: {})",
                stats.count, stats.total_size_formatted, stats.latest_modified
            );
            Ok(())
        }
        Command::InitConfig => Ok(()),
    }
}

async fn run(orchestrator: Arc<BackupOrchestrator>, options: RunOptions) -> Result<BackupOutcome> {
    Ok(tokio::task::spawn_blocking(move || orchestrator.run(options)).await?)
}

fn finish(outcome: BackupOutcome) -> Result<()> {
    if outcome.success {
        println!("{}", outcome.message);
    } else {
        eprintln!("{}", outcome.message);
    }
    std::process::exit(outcome.exit_code);
}
