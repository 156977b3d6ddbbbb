//! cardsplit - split the PEPPOL Directory business-card export
//!
//! Downloads the export and partitions it into one XML file per country and
//! registration month under the extracts directory.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use cardsplit_core::{ProgressContext, SharedProgress};
use cardsplit_partition::ExistingFilePolicy;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use cmd::Settings;
use config::Config;

#[derive(Parser)]
#[command(name = "cardsplit")]
#[command(about = "Split the PEPPOL business-card export by country and month")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Temporary directory for the downloaded export
    #[arg(short = 'T', long, global = true)]
    tmp_dir: Option<PathBuf>,

    /// Log directory
    #[arg(short = 'L', long, global = true)]
    log_dir: Option<PathBuf>,

    /// Output directory for the partition files
    #[arg(short = 'E', long, global = true)]
    extracts_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Download the export again even if it exists
    #[arg(short, long, global = true)]
    force: bool,

    /// Keep temporary files after syncing
    #[arg(long, global = true)]
    keep_tmp: bool,

    /// Split this local file instead of downloading (.xml or .xml.gz)
    #[arg(long, global = true)]
    source: Option<PathBuf>,

    /// What to do with output files from an earlier run (truncate, append)
    #[arg(long, global = true)]
    existing: Option<ExistingFilePolicy>,

    /// Maximum number of output files open at once
    #[arg(long, global = true)]
    max_open_files: Option<usize>,

    /// Config file path (default: ./cardsplit.toml or ~/.config/cardsplit/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Read timeout in seconds for stall detection
    #[arg(long, global = true)]
    read_timeout: Option<u64>,

    /// Maximum retry attempts for transient download failures
    #[arg(long, global = true)]
    max_retries: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// Download the export if needed and split it
    Sync,
    /// Download the export only
    Download,
    /// Check directories and show the effective settings
    Check,
    /// Show the largest partition files
    Huge(cmd::huge::HugeArgs),
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration.
    fn settings(&self, config: Config) -> Settings {
        let tmp_dir = self.tmp_dir.clone().unwrap_or(config.paths.tmp_dir);
        let download_path = tmp_dir.join(&config.source.file_name);

        Settings {
            url: config.source.url,
            download_path,
            local_source: self.source.clone(),
            tmp_dir,
            log_dir: self.log_dir.clone().unwrap_or(config.paths.log_dir),
            force: self.force,
            keep_tmp: self.keep_tmp,
            partition: cardsplit_partition::Config {
                extracts_dir: self
                    .extracts_dir
                    .clone()
                    .unwrap_or(config.paths.extracts_dir),
                prefix: config.partition.prefix,
                record_tag: config.partition.record_tag,
                existing: self.existing.unwrap_or(config.partition.existing),
                max_open_files: self.max_open_files.or(config.partition.max_open_files),
                ..Default::default()
            },
            http: cardsplit_core::HttpConfig {
                read_timeout: Duration::from_secs(
                    self.read_timeout.unwrap_or(config.http.read_timeout),
                ),
                max_retries: self.max_retries.unwrap_or(config.http.max_retries),
            },
            config_file: config.loaded_from,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    };
    let config = match config {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e:#}");
            return ExitCode::from(1);
        }
    };
    let settings = cli.settings(config);

    // Progress context (TTY auto-detect); log lines go through it in TTY mode
    let progress = Arc::new(ProgressContext::new());
    let multi = if progress.is_tty() {
        Some(progress.multi())
    } else {
        None
    };
    let log_file = match cardsplit_core::open_log_file(&settings.log_dir) {
        Ok(f) => Some(f),
        Err(e) => {
            eprintln!("Cannot open log file in {}: {e}", settings.log_dir.display());
            None
        }
    };
    if let Err(e) = cardsplit_core::init_logging(false, cli.verbose, multi, log_file) {
        eprintln!("Logging already initialized: {e}");
    }

    match &settings.config_file {
        Some(path) => log::info!("Loaded config from {}", path.display()),
        None => log::debug!("No config file found, using defaults"),
    }
    cardsplit_core::set_http_config(settings.http);

    if let Err(e) = cardsplit_core::install_signal_handlers() {
        log::warn!("Cannot install signal handlers: {e}");
    }

    match run(cli.command, &settings, &progress) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e:#}");
            if cardsplit_core::is_shutdown_requested() {
                ExitCode::from(130)
            } else {
                ExitCode::from(1)
            }
        }
    }
}

fn run(command: Command, settings: &Settings, progress: &SharedProgress) -> Result<ExitCode> {
    match command {
        Command::Sync => cmd::sync::run(settings, progress),
        Command::Download => cmd::download::run(settings, progress).map(|()| ExitCode::SUCCESS),
        Command::Check => cmd::check::run(settings).map(|()| ExitCode::SUCCESS),
        Command::Huge(args) => {
            cmd::huge::run(args, &settings.partition.extracts_dir).map(|()| ExitCode::SUCCESS)
        }
    }
}
