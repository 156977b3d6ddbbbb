//! Sync subcommand - download if needed, split, report

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use cardsplit_core::SharedProgress;
use cardsplit_partition::SplitError;

use super::{Settings, fetch_source};

pub fn run(settings: &Settings, progress: &SharedProgress) -> Result<ExitCode> {
    let source = match &settings.local_source {
        Some(path) => path.clone(),
        None => fetch_source(settings, progress)?.path,
    };

    let stage = progress.stage_line("split");
    stage.set_message(source.display().to_string());
    let result = cardsplit_partition::run(&source, &settings.partition, progress);
    stage.finish_and_clear();

    let (summary, error) = match result {
        Ok(summary) => (summary, None),
        Err(failure) => (failure.summary, Some(failure.error)),
    };
    summary.log();
    eprintln!("\n{}", summary.format_table());

    let downloaded = settings.local_source.is_none();
    if should_clean(downloaded, settings.keep_tmp, error.as_ref()) {
        cleanup_tmp(&settings.tmp_dir);
    } else if downloaded && error.is_some() {
        log::info!("Keeping {} for the next run", settings.download_path.display());
    }

    match error {
        None => {
            log::info!("Sync complete: {}", settings.partition.extracts_dir.display());
            Ok(ExitCode::SUCCESS)
        }
        Some(e) => {
            log::error!("Sync failed: {e}");
            Ok(ExitCode::from(e.exit_code()))
        }
    }
}

/// Temporary files go only after a downloaded export was split completely.
fn should_clean(downloaded: bool, keep_tmp: bool, error: Option<&SplitError>) -> bool {
    downloaded && !keep_tmp && error.is_none()
}

/// Remove regular files directly inside `tmp_dir`. Failures only warn.
fn cleanup_tmp(tmp_dir: &Path) {
    let entries = match std::fs::read_dir(tmp_dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Could not clean up {}: {e}", tmp_dir.display());
            return;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => log::warn!("Could not remove {}: {e}", path.display()),
        }
    }
    if removed > 0 {
        log::info!("Cleaned up {removed} temporary file(s) from {}", tmp_dir.display());
    }
}
