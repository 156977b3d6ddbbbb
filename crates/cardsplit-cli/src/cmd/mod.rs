//! Subcommands and the settings they share

pub mod check;
pub mod download;
pub mod huge;
pub mod sync;

use std::path::PathBuf;

use anyhow::{Context, Result};
use cardsplit_core::{Download, HttpConfig, SharedProgress};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

/// Effective settings: config file values with command-line overrides applied
#[derive(Debug, Clone)]
pub struct Settings {
    pub url: String,
    /// Where the export is downloaded to (`<tmp_dir>/<file_name>`)
    pub download_path: PathBuf,
    /// Local export given with `--source` (skips the download)
    pub local_source: Option<PathBuf>,
    pub tmp_dir: PathBuf,
    pub log_dir: PathBuf,
    pub force: bool,
    pub keep_tmp: bool,
    pub partition: cardsplit_partition::Config,
    pub http: HttpConfig,
    pub config_file: Option<PathBuf>,
}

/// Download the export unless it is already present (or `--force`).
pub fn fetch_source(settings: &Settings, progress: &SharedProgress) -> Result<Download> {
    let pb = progress.bytes_bar("download");
    let result = cardsplit_core::download(&settings.url, &settings.download_path, settings.force, &pb);
    pb.finish_and_clear();
    result.with_context(|| format!("Download failed: {}", settings.url))
}

pub fn print_summary(title: &str, rows: &[(&str, String)]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new(title).fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    eprintln!("\n{table}");
}
