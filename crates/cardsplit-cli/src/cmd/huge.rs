//! Huge subcommand - list the largest partition files

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cardsplit_core::fmt_mb;
use clap::Args;
use comfy_table::{Cell, CellAlignment, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

#[derive(Args, Debug)]
pub struct HugeArgs {
    /// Number of files to show
    #[arg(short, long, default_value_t = 10)]
    pub number: usize,
}

/// The `n` largest `*.xml` files below `dir`, biggest first.
pub fn largest_files(dir: &Path, n: usize) -> Result<Vec<(PathBuf, u64)>> {
    let base = glob::Pattern::escape(&dir.to_string_lossy());
    let pattern = format!("{base}/**/*.xml");

    let mut files = Vec::new();
    for entry in glob::glob(&pattern).context("Invalid extracts path")? {
        let path = entry.context("Failed to read extracts directory")?;
        let meta = std::fs::metadata(&path)
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        if meta.is_file() {
            files.push((path, meta.len()));
        }
    }

    files.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    files.truncate(n);
    Ok(files)
}

pub fn run(args: HugeArgs, extracts_dir: &Path) -> Result<()> {
    log::info!(
        "Finding the {} largest XML files under {}",
        args.number,
        extracts_dir.display()
    );
    let files = largest_files(extracts_dir, args.number)?;
    if files.is_empty() {
        log::warn!("No XML files under {}", extracts_dir.display());
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Size").fg(Color::Cyan),
            Cell::new("File").fg(Color::Cyan),
        ]);
    for (path, size) in &files {
        table.add_row(vec![
            Cell::new(fmt_mb(*size)).set_alignment(CellAlignment::Right),
            Cell::new(path.display()),
        ]);
    }
    eprintln!("\n{table}");
    Ok(())
}
