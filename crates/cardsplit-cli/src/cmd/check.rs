//! Check subcommand - verify directories and show effective settings

use std::path::Path;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use super::Settings;

/// Create `dir` if needed and prove it is writable.
fn ensure_writable(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
    let marker = dir.join(".cardsplit-write-test");
    std::fs::write(&marker, b"ok").with_context(|| format!("{} is not writable", dir.display()))?;
    std::fs::remove_file(&marker).with_context(|| format!("cannot clean up {}", marker.display()))?;
    Ok(())
}

pub fn run(settings: &Settings) -> Result<()> {
    let dirs = [
        ("Temp directory", &settings.tmp_dir),
        ("Log directory", &settings.log_dir),
        ("Extracts directory", &settings.partition.extracts_dir),
    ];

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
            Cell::new("Status").fg(Color::Cyan),
        ]);

    let mut failures = 0;
    for (label, dir) in dirs {
        let status = match ensure_writable(dir) {
            Ok(()) => Cell::new("ok").fg(Color::Green),
            Err(e) => {
                failures += 1;
                log::error!("{e:#}");
                Cell::new("not writable").fg(Color::Red)
            }
        };
        table.add_row(vec![Cell::new(label), Cell::new(dir.display()), status]);
    }

    let source = match &settings.local_source {
        Some(path) if path.is_file() => (path.display().to_string(), Cell::new("ok").fg(Color::Green)),
        Some(path) => {
            failures += 1;
            log::error!("Source file not found: {}", path.display());
            (path.display().to_string(), Cell::new("missing").fg(Color::Red))
        }
        None => (settings.url.clone(), Cell::new("")),
    };
    table.add_row(vec![Cell::new("Source"), Cell::new(source.0), source.1]);

    let rows: [(&str, String); 8] = [
        ("Download path", settings.download_path.display().to_string()),
        ("File prefix", settings.partition.prefix.clone()),
        ("Record element", settings.partition.record_tag.clone()),
        ("Existing files", settings.partition.existing.to_string()),
        (
            "Max open files",
            settings
                .partition
                .max_open_files
                .map_or_else(|| "unlimited".to_string(), |n| n.to_string()),
        ),
        ("Read timeout", format!("{}s", settings.http.read_timeout.as_secs())),
        ("Max retries", settings.http.max_retries.to_string()),
        (
            "Config file",
            settings
                .config_file
                .as_ref()
                .map_or_else(|| "defaults".to_string(), |p| p.display().to_string()),
        ),
    ];
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value), Cell::new("")]);
    }

    eprintln!("\n{table}");

    if failures > 0 {
        bail!("{failures} check(s) failed");
    }
    log::info!("Configuration OK");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a/b");
        ensure_writable(&target).unwrap();
        assert!(target.is_dir());
        assert!(!target.join(".cardsplit-write-test").exists());
    }

    #[test]
    fn file_in_the_way_fails() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("extracts");
        std::fs::write(&blocker, "file").unwrap();
        assert!(ensure_writable(&blocker).is_err());
    }
}
