//! Logging utilities with indicatif integration and a daily log file

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use indicatif::MultiProgress;

/// ANSI color code and padded label for a log level.
fn level_style(level: log::Level, color: bool) -> (&'static str, &'static str, &'static str) {
    let label = match level {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARN ",
        log::Level::Info => "INFO ",
        log::Level::Debug => "DEBUG",
        log::Level::Trace => "TRACE",
    };
    if !color {
        return ("", label, "");
    }
    let ansi = match level {
        log::Level::Error => "\x1b[31m",
        log::Level::Warn => "\x1b[33m",
        log::Level::Info => "\x1b[32m",
        log::Level::Debug => "\x1b[36m",
        log::Level::Trace => "\x1b[35m",
    };
    (ansi, label, "\x1b[0m")
}

/// Path of today's log file inside `log_dir` (`cardsplit.YYYY-MM-DD.log`).
pub fn daily_log_path(log_dir: &Path) -> PathBuf {
    let day = chrono::Local::now().format("%Y-%m-%d");
    log_dir.join(format!("cardsplit.{day}.log"))
}

/// Open (append) today's log file, creating `log_dir` if needed.
pub fn open_log_file(log_dir: &Path) -> io::Result<File> {
    std::fs::create_dir_all(log_dir)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(daily_log_path(log_dir))
}

/// Line written to the log file: `HH:MM:SS | LEVEL | message`
fn file_line(level: log::Level, args: &std::fmt::Arguments<'_>) -> String {
    let (_, label, _) = level_style(level, false);
    let ts = chrono::Local::now().format("%H:%M:%S");
    format!("{ts} | {label} | {args}\n")
}

/// Logger that prints to stderr (through indicatif MultiProgress in TTY mode,
/// so lines don't mix with progress bars) and mirrors every line into a file.
pub struct TeeLogger {
    inner: env_logger::Logger,
    multi: Option<MultiProgress>,
    file: Option<Mutex<File>>,
}

impl TeeLogger {
    pub fn new(inner: env_logger::Logger, multi: Option<MultiProgress>, file: Option<File>) -> Self {
        Self {
            inner,
            multi,
            file: file.map(Mutex::new),
        }
    }
}

impl log::Log for TeeLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if !self.inner.enabled(record.metadata()) {
            return;
        }
        match &self.multi {
            Some(multi) => {
                let (pre, label, post) = level_style(record.level(), true);
                let line = format!("[{pre}{label}{post}] {}", record.args());
                multi.suspend(|| eprintln!("{line}"));
            }
            None => {
                let (_, label, _) = level_style(record.level(), false);
                eprintln!("[{label}] {}", record.args());
            }
        }
        if let Some(file) = &self.file {
            if let Ok(mut f) = file.lock() {
                // A failing log file must never take the run down with it
                let _ = f.write_all(file_line(record.level(), record.args()).as_bytes());
            }
        }
    }

    fn flush(&self) {
        self.inner.flush();
        if let Some(file) = &self.file {
            if let Ok(mut f) = file.lock() {
                let _ = f.flush();
            }
        }
    }
}

/// Initialize logging.
///
/// `multi` enables TTY mode (indicatif integration); `log_file` receives a
/// copy of every emitted line. `RUST_LOG` overrides the default level.
pub fn init_logging(
    quiet: bool,
    debug: bool,
    multi: Option<&MultiProgress>,
    log_file: Option<File>,
) -> Result<(), log::SetLoggerError> {
    let default_level = if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };

    let logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .build();
    let max_level = logger.filter();

    log::set_boxed_logger(Box::new(TeeLogger::new(logger, multi.cloned(), log_file)))?;
    log::set_max_level(max_level);
    Ok(())
}
