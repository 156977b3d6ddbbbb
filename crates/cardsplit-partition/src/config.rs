//! Split configuration

use std::path::PathBuf;
use std::str::FromStr;

/// What to do with an output file left behind by an earlier run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExistingFilePolicy {
    /// Discard the old contents and start the file over
    #[default]
    Truncate,
    /// Remove the old footer and keep appending after the old records
    Append,
}

impl std::fmt::Display for ExistingFilePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncate => write!(f, "truncate"),
            Self::Append => write!(f, "append"),
        }
    }
}

impl FromStr for ExistingFilePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "truncate" => Ok(Self::Truncate),
            "append" => Ok(Self::Append),
            other => Err(format!("unknown existing-file policy: {other}")),
        }
    }
}

/// Runtime configuration for a split run
#[derive(Debug, Clone)]
pub struct Config {
    /// Base directory for `<YYYY-MM>/<prefix>.<CC>.xml`
    pub extracts_dir: PathBuf,
    /// File name prefix
    pub prefix: String,
    /// Local name of the repeating record element
    pub record_tag: String,
    pub existing: ExistingFilePolicy,
    /// Cap on simultaneously open output files (`None` = unlimited)
    pub max_open_files: Option<usize>,
    /// Log a progress line every this many records (non-TTY)
    pub log_every: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            extracts_dir: PathBuf::from("extracts"),
            prefix: "business-cards".to_string(),
            record_tag: "businesscard".to_string(),
            existing: ExistingFilePolicy::Truncate,
            max_open_files: None,
            log_every: 100_000,
        }
    }
}
