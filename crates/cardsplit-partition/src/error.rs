//! Error taxonomy for a split run

use std::io;
use std::path::PathBuf;

use crate::stats::Summary;

/// Framing failure in the source document (truncated or malformed XML).
#[derive(Debug, Clone)]
pub struct ParseError {
    /// Approximate byte offset in the (decompressed) source
    pub offset: u64,
    /// Records successfully extracted before the failure
    pub records: u64,
    pub message: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "at byte {} after {} records: {}",
            self.offset, self.records, self.message
        )
    }
}

impl std::error::Error for ParseError {}

/// Structural failure that aborts a split run.
///
/// Per-record key problems are not errors; they are counted in [`Summary`].
#[derive(Debug)]
pub enum SplitError {
    /// Source document could not be opened
    SourceUnavailable { path: PathBuf, source: io::Error },
    /// Source document is truncated or malformed
    Parse(ParseError),
    /// Output file could not be created or reopened
    SinkOpen { path: PathBuf, source: io::Error },
    /// Writing a record or footer failed
    SinkWrite { path: PathBuf, source: io::Error },
    /// Shutdown was requested (SIGINT/SIGTERM)
    Interrupted { records: u64 },
}

impl std::fmt::Display for SplitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SourceUnavailable { path, source } => {
                write!(f, "source unavailable: {}: {source}", path.display())
            }
            Self::Parse(e) => write!(f, "parse error {e}"),
            Self::SinkOpen { path, source } => {
                write!(f, "cannot open output {}: {source}", path.display())
            }
            Self::SinkWrite { path, source } => {
                write!(f, "cannot write output {}: {source}", path.display())
            }
            Self::Interrupted { records } => write!(f, "interrupted after {records} records"),
        }
    }
}

impl std::error::Error for SplitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SourceUnavailable { source, .. }
            | Self::SinkOpen { source, .. }
            | Self::SinkWrite { source, .. } => Some(source),
            Self::Parse(e) => Some(e),
            Self::Interrupted { .. } => None,
        }
    }
}

impl From<ParseError> for SplitError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

impl SplitError {
    /// Process exit code for this failure (130 for interruption, as for SIGINT)
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Interrupted { .. } => 130,
            _ => 1,
        }
    }
}

/// A failed run: the error plus everything counted up to the failure.
#[derive(Debug)]
pub struct RunFailure {
    pub error: SplitError,
    pub summary: Summary,
}

impl std::fmt::Display for RunFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for RunFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
