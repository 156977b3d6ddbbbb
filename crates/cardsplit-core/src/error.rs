//! Error type for fetching the source export

/// Error from downloading the source document.
///
/// Wraps either an HTTP-level failure (with optional status code) or a local
/// I/O error while writing the partial file.
#[derive(Debug)]
pub enum FetchError {
    /// HTTP error with optional status code
    Http {
        status: Option<u16>,
        message: String,
    },
    /// Body ended before `Content-Length` bytes arrived
    Incomplete { expected: u64, received: u64 },
    /// Shutdown requested mid-transfer (the partial file is kept)
    Interrupted,
    /// I/O error
    Io(std::io::Error),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Incomplete { expected, received } => {
                write!(f, "incomplete body: {received} of {expected} bytes")
            }
            Self::Interrupted => write!(f, "interrupted"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FetchError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl FetchError {
    /// Create HTTP error from reqwest error
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        Self::Http {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            // 4xx (except 408/429) means the request itself is wrong
            Self::Http {
                status: Some(s), ..
            } => !(400..500).contains(s) || *s == 408 || *s == 429,
            Self::Http { status: None, .. } => true,
            Self::Incomplete { .. } => true,
            Self::Interrupted => false,
            Self::Io(e) => e.kind() != std::io::ErrorKind::StorageFull,
        }
    }
}
