//! HTTP download of the source export with resume and read timeout.
//!
//! Uses async reqwest internally with tokio::time::timeout for stall detection,
//! but presents a sync interface: the split itself is single-threaded and
//! blocking, so there is no async caller to hand a future to.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{LazyLock, OnceLock};
use std::task::Context;
use std::time::Duration;

use futures_util::StreamExt;
use indicatif::ProgressBar;
use tokio::io::{AsyncRead, ReadBuf};

use crate::error::FetchError;
use crate::progress::{fmt_mb, upgrade_to_bar};
use crate::retry::retry_with_backoff;
use crate::shutdown::is_shutdown_requested;

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Copy buffer size (256KB)
const COPY_BUF_SIZE: usize = 256 * 1024;

/// Runtime HTTP settings (read timeout, retries)
#[derive(Debug, Clone, Copy)]
pub struct HttpConfig {
    /// No data for this long = stalled connection
    pub read_timeout: Duration,
    /// Retry attempts for transient failures
    pub max_retries: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

static HTTP_CONFIG: OnceLock<HttpConfig> = OnceLock::new();

/// Install HTTP settings. Only the first call wins.
pub fn set_http_config(config: HttpConfig) {
    if HTTP_CONFIG.set(config).is_err() {
        log::debug!("HTTP config already set, ignoring");
    }
}

/// Current HTTP settings (defaults if never set).
pub fn http_config() -> HttpConfig {
    HTTP_CONFIG.get().copied().unwrap_or_default()
}

/// Shared async HTTP client.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .expect("failed to build HTTP client")
});

/// Get shared HTTP client.
pub fn http_client() -> &'static reqwest::Client {
    &SHARED_CLIENT
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Outcome of [`download`].
#[derive(Debug, Clone)]
pub struct Download {
    pub path: PathBuf,
    pub bytes: u64,
    /// File was already present and `force` was not set
    pub skipped: bool,
}

/// Path of the in-progress file for `dest` (`<dest>.part`).
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Download `url` to `dest`.
///
/// - `dest` exists and `!force`: nothing is fetched.
/// - otherwise the body is streamed into `<dest>.part`, resuming an existing
///   partial file with a `Range` request, then renamed to `dest`.
///
/// Transient failures are retried with exponential backoff.
pub fn download(
    url: &str,
    dest: &Path,
    force: bool,
    pb: &ProgressBar,
) -> Result<Download, FetchError> {
    if dest.exists() && !force {
        let bytes = fs::metadata(dest)?.len();
        log::info!("Using existing file: {} ({})", dest.display(), fmt_mb(bytes));
        return Ok(Download {
            path: dest.to_path_buf(),
            bytes,
            skipped: true,
        });
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let part = part_path(dest);
    if force && part.exists() {
        fs::remove_file(&part)?;
    }

    log::info!("Downloading {url}");
    let bytes = retry_with_backoff(url, pb, || fetch_into(url, &part, pb))?;
    fs::rename(&part, dest)?;
    log::info!("Downloaded {} ({})", dest.display(), fmt_mb(bytes));

    Ok(Download {
        path: dest.to_path_buf(),
        bytes,
        skipped: false,
    })
}

/// One download attempt into `part`, resuming from its current length.
///
/// Returns the complete file size.
fn fetch_into(url: &str, part: &Path, pb: &ProgressBar) -> Result<u64, FetchError> {
    let offset = fs::metadata(part).map(|m| m.len()).unwrap_or(0);

    let (reader, status, body_len) = SHARED_RUNTIME.handle().block_on(async {
        let mut request = SHARED_CLIENT.get(url);
        if offset > 0 {
            request = request.header(reqwest::header::RANGE, format!("bytes={offset}-"));
        }
        let response = request
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?;

        // Range starting at EOF: the partial file is already complete
        if offset > 0 && response.status() == reqwest::StatusCode::RANGE_NOT_SATISFIABLE {
            return Ok::<_, FetchError>((None, response.status(), None));
        }

        let response = response
            .error_for_status()
            .map_err(|e| FetchError::from_reqwest(&e))?;
        let status = response.status();
        let body_len = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());

        let stream = response.bytes_stream();
        let async_reader = tokio_util::io::StreamReader::new(
            stream.map(|result| result.map_err(io::Error::other)),
        );
        Ok((
            Some(TimeoutReader::new(Box::pin(async_reader))),
            status,
            body_len,
        ))
    })?;

    let Some(mut reader) = reader else {
        log::debug!("{}: already complete at {offset} bytes", part.display());
        return Ok(offset);
    };

    // Server ignored the range: start over
    let resumed = offset > 0 && status == reqwest::StatusCode::PARTIAL_CONTENT;
    let start = if resumed { offset } else { 0 };
    if offset > 0 && !resumed {
        log::warn!("Server does not support resume, restarting download");
    } else if resumed {
        log::info!("Resuming download at {}", fmt_mb(offset));
    }

    let file = if resumed {
        OpenOptions::new().append(true).open(part)?
    } else {
        File::create(part)?
    };
    let mut out = BufWriter::new(file);

    let expected = body_len.map(|n| n + start);
    if let Some(total) = expected {
        upgrade_to_bar(pb, total);
    }
    pb.set_position(start);

    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut written = start;
    loop {
        if is_shutdown_requested() {
            out.flush()?;
            log::warn!("Download interrupted at {}, partial file kept", fmt_mb(written));
            return Err(FetchError::Interrupted);
        }
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
        written += n as u64;
        pb.set_position(written);
    }
    out.flush()?;

    if let Some(expected) = expected {
        if written != expected {
            return Err(FetchError::Incomplete {
                expected,
                received: written,
            });
        }
    }
    Ok(written)
}

/// Async-to-sync bridge with read timeout.
///
/// Each read has a timeout; if no data arrives within the configured read
/// timeout it returns `TimedOut` (which is retryable).
pub struct TimeoutReader {
    inner: Pin<Box<dyn AsyncRead + Send + Sync>>,
    timeout: Duration,
}

impl TimeoutReader {
    fn new(inner: Pin<Box<dyn AsyncRead + Send + Sync>>) -> Self {
        Self {
            inner,
            timeout: http_config().read_timeout,
        }
    }
}

impl Read for TimeoutReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let timeout = self.timeout;
        SHARED_RUNTIME.handle().block_on(async {
            let read_future = async {
                let mut read_buf = ReadBuf::new(buf);
                std::future::poll_fn(|cx: &mut Context<'_>| {
                    Pin::as_mut(&mut self.inner).poll_read(cx, &mut read_buf)
                })
                .await?;
                Ok::<_, io::Error>(read_buf.filled().len())
            };

            match tokio::time::timeout(timeout, read_future).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("read timeout ({}s with no data)", timeout.as_secs()),
                )),
            }
        })
    }
}
