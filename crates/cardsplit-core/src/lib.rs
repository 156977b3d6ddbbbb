//! Cardsplit Core - shared infrastructure for the business-card splitter
//!
//! Logging, progress bars, the shutdown flag and the HTTP download of the
//! source export. Nothing in here knows about XML.

pub mod error;
pub mod logging;
pub mod progress;
pub mod retry;
pub mod shutdown;
pub mod stream;

// Re-exports for convenience
pub use error::FetchError;
pub use logging::{TeeLogger, daily_log_path, init_logging, open_log_file};
pub use progress::{ProgressContext, SharedProgress, fmt_mb, fmt_num};
pub use shutdown::{install_signal_handlers, is_shutdown_requested, request_shutdown, shutdown_flag};
pub use stream::{Download, HttpConfig, download, http_client, http_config, set_http_config};
