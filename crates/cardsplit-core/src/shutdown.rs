//! Graceful shutdown support via atomic flag

use std::sync::atomic::{AtomicBool, Ordering};

/// Global shutdown flag, set by the SIGTERM/SIGINT handler
pub fn shutdown_flag() -> &'static AtomicBool {
    static FLAG: AtomicBool = AtomicBool::new(false);
    &FLAG
}

/// Check if shutdown was requested
pub fn is_shutdown_requested() -> bool {
    shutdown_flag().load(Ordering::Relaxed)
}

/// Request shutdown (for signal handlers)
pub fn request_shutdown() {
    shutdown_flag().store(true, Ordering::Relaxed);
}

/// Route SIGINT and SIGTERM into the shutdown flag.
///
/// Repeated signals only set the flag again: the split loop must still reach
/// sink finalization, so there is no force-exit on the second signal.
pub fn install_signal_handlers() -> std::io::Result<()> {
    // SAFETY: the handler only performs an atomic store, which is async-signal-safe
    unsafe {
        signal_hook::low_level::register(signal_hook::consts::SIGTERM, request_shutdown)?;
        signal_hook::low_level::register(signal_hook::consts::SIGINT, request_shutdown)?;
    }
    Ok(())
}
