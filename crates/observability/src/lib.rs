//! Tracing and logging setup shared by the collection binaries.

/// Tracing configuration (filters, layers).
pub mod tracing;

pub use self::tracing::{LogFormat, LoggingOptions};

/// Initialize process-wide structured logging with defaults (JSON, `info`).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    self::tracing::init(&LoggingOptions::default());
}

/// Same as [`init`], with explicit options (format, default directive).
pub fn init_with(options: &LoggingOptions) {
    self::tracing::init(options);
}
