//! Tracing/logging initialization.
//!
//! JSON lines on stderr by default; `RUST_LOG` overrides the configured
//! directive. Stdout is left to the binaries' own output.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    /// Human-readable output for local runs.
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingOptions {
    pub format: LogFormat,
    /// Filter used when `RUST_LOG` is unset, e.g. `info,arrears_infra=debug`.
    pub default_directive: String,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            default_directive: "info".to_string(),
        }
    }
}

impl LoggingOptions {
    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.default_directive))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(options: &LoggingOptions) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(options.filter())
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_writer(std::io::stderr);

    let _ = match options.format {
        LogFormat::Json => builder.json().with_target(false).try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
}
