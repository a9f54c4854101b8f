//! Structured logging setup for applications built on feblock
//!
//! The container crates emit `tracing` events (codec sizes, assembly entry
//! points, precision warnings) but never install a subscriber. Binaries call
//! [`init_tracing`] once at startup to route those events somewhere.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: filter directive (e.g., `RUST_LOG=feblock_sparse=debug`)
//! - `FEBLOCK_LOG_FORMAT`: output format (`pretty`, `json` or `compact`, default: `pretty`)
//!
//! # Example
//!
//! ```no_run
//! use feblock::logging::{init_tracing, TracingConfig, TracingFormat};
//!
//! init_tracing(TracingConfig {
//!     format: TracingFormat::Compact,
//!     filter: "feblock_sparse=debug,info".to_string(),
//!     ..TracingConfig::default()
//! })
//! .unwrap();
//! ```

use anyhow::Result;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Environment variable selecting the output format
pub const FORMAT_ENV: &str = "FEBLOCK_LOG_FORMAT";

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "feblock_sparse=info,feblock_core=info,warn";

/// Tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TracingFormat {
    /// Pretty-printed human-readable format
    #[default]
    Pretty,
    /// JSON format for structured logging
    Json,
    /// Compact format (single line per event)
    Compact,
}

impl TracingFormat {
    /// Parse from string; unknown names fall back to [`TracingFormat::Pretty`]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => TracingFormat::Json,
            "compact" => TracingFormat::Compact,
            _ => TracingFormat::Pretty,
        }
    }
}

/// Subscriber configuration
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Output format
    pub format: TracingFormat,
    /// Filter directive (e.g., "feblock_sparse=debug,info")
    pub filter: String,
    /// Enable ANSI colors (ignored for JSON)
    pub with_ansi: bool,
    /// Show target module paths
    pub with_target: bool,
    /// Show thread IDs
    pub with_thread_ids: bool,
    /// Show file locations and line numbers
    pub with_file: bool,
}

impl TracingConfig {
    /// Configuration from explicit format and filter strings, ignoring the environment
    pub fn new(format: TracingFormat, filter: impl Into<String>) -> Self {
        Self {
            format,
            filter: filter.into(),
            with_ansi: true,
            with_target: true,
            // Threaded backends run kernels on the rayon pool
            with_thread_ids: cfg!(feature = "parallel"),
            with_file: false,
        }
    }

    /// Configuration from `FEBLOCK_LOG_FORMAT` and `RUST_LOG`
    pub fn from_env() -> Self {
        let format = std::env::var(FORMAT_ENV)
            .map(|s| TracingFormat::parse(&s))
            .unwrap_or_default();
        let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string());
        Self::new(format, filter)
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Install a global subscriber for the given configuration
///
/// Call once at application startup.
///
/// # Errors
///
/// Fails if the filter directive does not parse or a global subscriber is
/// already installed.
#[cfg(feature = "tracing")]
pub fn init_tracing(config: TracingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter)?;

    match config.format {
        TracingFormat::Pretty => {
            let layer = fmt::layer()
                .pretty()
                .with_ansi(config.with_ansi)
                .with_target(config.with_target)
                .with_thread_ids(config.with_thread_ids)
                .with_file(config.with_file)
                .with_line_number(config.with_file)
                .with_filter(filter);
            tracing_subscriber::registry().with(layer).try_init()?;
        }
        TracingFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_target(config.with_target)
                .with_thread_ids(config.with_thread_ids)
                .with_file(config.with_file)
                .with_line_number(config.with_file)
                .with_filter(filter);
            tracing_subscriber::registry().with(layer).try_init()?;
        }
        TracingFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_ansi(config.with_ansi)
                .with_target(config.with_target)
                .with_thread_ids(config.with_thread_ids)
                .with_file(config.with_file)
                .with_line_number(config.with_file)
                .with_filter(filter);
            tracing_subscriber::registry().with(layer).try_init()?;
        }
    }

    tracing::debug!(format = ?config.format, filter = %config.filter, "tracing initialized");
    Ok(())
}

/// No-op when the `tracing` feature is disabled
#[cfg(not(feature = "tracing"))]
pub fn init_tracing(_config: TracingConfig) -> Result<()> {
    Ok(())
}

/// [`init_tracing`] with the environment-derived configuration
pub fn init_from_env() -> Result<()> {
    init_tracing(TracingConfig::from_env())
}
