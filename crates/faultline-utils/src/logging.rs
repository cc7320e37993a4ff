//! # Logging Utilities
//!
//! Logging bootstrap for Faultline, built on `tracing`.
//!
//! The trap layer is a library; the embedding debugger decides when logging
//! starts and what it looks like. This module gives it a one-call setup: a
//! console layer, an optional file layer, pretty or JSON output, all
//! filtered through `RUST_LOG`.
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: level filter (e.g. `debug`, `faultline_core=trace`)
//! - `FAULTLINE_LOG_FORMAT`: output format (`json` or `pretty`, default `pretty`)
//! - `FAULTLINE_LOG_FILE`: optional log file path (console-only when unset)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use faultline_utils::init_logging;
//!
//! init_logging().expect("logging setup failed");
//! tracing::info!("trap layer ready");
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io, mem};

use tracing::Level;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// A fully configured output layer, erased so console and file variants can
/// share one code path.
type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat
{
    /// Human-readable output for interactive sessions.
    Pretty,
    /// Line-delimited JSON for log collectors.
    Json,
}

impl FromStr for LogFormat
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "dev" | "development" => Ok(LogFormat::Pretty),
            "json" | "prod" | "production" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format {other:?}, expected 'pretty' or 'json'")),
        }
    }
}

/// Log verbosity, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    /// Errors only.
    Error,
    /// Warnings and errors.
    Warn,
    /// Normal operation (default).
    Info,
    /// Per-operation detail.
    Debug,
    /// Everything, including per-frame and per-register dumps.
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_ascii_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!(
                "unknown log level {other:?}, expected 'error', 'warn', 'info', 'debug', or 'trace'"
            )),
        }
    }
}

/// Logging setup failure.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// A global subscriber was already installed.
    #[error("failed to install the tracing subscriber: {0}")]
    InitializationFailed(String),
}

/// Initialize logging from the environment
///
/// Reads `RUST_LOG`, `FAULTLINE_LOG_FORMAT`, and `FAULTLINE_LOG_FILE`;
/// unset or unparsable values fall back to info-level pretty console output.
///
/// ## Errors
///
/// Fails with [`LoggingError::InitializationFailed`] when a global
/// subscriber is already installed.
pub fn init_logging() -> Result<(), LoggingError>
{
    let format = env::var("FAULTLINE_LOG_FORMAT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(LogFormat::Pretty);
    let level = env::var("RUST_LOG")
        .ok()
        .and_then(|value| value.parse::<LogLevel>().ok())
        .map_or(Level::INFO, Into::into);
    install(format, level)
}

/// Initialize logging with an explicit level and format
///
/// `RUST_LOG` still overrides the level when set; `FAULTLINE_LOG_FILE`
/// still enables the file layer.
///
/// ## Errors
///
/// Fails with [`LoggingError::InitializationFailed`] when a global
/// subscriber is already installed.
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<(), LoggingError>
{
    install(format, level.into())
}

fn install(format: LogFormat, default_level: Level) -> Result<(), LoggingError>
{
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    let mut layers = vec![output_layer(format, filter.clone(), io::stdout, true)];
    if let Some(path) = env::var("FAULTLINE_LOG_FILE").ok().map(PathBuf::from) {
        layers.push(output_layer(format, filter, file_writer(&path), false));
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))
}

/// Build one output layer; console and file differ only in writer and ANSI.
fn output_layer<W>(format: LogFormat, filter: EnvFilter, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'a> fmt::MakeWriter<'a> + Send + Sync + 'static,
{
    let base = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_ansi(ansi)
        .with_writer(writer);
    match format {
        LogFormat::Pretty => base.with_filter(filter).boxed(),
        LogFormat::Json => base
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
    }
}

fn file_writer(path: &Path) -> tracing_appender::non_blocking::NonBlocking
{
    let appender = tracing_appender::rolling::daily(
        path.parent().unwrap_or_else(|| Path::new(".")),
        path.file_name().unwrap_or_default(),
    );
    let (writer, guard) = tracing_appender::non_blocking(appender);
    // the guard flushes buffered lines on drop; it must live for the whole
    // process, so leak it deliberately
    mem::forget(guard);
    writer
}
