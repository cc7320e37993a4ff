//! # Faultline Utilities
//!
//! Shared utilities, logging, and helpers for Faultline.
//!
//! This crate provides common functionality used across the Faultline
//! workspace, including production-ready logging infrastructure built on
//! `tracing`.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{init_logging, init_logging_with_level, LogFormat, LogLevel};
pub use tracing::{debug, error, info, trace, warn};
