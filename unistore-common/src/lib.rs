//! # unistore Common
//!
//! Shared utilities for the unistore components.
//!
//! ## Logging
//!
//! ```rust,ignore
//! use unistore_common::{init_logging_with_format, LogFormat};
//!
//! // RUST_LOG takes precedence over the level given here. Lines go to stderr.
//! init_logging_with_format("info", LogFormat::Pretty).unwrap();
//! tracing::info!(volume = "vol1", "Volume created");
//! ```

pub mod logging;

// Re-export logging functions
pub use logging::{
    build_subscriber, init_logging, init_logging_json, init_logging_with_format, LogFormat,
    LOG_LEVELS,
};
