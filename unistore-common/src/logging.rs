//! Logging initialization using tracing.

use std::fmt as std_fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Level names accepted by [`init_logging`].
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Output format of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, one event per line
    #[default]
    Pretty,
    /// One JSON object per event, for log aggregation
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(anyhow!("Unknown log format '{}', expected pretty or json", other)),
        }
    }
}

impl std_fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std_fmt::Formatter<'_>) -> std_fmt::Result {
        match self {
            Self::Pretty => f.write_str("pretty"),
            Self::Json => f.write_str("json"),
        }
    }
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Build a subscriber that writes log lines to `writer`.
///
/// Stdout is left to the program's own output, so the `init_*` functions
/// pass `std::io::stderr`.
pub fn build_subscriber<W>(level: &str, format: LogFormat, writer: W) -> impl SubscriberInitExt
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let (pretty, json) = match format {
        LogFormat::Pretty => (
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            ),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_timer(fmt::time::ChronoUtc::rfc_3339())
                    .with_target(true)
                    .with_thread_ids(true),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(pretty)
        .with(json)
}

/// Initialize the tracing subscriber with the specified log level.
///
/// # Arguments
/// * `level` - Log level string (trace, debug, info, warn, error)
///
/// # Example
/// ```
/// unistore_common::init_logging("info").unwrap();
/// ```
pub fn init_logging(level: &str) -> Result<()> {
    init_logging_with_format(level, LogFormat::Pretty)
}

/// Initialize logging with JSON output format.
/// Suitable for production environments with log aggregation.
pub fn init_logging_json(level: &str) -> Result<()> {
    init_logging_with_format(level, LogFormat::Json)
}

/// Initialize logging in the given format. Log lines go to stderr.
pub fn init_logging_with_format(level: &str, format: LogFormat) -> Result<()> {
    build_subscriber(level, format, std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("Failed to install log subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
        assert_eq!(LogFormat::Json.to_string(), "json");
    }

    /// In-memory log sink.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_events_go_to_given_writer() {
        for format in [LogFormat::Pretty, LogFormat::Json] {
            let sink = Captured::default();
            let writer = sink.clone();
            let guard = build_subscriber("info", format, move || writer.clone()).set_default();
            tracing::info!(volume = "vol1", "Volume created");
            tracing::debug!("Filtered out");
            drop(guard);

            let output = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
            assert!(output.contains("Volume created"), "{}: {}", format, output);
            assert!(!output.contains("Filtered out"), "{}: {}", format, output);
        }
    }

    #[test]
    fn test_second_init_fails() {
        // Whichever test installs the subscriber first wins; the other must fail.
        let first = init_logging("debug");
        let second = init_logging_json("debug");
        assert!(first.is_err() || second.is_err());
    }
}
