//! Logging setup shared by the CLI and the dashboard.
//!
//! - `RUST_LOG`: standard tracing filter (e.g. `info`, `pricehouse_core=debug`)
//! - `LOG_FORMAT`: `full` (default), `pretty`, `compact` or `json`
//!
//! The CLI logs to stderr. The dashboard owns the terminal, so it logs to a
//! file instead.

use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::error::PipelineError;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One line per event with all fields
    #[default]
    Full,
    /// Multi-line, with source locations
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON, one object per line
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Full,
        }
    }
}

/// Where log lines go.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogDestination {
    #[default]
    Stderr,
    /// Append to a file, created if absent.
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Filter used when `RUST_LOG` is unset.
    pub default_level: String,
    pub destination: LogDestination,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Full,
            default_level: "info".to_string(),
            destination: LogDestination::Stderr,
        }
    }
}

impl LogConfig {
    /// Defaults with `LOG_FORMAT` applied.
    pub fn from_env() -> Self {
        Self {
            format: env::var("LOG_FORMAT")
                .map(|s| LogFormat::parse(&s))
                .unwrap_or_default(),
            ..Default::default()
        }
    }

    pub fn with_default_level(mut self, level: impl Into<String>) -> Self {
        self.default_level = level.into();
        self
    }

    pub fn to_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.destination = LogDestination::File(path.into());
        self
    }
}

/// Install the global subscriber.
///
/// Fails if the log file cannot be opened or a subscriber is already set.
pub fn init_logging(config: LogConfig) -> Result<(), PipelineError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_level));

    let (writer, ansi) = match &config.destination {
        LogDestination::Stderr => (BoxMakeWriter::new(std::io::stderr), true),
        LogDestination::File(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
    };

    tracing_subscriber::registry()
        .with(format_layer(config.format, writer, ansi))
        .with(env_filter)
        .try_init()
        .map_err(|e| PipelineError::Config(format!("initialize logging: {e}")))
}

fn format_layer(
    format: LogFormat,
    writer: BoxMakeWriter,
    ansi: bool,
) -> Box<dyn Layer<Registry> + Send + Sync> {
    let base = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true);
    match format {
        LogFormat::Full => base.boxed(),
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Compact => base.compact().boxed(),
        LogFormat::Json => base.json().boxed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn emit(format: LogFormat) -> String {
        let captured = Captured::default();
        let sink = captured.clone();
        let layer = format_layer(format, BoxMakeWriter::new(move || sink.clone()), false);
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(rows = 3, "batch appended");
        });
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn formats_render_differently() {
        let full = emit(LogFormat::Full);
        assert_eq!(full.trim_end().lines().count(), 1);
        assert!(full.contains("batch appended"));

        let pretty = emit(LogFormat::Pretty);
        assert!(pretty.trim_end().lines().count() > 1);
        assert!(pretty.contains("batch appended"));

        let json = emit(LogFormat::Json);
        assert!(json.trim_start().starts_with('{'));
        assert!(json.contains("\"rows\":3"));
    }

    #[test]
    fn log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("compact"), LogFormat::Compact);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("full"), LogFormat::Full);
        assert_eq!(LogFormat::parse("unknown"), LogFormat::Full);
    }

    #[test]
    fn builder_sets_destination_and_level() {
        let config = LogConfig::default()
            .with_default_level("debug")
            .to_file("/tmp/dashboard.log");
        assert_eq!(config.default_level, "debug");
        assert_eq!(
            config.destination,
            LogDestination::File(PathBuf::from("/tmp/dashboard.log"))
        );
    }
}
