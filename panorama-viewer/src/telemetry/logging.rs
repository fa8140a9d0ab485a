//! Logging configuration and initialization
//!
//! Console output (compact or JSON) and an optional non-blocking log file.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Environment variable holding the filter directive
pub const LOG_ENV: &str = "PANORAMA_LOG";
/// Environment variable selecting the output format ("json" or anything else)
pub const LOG_FORMAT_ENV: &str = "PANORAMA_LOG_FORMAT";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Enable console output (default: true)
    pub console_enabled: bool,
    /// Enable file logging (default: false)
    pub file_enabled: bool,
    /// Log file; defaults to the user cache directory
    pub file_path: Option<PathBuf>,
    /// Use JSON format for console logs (default: false)
    pub json_format: bool,
    /// Default log level filter (default: "info")
    pub default_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enabled: true,
            file_enabled: false,
            file_path: None,
            json_format: false,
            default_level: "info".to_string(),
        }
    }
}

impl LogConfig {
    /// Where the log file goes when file logging is on
    pub fn resolved_file_path(&self) -> PathBuf {
        self.file_path.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .map(|dir| dir.join("PanoramaViewer").join("viewer.log"))
                .unwrap_or_else(|| PathBuf::from("panorama_viewer.log"))
        })
    }
}

/// Whether a format value selects JSON output
fn is_json_format(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("json")
}

/// Initialize the logging system with the given configuration
///
/// Returns a guard that must be kept alive for the duration of the program
/// so the log file is flushed.
///
/// # Environment Variables
///
/// - `PANORAMA_LOG`: log level filter (e.g. "debug", "info,panorama_viewer::resolver=debug")
/// - `PANORAMA_LOG_FORMAT`: set to "json" for JSON console output
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error + Send + Sync>> {
    // PANORAMA_LOG first, then RUST_LOG, then the config default
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(&config.default_level));

    let use_json = std::env::var(LOG_FORMAT_ENV)
        .map(|v| is_json_format(&v))
        .unwrap_or(config.json_format);

    let mut file_guard: Option<WorkerGuard> = None;

    let file_layer = if config.file_enabled {
        let log_path = config.resolved_file_path();
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(&log_path)?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        file_guard = Some(guard);
        eprintln!("Logging to file: {}", log_path.display());

        Some(
            fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false),
        )
    } else {
        None
    };

    let (json_layer, console_layer) = match (config.console_enabled, use_json) {
        (true, true) => (
            Some(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            ),
            None,
        ),
        (true, false) => (
            None,
            Some(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .compact(),
            ),
        ),
        (false, _) => (None, None),
    };

    // `try_init` also installs the `log` bridge
    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(json_layer)
        .with(console_layer)
        .try_init()?;

    tracing::info!(
        target: "panorama_viewer",
        version = env!("CARGO_PKG_VERSION"),
        json_format = use_json,
        file_enabled = config.file_enabled,
        "Logging initialized"
    );

    Ok(file_guard)
}

// Re-export WorkerGuard so callers can store it
pub use tracing_appender::non_blocking::WorkerGuard as LogGuard;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert!(config.console_enabled);
        assert!(!config.file_enabled);
        assert!(!config.json_format);
        assert_eq!(config.default_level, "info");
    }

    #[test]
    fn test_explicit_file_path_wins() {
        let config = LogConfig {
            file_path: Some(PathBuf::from("/tmp/custom.log")),
            ..LogConfig::default()
        };
        assert_eq!(config.resolved_file_path(), PathBuf::from("/tmp/custom.log"));
    }

    #[test]
    fn test_json_format_detection() {
        assert!(is_json_format("json"));
        assert!(is_json_format(" JSON "));
        assert!(!is_json_format("pretty"));
    }
}
