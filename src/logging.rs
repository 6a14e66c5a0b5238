//! # Structured Logging Module
//!
//! Environment-aware structured logging that outputs to both console and a
//! JSON log file for debugging long-running worker fleets.

use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);

        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(true)
            .with_filter(EnvFilter::new(log_level.clone()));

        let registry = tracing_subscriber::registry().with(console_layer);

        // File output is best-effort; a read-only filesystem still gets
        // console logs.
        match open_log_file(&environment) {
            Some(file) => {
                let file_layer = fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true)
                    .with_ansi(false)
                    .json()
                    .with_filter(EnvFilter::new(log_level));
                let _ = registry.with(file_layer).try_init();
            }
            None => {
                let _ = registry.try_init();
            }
        }
    });
}

fn open_log_file(environment: &str) -> Option<fs::File> {
    let log_dir = PathBuf::from("log");
    if !log_dir.exists() {
        fs::create_dir_all(&log_dir).ok()?;
    }

    let pid = process::id();
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let log_path = log_dir.join(format!("{environment}.{pid}.{timestamp}.log"));
    fs::File::create(log_path).ok()
}

fn get_environment() -> String {
    std::env::var("LEASEWORK_ENV").unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> String {
    if let Ok(level) = std::env::var("RUST_LOG") {
        return level;
    }
    match environment {
        "production" => "info".to_string(),
        "test" => "warn".to_string(),
        _ => "debug".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_defaults_by_environment() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("test"), "warn");
        assert_eq!(get_log_level("development"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_structured_logging();
        init_structured_logging();
    }
}
