use std::env;
use syncrypt_core::config::LogLevel;
use syncrypt_core::AppConfig;
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE: &str = "syncrypt.log";
const ERROR_LOG_FILE: &str = "syncrypt_error.log";

/// Console output follows the verbosity flags. The two log files under
/// `config.log_dir` do not: `syncrypt.log` follows `log_level` and
/// `syncrypt_error.log` records every error.
///
/// The returned guards flush the file writers on drop and must outlive all logging.
pub fn init_logger(config: &AppConfig) -> Vec<WorkerGuard> {
    let console_filter = if config.very_quiet {
        EnvFilter::new("off")
    } else if config.quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::new(env::var("TRACING_LEVEL").unwrap_or_else(|_| "info".to_string()))
    };

    let file_level = match config.log_level {
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warning => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
    };

    let file_appender = tracing_appender::rolling::never(&config.log_dir, LOG_FILE);
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);

    let error_appender = tracing_appender::rolling::never(&config.log_dir, ERROR_LOG_FILE);
    let (error_writer, error_guard) = tracing_appender::non_blocking(error_appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .with_target(false)
                .without_time()
                .with_ansi(true)
                .with_filter(console_filter),
        )
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_level),
        )
        .with(
            fmt::layer()
                .with_writer(error_writer)
                .with_ansi(false)
                .with_filter(LevelFilter::ERROR),
        )
        .init();

    debug!("Logging to {}", config.log_dir.display());

    vec![file_guard, error_guard]
}
