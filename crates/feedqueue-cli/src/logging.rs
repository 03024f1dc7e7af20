use anyhow::Result;
use std::io;
use std::io::IsTerminal;
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::{self, time::ChronoUtc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Log to stderr
pub fn init_logging(verbose_level: u8, quiet: bool) -> Result<()> {
    init_logging_with_file(verbose_level, quiet, None)
}

/// Log to a daily-rotated file when `log_file` is given, stderr otherwise
pub fn init_logging_with_file(verbose_level: u8, quiet: bool, log_file: Option<&Path>) -> Result<()> {
    let filter = level_filter(verbose_level, quiet);

    let json = std::env::var("RUST_LOG_JSON")
        .map(|v| v == "true")
        .unwrap_or_else(|_| !io::stdout().is_terminal());

    let registry = Registry::default().with(filter);

    match log_file {
        Some(log_path) => {
            let file_appender = rolling_appender(log_path)?;
            if json {
                let json_layer = fmt::layer()
                    .json()
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(file_appender);
                registry.with(json_layer).init();
            } else {
                let fmt_layer = fmt::layer()
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .with_writer(file_appender);
                registry.with(fmt_layer).init();
            }
        }
        None => {
            if json {
                let json_layer = fmt::layer()
                    .json()
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(io::stderr);
                registry.with(json_layer).init();
            } else {
                let fmt_layer = fmt::layer()
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(io::stderr);
                registry.with(fmt_layer).init();
            }
        }
    }

    Ok(())
}

// quiet = error only, 0 = info, 1 = debug, 2+ = trace. RUST_LOG wins unless quiet.
fn level_filter(verbose_level: u8, quiet: bool) -> EnvFilter {
    if quiet {
        return EnvFilter::new("error");
    }
    let default = match verbose_level {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

// feedqueue.log rotates into feedqueue.2026-01-17 and so on
fn rolling_appender(log_path: &Path) -> Result<RollingFileAppender> {
    let log_dir = log_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Log file path has no parent directory"))?;
    std::fs::create_dir_all(log_dir)?;

    let log_filename = log_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid log filename"))?;
    let log_prefix = log_filename
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(log_filename);

    Ok(RollingFileAppender::new(Rotation::DAILY, log_dir, log_prefix))
}
