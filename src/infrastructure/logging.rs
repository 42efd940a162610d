//! Logging system configuration and initialization
//!
//! Console output by default, with optional non-blocking file output (plain
//! or JSON) stored next to the executable. Dependency noise is filtered
//! unless TRACE is requested explicitly or RUST_LOG overrides the filter.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use lazy_static::lazy_static;
use tracing::info;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::infrastructure::config::LoggingConfig;

// Keeps the non-blocking file writer alive for the process lifetime.
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> =
        Mutex::new(Vec::new());
}

/// Log directory relative to the executable location.
pub fn get_log_directory() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(std::path::Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
    exe_dir.join("logs")
}

fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut filter = EnvFilter::new(&config.level);
        if !config.level.to_lowercase().contains("trace") {
            filter = filter
                .add_directive("reqwest=info".parse().unwrap())
                .add_directive("hyper=warn".parse().unwrap())
                .add_directive("h2=warn".parse().unwrap())
                .add_directive("tokio=info".parse().unwrap())
                .add_directive(format!("bitable_sync={}", config.level).parse().unwrap());
        }
        filter
    })
}

/// Initialize the logging system. Called once from `main` before any task
/// work; returns an error when no output is configured at all.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let registry = Registry::default().with(build_env_filter(config));

    match (config.file_output, config.console_output) {
        (true, true) | (true, false) => {
            let log_dir = get_log_directory();
            std::fs::create_dir_all(&log_dir)
                .map_err(|e| anyhow!("failed to create log directory {log_dir:?}: {e}"))?;

            let file_appender = rolling::never(&log_dir, "bitable-sync.log");
            let (file_writer, file_guard) = non_blocking(file_appender);
            LOG_GUARDS.lock().unwrap().push(file_guard);

            if config.json_format {
                let file_layer = fmt::Layer::new()
                    .json()
                    .with_writer(file_writer)
                    .with_target(true)
                    .with_ansi(false);
                if config.console_output {
                    let console_layer = fmt::Layer::new()
                        .with_writer(std::io::stdout)
                        .with_target(false);
                    registry.with(file_layer).with(console_layer).init();
                } else {
                    registry.with(file_layer).init();
                }
            } else {
                let file_layer = fmt::Layer::new()
                    .with_writer(file_writer)
                    .with_target(false)
                    .with_ansi(false);
                if config.console_output {
                    let console_layer = fmt::Layer::new()
                        .with_writer(std::io::stdout)
                        .with_target(false);
                    registry.with(file_layer).with(console_layer).init();
                } else {
                    registry.with(file_layer).init();
                }
            }
            info!("logging initialized (file output in {:?})", get_log_directory());
        }
        (false, true) => {
            let console_layer = fmt::Layer::new()
                .with_writer(std::io::stdout)
                .with_target(false);
            registry.with(console_layer).init();
            info!("logging initialized (console only)");
        }
        (false, false) => {
            return Err(anyhow!("no logging output configured"));
        }
    }

    info!("log level: {}", config.level);
    Ok(())
}
