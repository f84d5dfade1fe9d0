//! Logging system configuration and initialization
//!
//! This module provides the logging setup shared by every CLI command:
//! - Configuration file based log level control (`RUST_LOG` wins when set)
//! - Structured JSON logging (optional)
//! - Console and file output support
//! - Old log file cleanup on startup

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, time::FormatTime},
    layer::{Layered, SubscriberExt},
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;
use crate::infrastructure::config::ConfigManager;

// Global guard to keep the log file writer alive
static LOG_GUARDS: Lazy<Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>>> =
    Lazy::new(|| Mutex::new(Vec::new()));

const LOG_FILE_PREFIX: &str = "medreg";

type OutputLayer = Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync>;

/// Local wall-clock timestamps with milliseconds
struct LocalTimeFormatter;

impl FormatTime for LocalTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Log directory from config, or `<app data dir>/logs`
pub fn get_log_directory(config: &LoggingConfig) -> PathBuf {
    if let Some(dir) = &config.log_dir {
        return dir.clone();
    }
    ConfigManager::get_app_data_dir()
        .map(|dir| dir.join("logs"))
        .unwrap_or_else(|_| PathBuf::from("logs"))
}

/// One file per day: `medreg-YYYYMMDD.log`
fn log_file_name() -> String {
    format!("{}-{}.log", LOG_FILE_PREFIX, Local::now().format("%Y%m%d"))
}

/// Build the filter from config unless `RUST_LOG` is set.
///
/// Below `trace`, HTTP and HTML parser internals are held at the levels in
/// `module_filters`.
fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(&config.level)
        .with_context(|| format!("Invalid log level '{}'", config.level))?;

    if !config.level.to_lowercase().contains("trace") {
        for (module, level) in &config.module_filters {
            let directive = format!("{}={}", module, level)
                .parse()
                .with_context(|| format!("Invalid module filter {}={}", module, level))?;
            filter = filter.add_directive(directive);
        }
    }

    let own = format!("medreg_scraper={}", config.level)
        .parse()
        .with_context(|| format!("Invalid log level '{}'", config.level))?;
    Ok(filter.add_directive(own))
}

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(LoggingConfig::default())
}

/// Initialize logging with custom configuration
///
/// # Environment Variable Override
/// ```bash
/// # Show per-attempt fetch logs
/// RUST_LOG="medreg_scraper=debug" medreg crawl-overview
///
/// # Show detailed HTTP logs
/// RUST_LOG="debug,reqwest=debug,hyper=debug" medreg crawl-detail
/// ```
pub fn init_logging_with_config(config: LoggingConfig) -> Result<()> {
    let env_filter = build_env_filter(&config)?;

    let log_dir = get_log_directory(&config);
    if config.file_output {
        std::fs::create_dir_all(&log_dir)
            .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;
        if config.auto_cleanup_logs {
            cleanup_old_logs(&log_dir, config.max_files)?;
        }
    }

    let layers = output_layers(&config, &log_dir)?;
    Registry::default().with(env_filter).with(layers).try_init()?;

    info!("Logging system initialized (level: {}, json: {})", config.level, config.json_format);
    if config.file_output {
        info!("Log directory: {:?}", log_dir);
    }
    Ok(())
}

/// File and console layers selected by `config`.
///
/// With a file layer present the console stays plain text; `json_format`
/// then applies to the file only.
fn output_layers(config: &LoggingConfig, log_dir: &Path) -> Result<Vec<OutputLayer>> {
    let mut layers: Vec<OutputLayer> = Vec::new();

    if config.file_output {
        let file_appender = rolling::never(log_dir, log_file_name());
        let (file_writer, file_guard) = non_blocking(file_appender);
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("Log guard registry poisoned"))?
            .push(file_guard);

        let file_layer: OutputLayer = if config.json_format {
            fmt::Layer::new()
                .json()
                .with_writer(file_writer)
                .with_timer(LocalTimeFormatter)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .boxed()
        } else {
            fmt::Layer::new()
                .with_writer(file_writer)
                .with_timer(LocalTimeFormatter)
                .with_target(false)
                .with_ansi(false)
                .boxed()
        };
        layers.push(file_layer);
    }

    // Console goes to stderr so command output on stdout stays clean
    if config.console_output {
        let console_layer: OutputLayer = if config.json_format && !config.file_output {
            fmt::Layer::new()
                .json()
                .with_writer(std::io::stderr)
                .with_timer(LocalTimeFormatter)
                .boxed()
        } else {
            fmt::Layer::new()
                .with_writer(std::io::stderr)
                .with_timer(LocalTimeFormatter)
                .with_target(false)
                .boxed()
        };
        layers.push(console_layer);
    }

    if layers.is_empty() {
        return Err(anyhow!("No logging output configured"));
    }
    Ok(layers)
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== medreg-scraper {} ===", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {} ({})", std::env::consts::OS, std::env::consts::ARCH);
    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {:?}", current_dir);
    }
}

/// Delete the oldest `.log` files so at most `max_files` remain
pub fn cleanup_old_logs(log_dir: &Path, max_files: u32) -> Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let mut log_files = Vec::new();
    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path.extension().and_then(|e| e.to_str()) == Some("log");
        if path.is_file() && is_log {
            if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
                log_files.push((path, modified));
            }
        }
    }

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    let keep = usize::try_from(max_files).unwrap_or(usize::MAX).max(1);
    let mut removed = 0;
    for (path, _) in log_files.iter().skip(keep) {
        match std::fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove old log file {:?}: {}", path, e),
        }
    }
    if removed > 0 {
        info!("Removed {} old log files (keeping {})", removed, keep);
    }
    Ok(removed)
}

impl LoggingConfig {
    /// Quieter console-only defaults for commands that print results
    pub fn console_only(level: &str) -> Self {
        Self {
            level: level.to_string(),
            file_output: false,
            console_output: true,
            ..Self::default()
        }
    }
}
