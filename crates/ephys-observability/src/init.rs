// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Unified logging initialization for ephys
//!
//! Console logging is always available. With the `file-logging` feature a
//! `LogOutput::Directory` target writes JSON logs into a timestamped run
//! folder and prunes old runs by age and count.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::CrateDebugFlags;
use crate::config::{LogFormat, LogOutput, LoggingConfig};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Logging initialization result
///
/// Must be kept alive for the duration of the program; dropping it flushes
/// and stops the background file writers.
pub struct LoggingGuard {
    #[cfg(feature = "file-logging")]
    _file_guards: Vec<tracing_appender::non_blocking::WorkerGuard>,
    log_dir: Option<PathBuf>,
}

impl LoggingGuard {
    /// Run folder receiving log files, if file logging is active
    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }
}

/// Build the `EnvFilter` for the given flags and base level
pub fn build_filter(debug_flags: &CrateDebugFlags, level: &str) -> Result<EnvFilter> {
    let filter = debug_flags.to_filter_string(level);
    EnvFilter::try_new(&filter).with_context(|| format!("Invalid log filter: {}", filter))
}

fn console_layer(config: &LoggingConfig, filter: EnvFilter) -> BoxedLayer {
    let stderr = matches!(config.output, LogOutput::Stderr);
    match (config.format, stderr) {
        (LogFormat::Text, true) => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_filter(filter)
            .boxed(),
        (LogFormat::Text, false) => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(filter)
            .boxed(),
        (LogFormat::Json, true) => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
        (LogFormat::Json, false) => tracing_subscriber::fmt::layer()
            .json()
            .with_filter(filter)
            .boxed(),
    }
}

/// Initialize logging
///
/// # Arguments
/// * `debug_flags` - Per-crate debug flags for filtering
/// * `config` - Level, format and destination
pub fn init_logging(debug_flags: &CrateDebugFlags, config: &LoggingConfig) -> Result<LoggingGuard> {
    let mut layers: Vec<BoxedLayer> = Vec::new();

    let guard = match &config.output {
        LogOutput::Stdout | LogOutput::Stderr => {
            layers.push(console_layer(config, build_filter(debug_flags, &config.level)?));
            LoggingGuard {
                #[cfg(feature = "file-logging")]
                _file_guards: Vec::new(),
                log_dir: None,
            }
        }
        LogOutput::Directory(base) => file_layers(debug_flags, config, base, &mut layers)?,
    };

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;

    Ok(guard)
}

/// Initialize console logging with default settings
pub fn init_logging_default(debug_flags: &CrateDebugFlags) -> Result<LoggingGuard> {
    init_logging(debug_flags, &LoggingConfig::default())
}

#[cfg(not(feature = "file-logging"))]
fn file_layers(
    _debug_flags: &CrateDebugFlags,
    _config: &LoggingConfig,
    base: &Path,
    _layers: &mut Vec<BoxedLayer>,
) -> Result<LoggingGuard> {
    Err(anyhow!(
        "Logging to {} requires the `file-logging` feature",
        base.display()
    ))
}

#[cfg(feature = "file-logging")]
fn file_layers(
    debug_flags: &CrateDebugFlags,
    config: &LoggingConfig,
    base: &Path,
    layers: &mut Vec<BoxedLayer>,
) -> Result<LoggingGuard> {
    use chrono::Utc;
    use tracing_appender::rolling;

    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let run_folder = base.join(format!("run_{}", timestamp));
    std::fs::create_dir_all(&run_folder)
        .with_context(|| format!("Failed to create log directory: {}", run_folder.display()))?;

    cleanup_old_logs(base, config.retention_days, config.retention_runs)?;

    // Console keeps human-readable output next to the JSON file
    layers.push(console_layer(
        &LoggingConfig {
            output: LogOutput::Stderr,
            format: LogFormat::Text,
            ..config.clone()
        },
        build_filter(debug_flags, &config.level)?,
    ));

    let appender = rolling::never(&run_folder, "ephys.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    layers.push(
        tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .json()
            .with_filter(build_filter(debug_flags, &config.level)?)
            .boxed(),
    );

    Ok(LoggingGuard {
        _file_guards: vec![guard],
        log_dir: Some(run_folder),
    })
}

/// Remove run folders older than `retention_days`, then keep at most
/// `retention_runs` of the remaining ones.
#[cfg(feature = "file-logging")]
fn cleanup_old_logs(base_log_dir: &Path, retention_days: u64, retention_runs: usize) -> Result<()> {
    use chrono::{DateTime, NaiveDateTime, Utc};

    if !base_log_dir.exists() {
        return Ok(());
    }

    let cutoff_date = Utc::now() - chrono::Duration::days(retention_days as i64);
    let mut runs: Vec<(PathBuf, DateTime<Utc>)> = Vec::new();

    for entry in std::fs::read_dir(base_log_dir)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        let stamp = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix("run_"))
            .and_then(|s| NaiveDateTime::parse_from_str(s, "%Y%m%d_%H%M%S").ok());
        if let Some(stamp) = stamp {
            runs.push((path, stamp.and_utc()));
        }
    }

    runs.sort_by_key(|(_, dt)| *dt);

    let mut kept = Vec::new();
    for (path, dt) in runs {
        if dt < cutoff_date {
            if let Err(e) = std::fs::remove_dir_all(&path) {
                tracing::warn!("Failed to remove old log directory {}: {}", path.display(), e);
            }
        } else {
            kept.push(path);
        }
    }

    if kept.len() > retention_runs {
        let excess = kept.len() - retention_runs;
        for path in kept.iter().take(excess) {
            if let Err(e) = std::fs::remove_dir_all(path) {
                tracing::warn!("Failed to remove old log directory {}: {}", path.display(), e);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_accepts_flags() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-ephys-model".to_string()]);
        assert!(build_filter(&flags, "info").is_ok());
    }

    #[test]
    fn test_build_filter_rejects_garbage() {
        let flags = CrateDebugFlags::default();
        assert!(build_filter(&flags, "ephys_model=loud").is_err());
    }

    #[cfg(not(feature = "file-logging"))]
    #[test]
    fn test_directory_output_needs_feature() {
        let config = LoggingConfig {
            output: LogOutput::Directory(PathBuf::from("./logs")),
            ..Default::default()
        };
        let result = init_logging(&CrateDebugFlags::default(), &config);
        assert!(result.is_err());
    }

    #[cfg(feature = "file-logging")]
    #[test]
    fn test_cleanup_keeps_recent_runs() {
        let dir = tempfile::tempdir().unwrap();
        let now = chrono::Utc::now();
        for offset in 0..4 {
            let stamp = (now - chrono::Duration::minutes(offset)).format("%Y%m%d_%H%M%S");
            std::fs::create_dir_all(dir.path().join(format!("run_{}", stamp))).unwrap();
        }
        std::fs::create_dir_all(dir.path().join("run_20000101_000000")).unwrap();

        cleanup_old_logs(dir.path(), 30, 2).unwrap();

        let remaining = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(remaining, 2);
    }
}
