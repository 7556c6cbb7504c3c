//! # Loggers Module
//!
//! Process-wide logging for the binaries: a `fern` dispatcher writing to
//! stdout and to a timestamped file per run. Only the newest log file of an
//! app is kept in the log directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glob::glob;

/// Maps a level name to a filter. Unknown names fall back to `Info`.
pub fn parse_level(level: &str) -> log::LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => log::LevelFilter::Info,
    }
}

/// Installs the global logger and returns the path of this run's log file.
///
/// # Arguments
/// * `app_name` - Prefix of the log file name (`<app_name>_<timestamp>.log`).
/// * `log_dir` - Directory for log files, created if missing.
/// * `log_level` - One of `trace`, `debug`, `info`, `warn`, `error`, `off`.
pub fn setup_logging(app_name: &str, log_dir: &Path, log_level: &str) -> Result<PathBuf> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("creating log dir {}", log_dir.display()))?;
    }

    let log_file_name = format!(
        "{}_{}.log",
        app_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = log_dir.join(log_file_name);

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(parse_level(log_level))
        .chain(std::io::stdout())
        .chain(fern::log_file(&log_path)?)
        .apply()
        .context("a global logger is already installed")?;

    rotate_logs(app_name, log_dir, &log_path);
    Ok(log_path)
}

/// Deletes every `<app_name>_*.log` in `log_dir` except `keep`.
pub fn rotate_logs(app_name: &str, log_dir: &Path, keep: &Path) -> usize {
    let pattern = format!("{}/{}_*.log", log_dir.display(), app_name);
    let entries = match glob(&pattern) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Bad log rotation pattern {}: {}", pattern, e);
            return 0;
        }
    };

    let mut removed = 0;
    for path in entries.flatten() {
        if path == keep {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => log::warn!("Failed to delete old log file {}: {}", path.display(), e),
        }
    }
    removed
}
