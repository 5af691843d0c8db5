//! fern setup for the monitor: one line format, stdout plus a per-run file.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

const LOG_PREFIX: &str = "miao_monitor_";
const LOG_EXT: &str = "log";
/// Earlier run files kept next to the new one.
const KEEP_PREVIOUS: usize = 1;

pub fn setup_logging(log_dir: &Path, log_level: &str) -> Result<()> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;
    prune_logs(log_dir, KEEP_PREVIOUS)?;

    let log_path = log_dir.join(log_file_name(Local::now()));
    let file = fern::log_file(&log_path)
        .with_context(|| format!("opening log file {}", log_path.display()))?;

    fern::Dispatch::new()
        .format(format_line)
        .level(parse_level(log_level))
        .chain(std::io::stdout())
        .chain(file)
        .apply()?;

    log::debug!("logging to {}", log_path.display());
    Ok(())
}

fn format_line(out: fern::FormatCallback, message: &fmt::Arguments, record: &log::Record) {
    out.finish(format_args!(
        "{}[{}][{}] {}",
        Local::now().format("[%Y-%m-%d %H:%M:%S]"),
        record.target(),
        record.level(),
        message
    ))
}

/// `miao_monitor_<local time>.log`; names sort in start order.
pub fn log_file_name(started: DateTime<Local>) -> String {
    format!("{}{}.{}", LOG_PREFIX, started.format("%Y-%m-%d_%H-%M-%S"), LOG_EXT)
}

pub fn parse_level(log_level: &str) -> log::LevelFilter {
    match log_level.trim().to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "warn" | "warning" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => log::LevelFilter::Info,
    }
}

fn own_logs(log_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut logs: Vec<PathBuf> = fs::read_dir(log_dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension().is_some_and(|ext| ext == LOG_EXT)
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(LOG_PREFIX))
        })
        .collect();
    logs.sort();
    Ok(logs)
}

/// Removes all but the newest `keep` monitor logs. Other files are left alone.
/// Returns how many files were removed.
fn prune_logs(log_dir: &Path, keep: usize) -> Result<usize> {
    let logs = own_logs(log_dir)?;
    let stale = logs.len().saturating_sub(keep);
    let mut removed = 0;
    for path in &logs[..stale] {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            // The dispatcher is not up yet.
            Err(e) => eprintln!("could not remove old log {}: {}", path.display(), e),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, name).expect("write file");
        path
    }

    #[test]
    fn level_names_map_to_filters() {
        assert_eq!(parse_level("TRACE"), log::LevelFilter::Trace);
        assert_eq!(parse_level("warning"), log::LevelFilter::Warn);
        assert_eq!(parse_level(" error "), log::LevelFilter::Error);
        assert_eq!(parse_level("chatty"), log::LevelFilter::Info);
    }

    #[test]
    fn file_name_carries_start_time() {
        let started = Local
            .with_ymd_and_hms(2024, 5, 1, 9, 7, 3)
            .single()
            .expect("unambiguous local time");
        assert_eq!(log_file_name(started), "miao_monitor_2024-05-01_09-07-03.log");
    }

    #[test]
    fn prune_keeps_newest_monitor_logs_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let oldest = touch(dir.path(), "miao_monitor_2024-04-30_23-59-59.log");
        let older = touch(dir.path(), "miao_monitor_2024-05-01_08-00-00.log");
        let newest = touch(dir.path(), "miao_monitor_2024-05-01_10-00-00.log");
        let foreign = touch(dir.path(), "server_yahoo_2020-01-01_00-00-00.log");
        let notes = touch(dir.path(), "miao_monitor_notes.txt");

        assert_eq!(prune_logs(dir.path(), 1).expect("prune"), 2);
        assert!(!oldest.exists());
        assert!(!older.exists());
        assert!(newest.exists());
        assert!(foreign.exists());
        assert!(notes.exists());
    }

    #[test]
    fn prune_with_few_logs_removes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let only = touch(dir.path(), "miao_monitor_2024-05-01_10-00-00.log");
        assert_eq!(prune_logs(dir.path(), 1).expect("prune"), 0);
        assert_eq!(prune_logs(dir.path(), 5).expect("prune"), 0);
        assert!(only.exists());
        assert_eq!(own_logs(dir.path()).expect("list"), vec![only]);
    }
}
