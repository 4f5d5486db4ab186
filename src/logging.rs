use crate::constants::LOG_FILE_TIME_FORMAT;
use crate::error::Result;
use chrono::Local;
use once_cell::sync::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

static LOG_FILE: OnceCell<PathBuf> = OnceCell::new();

/// Keeps the per-run file sink alive; drop it only at process exit so buffered lines are flushed.
pub struct LogHandle {
    pub log_file: PathBuf,
    _guard: WorkerGuard,
}

/// `run_{YYYYMMDD_HHMMSS}.log`
pub fn run_log_file_name(started_at: chrono::DateTime<Local>) -> String {
    format!("run_{}.log", started_at.format(LOG_FILE_TIME_FORMAT))
}

/// Install the process-wide subscriber with a per-run JSON file sink (debug)
/// and a console sink (info, or `RUST_LOG`).
///
/// Returns `None` when logging was already set up in this process; sinks are
/// never registered twice.
pub fn init_logging(log_dir: &Path) -> Result<Option<LogHandle>> {
    if let Some(existing) = LOG_FILE.get() {
        debug!("Logging already initialized, writing to {}", existing.display());
        return Ok(None);
    }

    if tracing::dispatcher::has_been_set() {
        debug!("A global subscriber is already installed, skipping log file setup");
        return Ok(None);
    }

    fs::create_dir_all(log_dir)?;
    let file_name = run_log_file_name(Local::now());
    let log_file = log_dir.join(&file_name);

    let file_appender = tracing_appender::rolling::never(log_dir, &file_name);
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .json()
        .with_writer(non_blocking_writer)
        .with_filter(LevelFilter::DEBUG);

    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stdout)
        .with_filter(console_filter);

    if tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .is_err()
    {
        // Lost a race with another subscriber; drop the unused sink file
        drop(guard);
        let _ = fs::remove_file(&log_file);
        return Ok(None);
    }

    let _ = LOG_FILE.set(log_file.clone());
    Ok(Some(LogHandle {
        log_file,
        _guard: guard,
    }))
}

/// Outcome of a retention sweep
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub failed: usize,
}

/// Delete `*.log` files in `log_dir` last modified more than `days` days ago.
///
/// A missing directory is a no-op; per-file failures are logged and counted.
pub fn cleanup_old_logs(log_dir: &Path, days: u32) -> CleanupReport {
    let mut report = CleanupReport::default();
    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(_) => return report,
    };

    let window = Duration::from_secs(u64::from(days) * 24 * 60 * 60);
    let cutoff = SystemTime::now()
        .checked_sub(window)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("log") || !path.is_file() {
            continue;
        }
        let expired = match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => modified < cutoff,
            Err(e) => {
                warn!("Failed to stat {}: {}", path.display(), e);
                report.failed += 1;
                continue;
            }
        };
        if !expired {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("Deleted old log file: {}", path.display());
                report.removed.push(path);
            }
            Err(e) => {
                warn!("Failed to delete {}: {}", path.display(), e);
                report.failed += 1;
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs::File;
    use tempfile::tempdir;

    fn age(path: &Path, days: u64) {
        let when = SystemTime::now() - Duration::from_secs(days * 24 * 60 * 60);
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(when)
            .unwrap();
    }

    #[test]
    fn test_run_log_file_name() {
        let at = Local.with_ymd_and_hms(2025, 2, 3, 4, 5, 6).unwrap();
        assert_eq!(run_log_file_name(at), "run_20250203_040506.log");
    }

    #[test]
    fn test_cleanup_removes_only_expired_log_files() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path();
        for name in ["run_old.log", "run_new.log", "notes.txt"] {
            fs::write(dir.join(name), b"x").unwrap();
        }
        age(&dir.join("run_old.log"), 10);
        age(&dir.join("notes.txt"), 10);
        age(&dir.join("run_new.log"), 2);

        let report = cleanup_old_logs(dir, 7);
        assert_eq!(report.removed, vec![dir.join("run_old.log")]);
        assert_eq!(report.failed, 0);
        assert!(dir.join("run_new.log").exists());
        assert!(dir.join("notes.txt").exists());
    }

    #[test]
    fn test_cleanup_missing_directory_is_noop() {
        let tmp = tempdir().unwrap();
        let report = cleanup_old_logs(&tmp.path().join("logs"), 7);
        assert!(report.removed.is_empty());
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        let tmp = tempdir().unwrap();
        let first = init_logging(tmp.path()).unwrap();
        let second = init_logging(tmp.path()).unwrap();
        assert!(second.is_none());
        if let Some(handle) = first {
            assert!(handle.log_file.starts_with(tmp.path()));
            assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
        }
    }
}
