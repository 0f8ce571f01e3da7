// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! `log` backend for the supervisord daemon.
//!
//! The backend is installed once per process with [`init`]. Where records go
//! (standard output or a size-rotated file) and the active level are held by
//! a [`LogHandle`] that the daemon owns and reconfigures on every reload.

mod file;
mod read;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{LevelFilter, Log, Metadata, Record};
use time::OffsetDateTime;
use time::macros::format_description;

pub use file::RotatingFile;
pub use read::{read_range, tail_range};

/// Default `logfile_maxbytes`.
pub const DEFAULT_MAX_BYTES: u64 = 50 * 1024 * 1024;
/// Default `logfile_backups`.
pub const DEFAULT_BACKUPS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Stdout,
    File {
        path: PathBuf,
        max_bytes: u64,
        backups: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: LevelFilter,
    pub target: Target,
}

impl LogConfig {
    pub fn stdout(level: LevelFilter) -> Self {
        Self {
            level,
            target: Target::Stdout,
        }
    }
}

enum Sink {
    Stdout,
    File(RotatingFile),
}

/// Shared handle on the installed backend.
#[derive(Clone)]
pub struct LogHandle {
    sink: Arc<Mutex<Sink>>,
}

struct Logger {
    sink: Arc<Mutex<Sink>>,
}

/// Map a supervisord `loglevel` value to a filter. Unknown values mean debug.
pub fn parse_level(level: &str) -> LevelFilter {
    match level.trim().to_ascii_lowercase().as_str() {
        "critical" | "error" => LevelFilter::Error,
        "warn" | "warning" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "trace" | "blather" => LevelFilter::Trace,
        _ => LevelFilter::Debug,
    }
}

/// Install the backend as the global `log` logger.
pub fn init(config: LogConfig) -> Result<LogHandle, log::SetLoggerError> {
    let handle = LogHandle::detached();
    // A file that cannot be opened yet falls back to stdout; the daemon
    // retries on its next reconfigure.
    let _ = handle.reconfigure(&config);
    log::set_boxed_logger(Box::new(Logger {
        sink: Arc::clone(&handle.sink),
    }))?;
    log::set_max_level(config.level);
    Ok(handle)
}

impl LogHandle {
    /// A handle writing to stdout that is not installed as the global logger.
    pub fn detached() -> Self {
        Self {
            sink: Arc::new(Mutex::new(Sink::Stdout)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Sink> {
        self.sink.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Switch target and level. On error the previous target is kept.
    pub fn reconfigure(&self, config: &LogConfig) -> io::Result<()> {
        let next = match &config.target {
            Target::Stdout => Sink::Stdout,
            Target::File {
                path,
                max_bytes,
                backups,
            } => {
                let same_file = matches!(&*self.lock(), Sink::File(f) if f.path() == path);
                if same_file {
                    let mut sink = self.lock();
                    if let Sink::File(f) = &mut *sink {
                        f.set_limits(*max_bytes, *backups);
                    }
                    log::set_max_level(config.level);
                    return Ok(());
                }
                Sink::File(RotatingFile::open(path, *max_bytes, *backups)?)
            }
        };
        *self.lock() = next;
        log::set_max_level(config.level);
        Ok(())
    }

    pub fn path(&self) -> Option<PathBuf> {
        match &*self.lock() {
            Sink::Stdout => None,
            Sink::File(f) => Some(f.path().to_path_buf()),
        }
    }

    fn require_path(&self) -> io::Result<PathBuf> {
        self.path()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "daemon logs to stdout"))
    }

    /// Read `length` bytes from `offset` of the current log file.
    pub fn read(&self, offset: i64, length: i64) -> io::Result<String> {
        read_range(&self.require_path()?, offset, length)
    }

    pub fn tail(&self, offset: i64, length: i64) -> io::Result<(String, u64, bool)> {
        tail_range(&self.require_path()?, offset, length)
    }

    /// Truncate the log file and drop its backups.
    pub fn clear(&self) -> io::Result<()> {
        match &mut *self.lock() {
            Sink::Stdout => Err(io::Error::new(
                io::ErrorKind::NotFound,
                "daemon logs to stdout",
            )),
            Sink::File(f) => f.clear(),
        }
    }

    fn write(&self, line: &str) {
        match &mut *self.lock() {
            Sink::Stdout => {
                let mut out = io::stdout().lock();
                let _ = out.write_all(line.as_bytes());
                let _ = out.flush();
            }
            Sink::File(f) => {
                if let Err(e) = f.write_line(line) {
                    let _ = writeln!(io::stderr(), "failed to write {}: {e}", f.path().display());
                }
            }
        }
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let handle = LogHandle {
            sink: Arc::clone(&self.sink),
        };
        handle.write(&format_record(OffsetDateTime::now_utc(), record));
    }

    fn flush(&self) {
        if let Sink::File(f) = &mut *self.sink.lock().unwrap_or_else(|e| e.into_inner()) {
            let _ = f.flush();
        }
    }
}

/// `2026-01-02 15:04:05.000 UTC | INFO | target | message\n`
pub fn format_record(now: OffsetDateTime, record: &Record<'_>) -> String {
    let ts = now
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
        ))
        .unwrap_or_else(|_| now.unix_timestamp().to_string());
    format!(
        "{ts} UTC | {} | {} | {}\n",
        record.level(),
        record.target(),
        record.args()
    )
}

/// Whether `path` names the process's standard output.
pub fn is_stdout_path(path: &Path) -> bool {
    path == Path::new("/dev/stdout") || path == Path::new("stdout")
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;
    use regex::Regex;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("critical"), LevelFilter::Error);
        assert_eq!(parse_level("ERROR"), LevelFilter::Error);
        assert_eq!(parse_level("warn"), LevelFilter::Warn);
        assert_eq!(parse_level(" info "), LevelFilter::Info);
        assert_eq!(parse_level("blather"), LevelFilter::Trace);
        assert_eq!(parse_level("whatever"), LevelFilter::Debug);
    }

    #[test]
    fn test_format_record() {
        let record = Record::builder()
            .level(Level::Warn)
            .target("supervisord::daemon")
            .args(format_args!("[web] exited"))
            .build();
        let line = format_record(OffsetDateTime::UNIX_EPOCH, &record);
        let re = Regex::new(
            r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\.\d{3} UTC \| WARN \| supervisord::daemon \| \[web\] exited\n$",
        )
        .unwrap();
        assert!(re.is_match(&line), "unexpected line: {line:?}");
        assert!(line.starts_with("1970-01-01 00:00:00.000"));
    }

    #[test]
    fn test_handle_file_target_read_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("supervisord.log");
        let handle = LogHandle::detached();
        handle
            .reconfigure(&LogConfig {
                level: LevelFilter::Info,
                target: Target::File {
                    path: path.clone(),
                    max_bytes: 0,
                    backups: 0,
                },
            })
            .unwrap();
        assert_eq!(handle.path(), Some(path.clone()));

        handle.write("hello\n");
        handle.write("world\n");
        assert_eq!(handle.read(0, 0).unwrap(), "hello\nworld\n");
        assert_eq!(handle.read(-6, 0).unwrap(), "world\n");

        handle.clear().unwrap();
        assert_eq!(handle.read(0, 0).unwrap(), "");
    }

    #[test]
    fn test_handle_stdout_has_no_file() {
        let handle = LogHandle::detached();
        assert!(handle.path().is_none());
        let err = handle.read(0, 0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(handle.clear().is_err());
    }

    #[test]
    fn test_reconfigure_bad_path_keeps_previous() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("a.log");
        let handle = LogHandle::detached();
        let file = |path: PathBuf| LogConfig {
            level: LevelFilter::Info,
            target: Target::File {
                path,
                max_bytes: DEFAULT_MAX_BYTES,
                backups: DEFAULT_BACKUPS,
            },
        };
        handle.reconfigure(&file(good.clone())).unwrap();
        assert!(
            handle
                .reconfigure(&file(dir.path().join("missing/dir/b.log")))
                .is_err()
        );
        assert_eq!(handle.path(), Some(good));
    }

    #[test]
    fn test_is_stdout_path() {
        assert!(is_stdout_path(Path::new("/dev/stdout")));
        assert!(!is_stdout_path(Path::new("/var/log/supervisord.log")));
    }
}
