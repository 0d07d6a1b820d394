//! Logging setup for terrastat binaries.
//!
//! Everything at the configured level goes to a size-rotated file under
//! `$TERRASTAT_HOME/logs`; stderr only shows warnings unless `verbose` is set.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "terrastat=info,terrastat_pipeline=info,terrastat_db=info";
const QUIET_CONSOLE_FILTER: &str = "warn";
const HOME_ENV: &str = "TERRASTAT_HOME";
const MAX_LOG_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Logging configuration.
pub struct LogConfig<'a> {
    /// Base name of the log file (`<app_name>.log`)
    pub app_name: &'a str,
    /// Mirror the file filter on stderr instead of warnings only
    pub verbose: bool,
    /// Log directory override; defaults to [`logs_dir`]
    pub log_dir: Option<PathBuf>,
}

/// Install the global subscriber: rolling file plus stderr.
///
/// `RUST_LOG` overrides the default filter for both outputs.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let log_dir = match config.log_dir {
        Some(dir) => dir,
        None => logs_dir(),
    };
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create logs directory: {}", log_dir.display()))?;

    let file_writer = SharedRollingWriter::open(&log_dir, config.app_name)
        .context("Failed to initialize rolling log writer")?;

    let file_filter = file_filter();
    let console_filter = if config.verbose {
        file_filter.clone()
    } else {
        EnvFilter::new(QUIET_CONSOLE_FILTER)
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(())
}

fn file_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Terrastat home directory.
///
/// 1) TERRASTAT_HOME
/// 2) ~/.terrastat
/// 3) ./.terrastat
pub fn terrastat_home() -> PathBuf {
    if let Ok(override_path) = std::env::var(HOME_ENV) {
        return PathBuf::from(override_path);
    }
    match dirs::home_dir() {
        Some(home) => home.join(".terrastat"),
        None => PathBuf::from(".").join(".terrastat"),
    }
}

/// Logs directory: ~/.terrastat/logs
pub fn logs_dir() -> PathBuf {
    terrastat_home().join("logs")
}

// ============================================================================
// Size-rotated log file
// ============================================================================

/// `<name>.log` with up to `keep - 1` older generations `<name>.log.1`, `.2`, ...
struct RollingFile {
    dir: PathBuf,
    name: String,
    keep: usize,
    limit: u64,
    file: Option<File>,
    written: u64,
}

impl RollingFile {
    fn open(dir: &Path, name: &str, keep: usize, limit: u64) -> io::Result<Self> {
        let mut rolling = Self {
            dir: dir.to_path_buf(),
            name: file_stem(name),
            keep: keep.max(1),
            limit,
            file: None,
            written: 0,
        };
        rolling.reopen()?;
        if rolling.written > rolling.limit {
            rolling.roll()?;
        }
        Ok(rolling)
    }

    fn active_path(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.name))
    }

    fn generation_path(&self, generation: usize) -> PathBuf {
        self.dir.join(format!("{}.log.{}", self.name, generation))
    }

    fn reopen(&mut self) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.active_path())?;
        self.written = file.metadata()?.len();
        self.file = Some(file);
        Ok(())
    }

    /// Shift every generation up by one and start a new active file.
    fn roll(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }

        let oldest = self.keep - 1;
        if oldest == 0 {
            // Nothing is kept: truncate the active file instead.
            File::create(self.active_path())?;
            return self.reopen();
        }

        let last = self.generation_path(oldest);
        if last.exists() {
            fs::remove_file(&last)?;
        }
        for generation in (1..oldest).rev() {
            let from = self.generation_path(generation);
            if from.exists() {
                fs::rename(&from, self.generation_path(generation + 1))?;
            }
        }
        let active = self.active_path();
        if active.exists() {
            fs::rename(&active, self.generation_path(1))?;
        }

        self.reopen()
    }
}

impl Write for RollingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.limit {
            self.roll()?;
        }

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file unavailable"))?;
        let bytes = file.write(buf)?;
        self.written += bytes as u64;
        Ok(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// Cloneable handle handed to `tracing_subscriber::fmt`.
#[derive(Clone)]
struct SharedRollingWriter {
    inner: Arc<Mutex<RollingFile>>,
}

impl SharedRollingWriter {
    fn open(dir: &Path, app_name: &str) -> Result<Self> {
        let file = RollingFile::open(dir, app_name, MAX_LOG_FILES, MAX_LOG_FILE_SIZE)
            .with_context(|| format!("Failed to open log file for {}", app_name))?;
        Ok(Self {
            inner: Arc::new(Mutex::new(file)),
        })
    }

    fn with_file<T>(&self, f: impl FnOnce(&mut RollingFile) -> io::Result<T>) -> io::Result<T> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        f(&mut guard)
    }
}

impl Write for SharedRollingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_file(|file| file.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_file(|file| file.flush())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedRollingWriter {
    type Writer = SharedRollingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_stem_replaces_separators() {
        assert_eq!(file_stem("terrastat"), "terrastat");
        assert_eq!(file_stem("../evil name"), "___evil_name");
    }

    #[test]
    fn test_rolls_when_limit_exceeded() {
        let dir = TempDir::new().unwrap();
        let mut file = RollingFile::open(dir.path(), "app", 3, 10).unwrap();

        file.write_all(b"0123456789").unwrap();
        file.write_all(b"abcdef").unwrap();
        file.flush().unwrap();

        let active = fs::read_to_string(dir.path().join("app.log")).unwrap();
        let first = fs::read_to_string(dir.path().join("app.log.1")).unwrap();
        assert_eq!(active, "abcdef");
        assert_eq!(first, "0123456789");
    }

    #[test]
    fn test_keeps_bounded_generations() {
        let dir = TempDir::new().unwrap();
        let mut file = RollingFile::open(dir.path(), "app", 3, 4).unwrap();

        for chunk in [b"aaaa", b"bbbb", b"cccc", b"dddd"] {
            file.write_all(chunk).unwrap();
        }
        file.flush().unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("app.log")).unwrap(), "dddd");
        assert_eq!(fs::read_to_string(dir.path().join("app.log.1")).unwrap(), "cccc");
        assert_eq!(fs::read_to_string(dir.path().join("app.log.2")).unwrap(), "bbbb");
        assert!(!dir.path().join("app.log.3").exists());
    }

    #[test]
    fn test_home_override() {
        std::env::set_var(HOME_ENV, "/srv/terrastat");
        assert_eq!(terrastat_home(), PathBuf::from("/srv/terrastat"));
        assert_eq!(logs_dir(), PathBuf::from("/srv/terrastat/logs"));
        std::env::remove_var(HOME_ENV);
    }
}
