//! Asynchronous, line-buffered file logger.
//!
//! Writes never block the caller: `tracing_appender::non_blocking` hands the
//! formatted line to a bounded channel drained by a dedicated writer thread.
//! Dropping the returned guard flushes pending lines before the process
//! exits.

use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub struct Logger {
    path: PathBuf,
    level: Level,
    guard: Option<WorkerGuard>,
}

impl Default for Logger {
    fn default() -> Self {
        Self {
            path: PathBuf::from("server.log"),
            level: Level::INFO,
            guard: None,
        }
    }
}

impl Logger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Points subsequent `start()` calls at a new log file. No effect on an
    /// already-started logger until `stop()` + `start()` again.
    pub fn set_file(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.path = path.into();
        self
    }

    pub fn set_level(&mut self, level: Level) -> &mut Self {
        self.level = level;
        self
    }

    /// Spins up the background writer thread and installs the global
    /// subscriber. Idempotent: a second call is a no-op while already
    /// started.
    pub fn start(&mut self) -> std::io::Result<()> {
        if self.guard.is_some() {
            return Ok(());
        }
        let dir = self.path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(dir) = dir {
            std::fs::create_dir_all(dir)?;
        }
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_owned())
            .unwrap_or_else(|| "server.log".into());
        let dir: &Path = dir.unwrap_or_else(|| Path::new("."));
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        let filter = EnvFilter::builder()
            .with_default_directive(self.level.into())
            .from_env_lossy();

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(false)
            .finish();

        // Best-effort: a second logger in the same process (e.g. tests) may
        // already have installed one.
        let _ = tracing::subscriber::set_global_default(subscriber);

        self.guard = Some(guard);
        Ok(())
    }

    /// Flushes and tears down the background writer.
    pub fn stop(&mut self) {
        self.guard.take();
    }
}

pub use tracing::{debug, error, info, warn};
