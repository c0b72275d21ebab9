//! Optional plain-text log of per-file scan outcomes
//!
//! Owned by one [`Indexer`](crate::Indexer): opened at construction and
//! flushed when the instance is dropped.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

/// Outcome of one file visited by the directory walker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileOutcome {
    NeedsIndexing,
    CanRead,
    DidRead,
    ReadFailed,
    Unchanged,
}

impl FileOutcome {
    fn label(self) -> &'static str {
        match self {
            Self::NeedsIndexing => "needs to be indexed",
            Self::CanRead => "can read",
            Self::DidRead => "did read",
            Self::ReadFailed => "read failed",
            Self::Unchanged => "does not need to be indexed",
        }
    }
}

#[derive(Default)]
pub(crate) struct ScanLog {
    file: Option<Mutex<BufWriter<File>>>,
}

impl ScanLog {
    /// Truncate and open `path`; a failure disables the log
    pub(crate) fn open(path: &Path) -> Self {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("Cannot create {}: {}", parent.display(), e);
            }
        }

        match File::create(path) {
            Ok(file) => {
                tracing::info!(path = %path.display(), "writing indexer log");
                Self {
                    file: Some(Mutex::new(BufWriter::new(file))),
                }
            }
            Err(e) => {
                tracing::warn!("Cannot open indexer log {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    fn write(&self, line: std::fmt::Arguments<'_>) {
        if let Some(file) = &self.file {
            let mut file = file.lock().unwrap_or_else(PoisonError::into_inner);
            // A full disk must not stop the scan
            let _ = file.write_fmt(line);
        }
    }

    pub(crate) fn cycle_started(&self, description: &str) {
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        self.write(format_args!("\n[{now}] {description}\n"));
    }

    pub(crate) fn section(&self, title: &str) {
        self.write(format_args!("\n\n{title}\n"));
    }

    pub(crate) fn file(&self, outcome: FileOutcome, path: &Path) {
        self.write(format_args!(
            "    - [{}] {}\n",
            outcome.label(),
            path.display()
        ));
    }

    pub(crate) fn track(&self, filename: &str) {
        self.write(format_args!("    - {filename}\n"));
    }

    pub(crate) fn flush(&self) {
        if let Some(file) = &self.file {
            let mut file = file.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = file.flush() {
                tracing::warn!("Failed to flush indexer log: {}", e);
            }
        }
    }
}

impl Drop for ScanLog {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_outcomes_and_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("indexer_log.txt");

        let log = ScanLog::open(&path);
        assert!(log.is_enabled());
        log.section("SYNCING LOCAL FILES:");
        log.file(FileOutcome::NeedsIndexing, Path::new("/music/a.flac"));
        log.file(FileOutcome::Unchanged, Path::new("/music/b.flac"));
        log.track("stream://1/abc");
        drop(log);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("SYNCING LOCAL FILES:"));
        assert!(text.contains("    - [needs to be indexed] /music/a.flac"));
        assert!(text.contains("    - [does not need to be indexed] /music/b.flac"));
        assert!(text.contains("    - stream://1/abc"));
    }

    #[test]
    fn disabled_log_is_silent() {
        let log = ScanLog::default();
        assert!(!log.is_enabled());
        log.section("ignored");
        log.flush();
    }
}
