//! Directory traversal and per-file tag extraction
//!
//! The walk itself runs on the indexer thread. With more than one worker,
//! every readable file becomes a task on the cycle runtime, bounded by a
//! semaphore so the walk pauses while all workers are busy. With a single
//! worker, files are processed inline as they are found.

use crate::cycle::Cycle;
use crate::indexer::{extension_of, PluginRegistry};
use crate::scan_log::{FileOutcome, ScanLog};
use crate::Result;
use sha2::{Digest, Sha256};
use soul_core::types::keys;
use soul_core::{TrackRecord, LOCAL_SOURCE_ID};
use soul_storage::paths::PathRow;
use soul_storage::tracks::{self, FileSignature};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use walkdir::WalkDir;

pub(crate) async fn sync_local(cycle: &Cycle, roots: &[PathRow]) -> Result<()> {
    let threads = cycle.shared.config.thread_count;
    let inline = threads <= 1;
    let permits = Arc::new(Semaphore::new(threads));
    let mut tasks = JoinSet::new();

    'roots: for root in roots {
        if cycle.bail() {
            break;
        }

        tracing::info!(path = %root.path, "scanning");

        for entry in WalkDir::new(&root.path).follow_links(true) {
            if cycle.bail() {
                break 'roots;
            }

            // Permission errors, broken links and loops skip just this entry
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("Skipping entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() || !cycle.shared.plugins.can_read(entry.path()) {
                continue;
            }

            let job = FileJob {
                cycle: cycle.clone(),
                path: entry.into_path(),
                path_id: root.id,
                inline,
            };

            if inline {
                job.run().await;
                continue;
            }

            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break 'roots;
            };
            tasks.spawn(async move {
                let _permit = permit;
                job.run().await;
            });
        }
    }

    // Nothing outlives the local-files phase
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::warn!("File task failed: {}", e);
        }
    }

    Ok(())
}

/// Whether the stored signature differs from what is on disk
///
/// A zero `filetime` marks a track invalidated by a rebuild.
pub(crate) fn needs_indexing(stored: Option<FileSignature>, filesize: i64, filetime: i64) -> bool {
    match stored {
        Some(signature) => {
            signature.filetime == 0
                || signature.filesize != filesize
                || signature.filetime != filetime
        }
        None => true,
    }
}

/// Stable external id of a local file
pub(crate) fn local_external_id(filename: &str) -> String {
    hex::encode(Sha256::digest(filename.as_bytes()))
}

/// Try each reader that accepts the extension until one succeeds
///
/// Every attempt writes into a fresh record so a failed reader leaves
/// nothing behind. Errors and panics count as "could not read".
pub(crate) fn read_tags(plugins: &PluginRegistry, log: &ScanLog, path: &Path) -> Option<TrackRecord> {
    let extension = extension_of(path)?;

    for reader in &plugins.tag_readers {
        if !reader.can_read(&extension) {
            continue;
        }
        log.file(FileOutcome::CanRead, path);

        let mut track = TrackRecord::new();
        match catch_unwind(AssertUnwindSafe(|| reader.read(path, &mut track))) {
            Ok(Ok(true)) => {
                log.file(FileOutcome::DidRead, path);
                return Some(track);
            }
            Ok(Ok(false)) => {}
            Ok(Err(e)) => {
                tracing::debug!(reader = reader.name(), "Cannot read {}: {}", path.display(), e);
            }
            Err(_) => {
                tracing::warn!(reader = reader.name(), "Tag reader panicked on {}", path.display());
            }
        }
    }

    log.file(FileOutcome::ReadFailed, path);
    None
}

struct FileJob {
    cycle: Cycle,
    path: PathBuf,
    path_id: i64,
    inline: bool,
}

impl FileJob {
    async fn run(self) {
        // Work may already be queued when shutdown is requested
        if self.cycle.bail() {
            return;
        }

        if let Err(e) = self.index().await {
            tracing::warn!(path = %self.path.display(), "Failed to index file: {}", e);
        }
    }

    async fn index(&self) -> Result<()> {
        let shared = &self.cycle.shared;
        let metadata = tokio::fs::metadata(&self.path).await?;
        let filesize = metadata.len() as i64;
        let filetime = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |since| since.as_secs() as i64);
        let filename = self.path.to_string_lossy().into_owned();

        let stored = {
            let mut tx = self.cycle.tx.lock().await;
            tracks::local_signature(tx.conn()?, &filename).await?
        };

        let mut track = None;
        if needs_indexing(stored, filesize, filetime) {
            shared.scan_log.file(FileOutcome::NeedsIndexing, &self.path);

            track = if self.inline {
                read_tags(&shared.plugins, &shared.scan_log, &self.path)
            } else {
                let shared = Arc::clone(shared);
                let path = self.path.clone();
                tokio::task::spawn_blocking(move || read_tags(&shared.plugins, &shared.scan_log, &path))
                    .await
                    .unwrap_or_else(|e| {
                        tracing::warn!("Tag read task failed: {}", e);
                        None
                    })
            };
        } else {
            shared.scan_log.file(FileOutcome::Unchanged, &self.path);
        }

        let mut tx = self.cycle.tx.lock().await;

        if let Some(mut track) = track {
            track.replace(keys::FILENAME, filename.as_str());
            track.replace(keys::FILESIZE, filesize.to_string());
            track.replace(keys::FILETIME, filetime.to_string());
            track.replace(keys::PATH_ID, self.path_id.to_string());
            track.replace(keys::SOURCE_ID, LOCAL_SOURCE_ID.to_string());
            track.replace(keys::EXTERNAL_ID, local_external_id(&filename));

            tracks::save(tx.conn()?, &mut track).await?;
        }

        self.cycle.count_processed(&mut tx, 1).await
    }
}
