//! Source sync protocol and the writer handed to plugin sources

use crate::cycle::Cycle;
use crate::Result;
use async_trait::async_trait;
use futures::FutureExt;
use soul_core::types::keys;
use soul_core::{
    IndexerSource, IndexerWriter, ScanPaths, ScanResult, SourceId, SyncContext, SyncType,
    TagStore, TrackId, TrackRecord, LOCAL_SOURCE_ID,
};
use soul_storage::tracks;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

/// Drive one source through before-scan, scan, per-track refresh and
/// after-scan
///
/// Anything short of an explicit `Commit` from the bulk scan is a rollback.
pub(crate) async fn sync_source(
    cycle: &Cycle,
    source: Arc<dyn IndexerSource>,
    roots: &[PathBuf],
) -> ScanResult {
    let source_id = source.source_id();
    tracing::info!(source_id, "indexer source running");

    if source_id == LOCAL_SOURCE_ID {
        tracing::warn!("Rejecting source with reserved id 0");
        return ScanResult::Rollback;
    }

    let writer = SourceWriter::new(cycle.clone());

    if AssertUnwindSafe(source.on_before_scan())
        .catch_unwind()
        .await
        .is_err()
    {
        tracing::error!(source_id, "on_before_scan panicked");
    }

    let scan_paths = ScanPaths::new(roots.to_vec());
    let outcome = AssertUnwindSafe(source.scan(&writer, &scan_paths))
        .catch_unwind()
        .await;
    drop(scan_paths);

    let result = match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            tracing::error!(source_id, "failed to index source: {}", e);
            ScanResult::Rollback
        }
        Err(_) => {
            tracing::error!(source_id, "indexer source crashed during scan");
            ScanResult::Rollback
        }
    };

    if !cycle.bail() && source.needs_track_scan() {
        if let Err(e) = scan_tracks(cycle, &writer, source.as_ref()).await {
            tracing::error!(source_id, "per-track scan failed: {}", e);
        }
    }

    tracing::info!(source_id, ?result, "indexer source finished");

    if AssertUnwindSafe(source.on_after_scan())
        .catch_unwind()
        .await
        .is_err()
    {
        tracing::error!(source_id, "on_after_scan panicked");
    }

    result
}

/// Offer every track the source already owns to its `scan_track` hook
async fn scan_tracks(
    cycle: &Cycle,
    writer: &SourceWriter,
    source: &dyn IndexerSource,
) -> Result<()> {
    let source_id = source.source_id();
    let owned = {
        let mut tx = cycle.tx.lock().await;
        tracks::for_source(tx.conn()?, source_id).await?
    };

    for entry in owned {
        if cycle.bail() {
            break;
        }

        let track = {
            let mut tx = cycle.tx.lock().await;
            tracks::load(tx.conn()?, entry.id).await?
        };
        let Some(track) = track else {
            continue;
        };

        cycle
            .shared
            .scan_log
            .track(entry.filename.as_deref().unwrap_or_default());

        let external_id = entry.external_id.unwrap_or_default();
        match AssertUnwindSafe(source.scan_track(writer, track, &external_id))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(source_id, %external_id, "scan_track failed: {}", e),
            Err(_) => {
                tracing::error!(source_id, %external_id, "indexer source crashed during track scan");
                break;
            }
        }
    }

    Ok(())
}

/// The only path through which source plugins change the store
///
/// Every call rejects the reserved source id and empty arguments before
/// touching storage; storage errors are logged and reported as failure.
pub(crate) struct SourceWriter {
    cycle: Cycle,
}

impl SourceWriter {
    pub(crate) fn new(cycle: Cycle) -> Self {
        Self { cycle }
    }

    fn accepts(source: &dyn IndexerSource, operation: &str) -> Option<SourceId> {
        let source_id = source.source_id();
        if source_id == LOCAL_SOURCE_ID {
            tracing::warn!(operation, "rejected write from source with reserved id 0");
            None
        } else {
            Some(source_id)
        }
    }

    async fn try_save(&self, mut track: TrackRecord) -> Result<TrackId> {
        let mut tx = self.cycle.tx.lock().await;
        Ok(tracks::save(tx.conn()?, &mut track).await?)
    }

    async fn try_remove_by_uri(&self, source_id: SourceId, uri: &str) -> Result<u64> {
        let mut tx = self.cycle.tx.lock().await;
        Ok(tracks::remove_by_uri(tx.conn()?, source_id, uri).await?)
    }

    async fn try_remove_by_external_id(&self, source_id: SourceId, id: &str) -> Result<u64> {
        let mut tx = self.cycle.tx.lock().await;
        Ok(tracks::remove_by_external_id(tx.conn()?, source_id, id).await?)
    }

    async fn try_remove_all(&self, source_id: SourceId) -> Result<u64> {
        let mut tx = self.cycle.tx.lock().await;
        Ok(tracks::remove_all_for_source(tx.conn()?, source_id).await?)
    }

    async fn try_commit_progress(&self, source_id: SourceId, updated: u64) -> Result<()> {
        let mut tx = self.cycle.tx.lock().await;
        if self.cycle.shared.is_current_source(source_id) {
            tx.commit_and_restart().await?;
        }
        if updated > 0 {
            self.cycle.count_processed(&mut tx, updated).await?;
        }
        Ok(())
    }

    async fn try_last_modified_time(
        &self,
        source_id: SourceId,
        external_id: &str,
    ) -> Result<Option<i64>> {
        let mut tx = self.cycle.tx.lock().await;
        Ok(tracks::last_modified_time(tx.conn()?, source_id, external_id).await?)
    }
}

#[async_trait]
impl IndexerWriter for SourceWriter {
    fn create_writer(&self) -> TrackRecord {
        TrackRecord::new()
    }

    async fn save(&self, source: &dyn IndexerSource, track: TrackRecord, external_id: &str) -> bool {
        let Some(source_id) = Self::accepts(source, "save") else {
            return false;
        };
        if external_id.is_empty() {
            return false;
        }

        // Rows are resolved by (source_id, external_id) only
        let mut track = track;
        track.clear_id();
        track.clear_value(keys::PATH_ID);
        track.replace(keys::EXTERNAL_ID, external_id);
        track.replace(keys::SOURCE_ID, &source_id.to_string());

        match self.try_save(track).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(source_id, external_id, "save failed: {}", e);
                false
            }
        }
    }

    async fn remove_by_uri(&self, source: &dyn IndexerSource, uri: &str) -> bool {
        let Some(source_id) = Self::accepts(source, "remove_by_uri") else {
            return false;
        };
        if uri.is_empty() {
            return false;
        }

        match self.try_remove_by_uri(source_id, uri).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(source_id, uri, "remove_by_uri failed: {}", e);
                false
            }
        }
    }

    async fn remove_by_external_id(&self, source: &dyn IndexerSource, external_id: &str) -> bool {
        let Some(source_id) = Self::accepts(source, "remove_by_external_id") else {
            return false;
        };
        if external_id.is_empty() {
            return false;
        }

        match self.try_remove_by_external_id(source_id, external_id).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(source_id, external_id, "remove_by_external_id failed: {}", e);
                false
            }
        }
    }

    async fn remove_all(&self, source: &dyn IndexerSource) -> u64 {
        let Some(source_id) = Self::accepts(source, "remove_all") else {
            return 0;
        };

        self.try_remove_all(source_id).await.unwrap_or_else(|e| {
            tracing::warn!(source_id, "remove_all failed: {}", e);
            0
        })
    }

    async fn commit_progress(&self, source: &dyn IndexerSource, updated_tracks: u64) {
        let Some(source_id) = Self::accepts(source, "commit_progress") else {
            return;
        };

        if let Err(e) = self.try_commit_progress(source_id, updated_tracks).await {
            tracing::warn!(source_id, "commit_progress failed: {}", e);
        }
    }

    async fn last_modified_time(&self, source: &dyn IndexerSource, external_id: &str) -> Option<i64> {
        let source_id = Self::accepts(source, "last_modified_time")?;
        if external_id.is_empty() {
            return None;
        }

        self.try_last_modified_time(source_id, external_id)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(source_id, external_id, "last_modified_time failed: {}", e);
                None
            })
    }

    fn schedule_rescan(&self, source: &dyn IndexerSource) {
        if let Some(source_id) = Self::accepts(source, "schedule_rescan") {
            self.cycle
                .shared
                .enqueue(SyncContext::new(SyncType::Sources, Some(source_id)));
        }
    }
}
