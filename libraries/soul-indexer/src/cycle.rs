//! One scan cycle: path changes, orphan sweep, sources, local files,
//! then the finalize passes

use crate::events::IndexerEvent;
use crate::indexer::Shared;
use crate::state::PathChange;
use crate::transaction::{ScanCounters, TrackTransaction};
use crate::{finalize, sources, walker, Result};
use soul_core::{ScanResult, SourceId, SyncContext, SyncType, LOCAL_SOURCE_ID};
use soul_storage::paths::PathRow;
use soul_storage::{paths, schema, tracks};
use sqlx::{SqliteConnection, SqlitePool};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Handles shared by everything running inside a cycle
#[derive(Clone)]
pub(crate) struct Cycle {
    pub(crate) shared: Arc<Shared>,
    pub(crate) pool: SqlitePool,
    pub(crate) tx: Arc<Mutex<TrackTransaction>>,
    pub(crate) counters: Arc<ScanCounters>,
}

pub(crate) async fn run(shared: Arc<Shared>, context: SyncContext) -> Result<()> {
    let pool = soul_storage::open_indexer_pool(&shared.config.database_url).await?;
    let tx = TrackTransaction::begin(pool.clone()).await?;

    let cycle = Cycle {
        counters: Arc::new(ScanCounters::new(shared.config.transaction_interval)),
        shared,
        pool: pool.clone(),
        tx: Arc::new(Mutex::new(tx)),
    };

    let result = cycle.execute(context).await;

    if result.is_err() {
        let mut tx = cycle.tx.lock().await;
        tx.cancel();
        if let Err(e) = tx.finish().await {
            tracing::warn!("Failed to roll back track transaction: {}", e);
        }
    }

    pool.close().await;
    result
}

impl Cycle {
    pub(crate) fn bail(&self) -> bool {
        self.shared.bail()
    }

    /// Count processed files or source tracks; call with the write lock held
    ///
    /// Every `transaction_interval` items the batch is committed and a
    /// progress event goes out.
    pub(crate) async fn count_processed(
        &self,
        tx: &mut TrackTransaction,
        delta: u64,
    ) -> Result<()> {
        if let Some(total) = self.counters.add(delta) {
            tx.commit_and_restart().await?;
            tracing::debug!(tracks = total, "progress");
            self.shared.emit(IndexerEvent::Progress(total));
        }
        Ok(())
    }

    async fn execute(&self, context: SyncContext) -> Result<()> {
        tracing::info!(
            sync_type = %context.sync_type,
            source_id = context.source_id,
            "indexer cycle starting"
        );
        self.shared.scan_log.cycle_started(&format!(
            "sync {} (source {})",
            context.sync_type, context.source_id
        ));

        self.synchronize(context).await?;
        self.tx.lock().await.finish().await?;

        finalize::run(self, context.sync_type).await?;

        if !self.bail() {
            let total = self.counters.total();
            self.shared.emit(IndexerEvent::Progress(total));
            self.shared.emit(IndexerEvent::Finished(total));
        }

        tracing::info!(tracks = self.counters.total(), "indexer cycle done");
        Ok(())
    }

    async fn synchronize(&self, context: SyncContext) -> Result<()> {
        {
            let mut tx = self.tx.lock().await;
            let conn = tx.conn()?;
            schema::create_indexes(conn).await?;
            self.apply_path_changes(conn).await?;
        }

        self.counters.reset();
        self.sweep_orphans().await?;

        let mut sync_type = context.sync_type;
        if sync_type == SyncType::Rebuild {
            self.prepare_rebuild().await?;
            sync_type = SyncType::All;
        }

        // Sweeps above must survive a source that rolls back its own batch
        self.tx.lock().await.commit_and_restart().await?;

        let roots = self.live_roots().await?;
        self.sync_sources(context.target_source(), &roots).await?;

        if sync_type != SyncType::Sources {
            self.shared.scan_log.section("SYNCING LOCAL FILES:");
            walker::sync_local(self, &roots).await?;

            let mut tx = self.tx.lock().await;
            tx.commit_and_restart().await?;
            schema::create_indexes(tx.conn()?).await?;
        }

        Ok(())
    }

    async fn apply_path_changes(&self, conn: &mut SqliteConnection) -> Result<()> {
        for change in self.shared.take_path_changes() {
            match change {
                PathChange::Add(path) => {
                    tracing::info!(path = %path, "adding root directory");
                    paths::add(conn, &path).await?;
                }
                PathChange::Remove(path) => {
                    tracing::info!(path = %path, "removing root directory");
                    paths::remove(conn, &path).await?;
                }
            }
        }
        Ok(())
    }

    /// Remove tracks whose source is no longer configured; runs for every
    /// sync type
    async fn sweep_orphans(&self) -> Result<()> {
        let configured = self.shared.plugins.source_ids();

        let mut tx = self.tx.lock().await;
        let conn = tx.conn()?;
        for source_id in tracks::orphaned_source_ids(conn, &configured).await? {
            let removed = tracks::remove_all_for_source(conn, source_id).await?;
            tracing::info!(source_id, removed, "removed tracks of unknown source");
        }
        Ok(())
    }

    /// Force every local file to be re-read and purge sources that can
    /// rebuild their tracks from scratch
    async fn prepare_rebuild(&self) -> Result<()> {
        let mut tx = self.tx.lock().await;
        let conn = tx.conn()?;

        let invalidated = tracks::invalidate_metadata(conn).await?;
        tracing::info!(tracks = invalidated, "rebuild: invalidated track metadata");

        for source in &self.shared.plugins.sources {
            let source_id = source.source_id();
            if source_id != LOCAL_SOURCE_ID && source.has_stable_ids() {
                let removed = tracks::remove_all_for_source(conn, source_id).await?;
                tracing::info!(source_id, removed, "rebuild: purged source");
            }
        }
        Ok(())
    }

    /// Registered roots that still exist on disk
    async fn live_roots(&self) -> Result<Vec<PathRow>> {
        let rows = {
            let mut tx = self.tx.lock().await;
            paths::all(tx.conn()?).await?
        };

        Ok(rows
            .into_iter()
            .filter(|row| Path::new(&row.path).is_dir())
            .collect())
    }

    async fn sync_sources(&self, target: Option<SourceId>, roots: &[PathRow]) -> Result<()> {
        let root_paths: Vec<PathBuf> = roots.iter().map(|row| PathBuf::from(&row.path)).collect();

        for source in &self.shared.plugins.sources {
            if self.bail() {
                break;
            }

            if target.is_some_and(|id| id != source.source_id()) {
                continue;
            }

            self.shared.set_current_source(Some(Arc::clone(source)));
            let result = sources::sync_source(self, Arc::clone(source), &root_paths).await;

            {
                let mut tx = self.tx.lock().await;
                if result == ScanResult::Rollback {
                    tx.cancel();
                }
                tx.commit_and_restart().await?;
            }

            if target.is_some() {
                break;
            }
        }

        self.shared.set_current_source(None);
        Ok(())
    }
}
