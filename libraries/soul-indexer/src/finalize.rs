//! Delete, cleanup and optimize passes that follow a sync

use crate::cycle::Cycle;
use crate::{analysis, Result};
use soul_core::SyncType;
use soul_storage::{maintenance, playlists, tracks};
use std::path::Path;

pub(crate) async fn run(cycle: &Cycle, sync_type: SyncType) -> Result<()> {
    tracing::info!("cleanup 1/2");

    if sync_type != SyncType::Sources && !cycle.bail() {
        sync_delete(cycle).await?;
    }

    tracing::info!("cleanup 2/2");

    if !cycle.bail() {
        sync_cleanup(cycle).await?;
    }

    tracing::info!("optimizing");

    if !cycle.bail() {
        sync_optimize(cycle).await?;
    }

    if !cycle.bail() {
        analysis::run(cycle).await?;
    }

    Ok(())
}

/// Drop local tracks whose root is gone, and optionally those whose file is
async fn sync_delete(cycle: &Cycle) -> Result<()> {
    let mut tx = cycle.pool.begin().await?;

    let unrooted = maintenance::delete_tracks_without_path(&mut tx).await?;
    tracing::debug!(removed = unrooted, "removed tracks outside registered roots");

    if cycle.shared.config.remove_missing_files {
        let mut missing = 0_u64;
        for (id, filename) in tracks::local_files(&mut tx).await? {
            if cycle.bail() {
                break;
            }
            if !Path::new(&filename).exists() && tracks::delete(&mut tx, id).await? {
                missing += 1;
            }
        }
        tracing::debug!(removed = missing, "removed tracks for missing files");
    }

    tx.commit().await?;
    Ok(())
}

/// Remove orphaned lookup rows and stale playlist entries, repair playlist
/// order, then reclaim space
async fn sync_cleanup(cycle: &Cycle) -> Result<()> {
    let mut tx = cycle.pool.begin().await?;

    maintenance::cleanup(&mut tx).await?;

    // Sources with stable ids keep their playlist entries resolvable
    for source in &cycle.shared.plugins.sources {
        if cycle.bail() {
            break;
        }
        if !source.has_stable_ids() {
            let source_id = source.source_id();
            let removed = playlists::remove_unresolved_entries(&mut tx, source_id).await?;
            if removed > 0 {
                tracing::info!(source_id, removed, "removed unresolved playlist entries");
            }
        }
    }

    let repaired = playlists::repair_sort_order(&mut tx).await?;
    tracing::debug!(playlists = repaired, "repaired playlist order");

    tx.commit().await?;

    let mut conn = cycle.pool.acquire().await?;
    maintenance::vacuum(&mut conn).await?;
    Ok(())
}

async fn sync_optimize(cycle: &Cycle) -> Result<()> {
    let mut tx = cycle.pool.begin().await?;
    let ordered = maintenance::optimize(&mut tx).await?;
    tx.commit().await?;

    tracing::debug!(rows = ordered, "assigned sort order");
    Ok(())
}
