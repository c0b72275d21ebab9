//! Batched writes for a scan cycle
//!
//! A cycle keeps one transaction open on its single connection and commits
//! it every `transaction_interval` processed files, bounding the WAL and
//! giving progress a point to report at.

use crate::error::IndexerError;
use crate::Result;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::sync::atomic::{AtomicU64, Ordering};

/// The cycle's open transaction
///
/// Shared behind a `tokio::sync::Mutex`; holding that lock is what
/// serializes writes from concurrent file workers.
pub(crate) struct TrackTransaction {
    pool: SqlitePool,
    tx: Option<Transaction<'static, Sqlite>>,
    cancelled: bool,
}

impl TrackTransaction {
    pub(crate) async fn begin(pool: SqlitePool) -> Result<Self> {
        let tx = pool.begin().await?;
        Ok(Self {
            pool,
            tx: Some(tx),
            cancelled: false,
        })
    }

    pub(crate) fn conn(&mut self) -> Result<&mut SqliteConnection> {
        self.tx.as_deref_mut().ok_or(IndexerError::NoTransaction)
    }

    /// Discard the current batch at the next commit point
    pub(crate) fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Commit (or roll back, after [`cancel`](Self::cancel)) and open a new batch
    pub(crate) async fn commit_and_restart(&mut self) -> Result<()> {
        self.close().await?;
        self.tx = Some(self.pool.begin().await?);
        Ok(())
    }

    /// Close the batch for good, releasing the connection
    pub(crate) async fn finish(&mut self) -> Result<()> {
        self.close().await
    }

    async fn close(&mut self) -> Result<()> {
        let cancelled = std::mem::take(&mut self.cancelled);
        if let Some(tx) = self.tx.take() {
            if cancelled {
                tracing::debug!("rolling back track transaction");
                tx.rollback().await?;
            } else {
                tx.commit().await?;
            }
        }
        Ok(())
    }
}

/// Processed-file counters for one cycle
pub(crate) struct ScanCounters {
    incremental: AtomicU64,
    total: AtomicU64,
    interval: u64,
}

impl ScanCounters {
    pub(crate) fn new(interval: u64) -> Self {
        Self {
            incremental: AtomicU64::new(0),
            total: AtomicU64::new(0),
            interval,
        }
    }

    pub(crate) fn reset(&self) {
        self.incremental.store(0, Ordering::SeqCst);
        self.total.store(0, Ordering::SeqCst);
    }

    pub(crate) fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    /// Count `delta` processed items
    ///
    /// Returns the cumulative total when a commit point was crossed.
    pub(crate) fn add(&self, delta: u64) -> Option<u64> {
        let total = self.total.fetch_add(delta, Ordering::SeqCst) + delta;
        let incremental = self.incremental.fetch_add(delta, Ordering::SeqCst) + delta;

        if incremental >= self.interval {
            self.incremental.store(0, Ordering::SeqCst);
            Some(total)
        } else {
            None
        }
    }
}
