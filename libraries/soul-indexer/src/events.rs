//! Scan lifecycle notifications

use serde::Serialize;

/// Emitted on the indexer's broadcast channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "tracks", rename_all = "snake_case")]
pub enum IndexerEvent {
    /// A scan cycle was dequeued
    Started,
    /// Cumulative number of files and source tracks processed so far
    Progress(u64),
    /// The cycle completed without cancellation
    Finished(u64),
}

pub(crate) const EVENT_CAPACITY: usize = 256;
