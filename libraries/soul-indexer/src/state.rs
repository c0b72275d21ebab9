//! Lifecycle state and the shared request queue

use soul_core::{IndexerSource, SyncContext};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Lifecycle of the background indexing thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexerState {
    /// No thread running
    Stopped,
    /// Thread alive and waiting for work
    Idle,
    /// Processing a dequeued context
    Indexing,
    /// Shutdown requested; the running cycle stops at its next check
    Stopping,
}

impl IndexerState {
    /// Whether long-running loops should stop
    pub fn should_bail(self) -> bool {
        matches!(self, Self::Stopping | Self::Stopped)
    }
}

impl fmt::Display for IndexerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Idle => "idle",
            Self::Indexing => "indexing",
            Self::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Root directory registration applied at the start of the next cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PathChange {
    Add(String),
    Remove(String),
}

/// Everything guarded by the indexer's single coarse lock
pub(crate) struct Inner {
    pub(crate) state: IndexerState,
    pub(crate) queue: VecDeque<SyncContext>,
    pub(crate) paths: Vec<String>,
    pub(crate) path_changes: VecDeque<PathChange>,
    pub(crate) current_source: Option<Arc<dyn IndexerSource>>,
}

impl Inner {
    pub(crate) fn new(paths: Vec<String>) -> Self {
        Self {
            state: IndexerState::Stopped,
            queue: VecDeque::new(),
            paths,
            path_changes: VecDeque::new(),
            current_source: None,
        }
    }

    /// Queue `context` unless an identical request is already pending
    pub(crate) fn enqueue(&mut self, context: SyncContext) -> bool {
        if self.queue.contains(&context) {
            return false;
        }
        self.queue.push_back(context);
        true
    }
}

/// Trailing-separator form used for persisted roots
pub(crate) fn normalize_dir(path: &str) -> String {
    let mut normalized = path.to_string();
    if !normalized.ends_with(std::path::MAIN_SEPARATOR) && !normalized.ends_with('/') {
        normalized.push(std::path::MAIN_SEPARATOR);
    }
    normalized
}
