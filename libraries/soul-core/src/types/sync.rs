//! Scan request types shared by the indexer and its sources

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Identifier of a content source.
///
/// `0` is reserved for the built-in filesystem source; plugin sources
/// must use a non-zero id.
pub type SourceId = i64;

/// Source id owned by locally discovered files
pub const LOCAL_SOURCE_ID: SourceId = 0;

/// What a scan cycle should cover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    /// Local directories; configured sources are refreshed first as with `All`
    Local,
    /// Plugin sources only, without the local walk or delete pass
    Sources,
    /// Sources, then local directories
    All,
    /// Invalidate everything and rescan as `All`
    Rebuild,
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Local => "local",
            Self::Sources => "sources",
            Self::All => "all",
            Self::Rebuild => "rebuild",
        };
        f.write_str(name)
    }
}

impl FromStr for SyncType {
    type Err = crate::SoulError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "sources" => Ok(Self::Sources),
            "all" => Ok(Self::All),
            "rebuild" => Ok(Self::Rebuild),
            other => Err(crate::SoulError::invalid_input(format!(
                "unknown sync type: {other}"
            ))),
        }
    }
}

/// A queued scan request.
///
/// Two contexts are equivalent when both the type and the source id match;
/// the indexer never holds two equivalent contexts in its pending queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncContext {
    pub sync_type: SyncType,
    /// Source to restrict the cycle to, `0` for all sources
    pub source_id: SourceId,
}

impl SyncContext {
    pub fn new(sync_type: SyncType, source_id: Option<SourceId>) -> Self {
        Self {
            sync_type,
            source_id: source_id.unwrap_or(LOCAL_SOURCE_ID),
        }
    }

    /// The single source this context targets, if any
    pub fn target_source(&self) -> Option<SourceId> {
        (self.source_id != LOCAL_SOURCE_ID).then_some(self.source_id)
    }
}

/// Outcome of a source's bulk scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanResult {
    /// Keep everything the source wrote
    Commit,
    /// Discard everything the source wrote since its scan began
    Rollback,
}

/// Root directories handed to a source for the duration of one `scan` call.
///
/// The buffer is built right before the call and dropped right after it;
/// sources only ever see a borrow of it.
#[derive(Debug, Clone, Default)]
pub struct ScanPaths {
    paths: Vec<PathBuf>,
}

impl ScanPaths {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }

    pub fn as_slice(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
