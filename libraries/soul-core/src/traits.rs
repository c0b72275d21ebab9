//! Capability traits implemented by indexer plugins
//!
//! Tag readers, content sources, analyzers and decoders are resolved once when
//! an indexer is built and are called from its background thread. Every call
//! across these traits is treated as untrusted: errors and panics are soft
//! failures for the unit of work at hand.

use crate::error::Result;
use crate::types::{
    AudioBuffer, ReplayGain, ScanPaths, ScanResult, SourceId, StreamOptions, TrackRecord,
};
use async_trait::async_trait;
use std::path::Path;

/// Write-oriented view over exactly one track
///
/// Handed to tag readers, sources and analyzers instead of the store itself,
/// so plugin code never sees row ids or the database.
pub trait TagStore: Send {
    /// Add a value under `key`; existing values are kept
    fn set_value(&mut self, key: &str, value: &str);

    /// Remove every value under `key`
    fn clear_value(&mut self, key: &str);

    fn contains(&self, key: &str) -> bool;

    /// First value under `key`
    fn value(&self, key: &str) -> Option<&str>;

    fn set_replay_gain(&mut self, gain: ReplayGain);
}

/// Tag reader capability
///
/// Readers are tried in registration order for every file whose extension
/// they accept; the first successful read wins.
pub trait TagReader: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Check whether files with this lowercase extension (no dot) are handled
    fn can_read(&self, extension: &str) -> bool;

    /// Read tags from `path` into `store`
    ///
    /// Returns `Ok(false)` when the file was not understood.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or parsed
    fn read(&self, path: &Path, store: &mut dyn TagStore) -> Result<bool>;
}

/// External content source
///
/// Sources contribute tracks that are not found by walking directories. All
/// of their writes go through the [`IndexerWriter`] they are handed.
#[async_trait]
pub trait IndexerSource: Send + Sync {
    /// Stable, non-zero identifier
    fn source_id(&self) -> SourceId;

    /// Whether external ids survive a rescan, allowing a rebuild to purge
    /// every track of this source up front
    fn has_stable_ids(&self) -> bool;

    /// Whether the per-track refresh pass should run after `scan`
    fn needs_track_scan(&self) -> bool {
        false
    }

    async fn on_before_scan(&self) {}

    /// Bulk scan
    ///
    /// `paths` is only valid for the duration of the call.
    ///
    /// # Errors
    /// An error is logged and treated like a crash of this source
    async fn scan(&self, writer: &dyn IndexerWriter, paths: &ScanPaths) -> Result<ScanResult>;

    /// Refresh one already indexed track
    ///
    /// `track` holds the persisted metadata; call [`IndexerWriter::save`] to
    /// keep changes.
    ///
    /// # Errors
    /// An error is logged and the pass moves on to the next track
    async fn scan_track(
        &self,
        writer: &dyn IndexerWriter,
        track: TrackRecord,
        external_id: &str,
    ) -> Result<()> {
        let _ = (writer, track, external_id);
        Ok(())
    }

    /// Always called after `scan`, even if it failed
    async fn on_after_scan(&self) {}

    /// Abandon in-flight work as soon as possible
    ///
    /// Called from a different thread while `scan` may be running.
    fn interrupt(&self);
}

/// Store operations available to a running source
///
/// Every operation rejects a source id of `0` and empty arguments without
/// touching storage.
#[async_trait]
pub trait IndexerWriter: Send + Sync {
    /// Empty track to fill and pass to `save`
    fn create_writer(&self) -> TrackRecord;

    /// Persist `track` as owned by `source` under `external_id`
    async fn save(&self, source: &dyn IndexerSource, track: TrackRecord, external_id: &str)
        -> bool;

    async fn remove_by_uri(&self, source: &dyn IndexerSource, uri: &str) -> bool;

    async fn remove_by_external_id(&self, source: &dyn IndexerSource, external_id: &str) -> bool;

    /// Delete every track of `source`, returning how many went away
    async fn remove_all(&self, source: &dyn IndexerSource) -> u64;

    /// Force an intermediate commit and add `updated_tracks` to the scan counter
    async fn commit_progress(&self, source: &dyn IndexerSource, updated_tracks: u64);

    /// Stored modification time of a source track
    async fn last_modified_time(&self, source: &dyn IndexerSource, external_id: &str)
        -> Option<i64>;

    /// Queue a `Sources` scan restricted to `source`
    fn schedule_rescan(&self, source: &dyn IndexerSource);
}

/// Analyzer capability
///
/// Called once per track: `start`, then `analyze` per decoded buffer while it
/// keeps returning `true`, then `end`. The track is saved when any accepted
/// analyzer's `end` returns `true`.
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &str;

    /// Accept (`true`) or decline the track
    fn start(&self, track: &mut dyn TagStore) -> bool;

    /// Consume one buffer; `false` drops this analyzer for the rest of the track
    fn analyze(&self, track: &mut dyn TagStore, buffer: &AudioBuffer) -> bool;

    /// Finish the track; `true` asks for it to be saved
    fn end(&self, track: &mut dyn TagStore) -> bool;
}

/// Opens decode streams for analysis
pub trait DecoderFactory: Send + Sync {
    fn can_decode(&self, uri: &str) -> bool;

    /// # Errors
    /// Returns an error if the file cannot be opened or probed
    fn open(&self, uri: &str, options: &StreamOptions) -> Result<Box<dyn DecodeStream>>;
}

/// Short-lived stream of decoded PCM
pub trait DecodeStream: Send {
    /// Next buffer, `None` at end of stream
    ///
    /// # Errors
    /// Returns an error if decoding fails
    fn next_buffer(&mut self) -> Result<Option<AudioBuffer>>;
}
