//! In-memory track record filled by tag readers and sources

use crate::traits::TagStore;
use crate::types::{ReplayGain, SourceId};
use std::collections::BTreeMap;

/// Internal row id of a persisted track
pub type TrackId = i64;

/// Well-known metadata keys.
///
/// Keys listed here map onto columns or lookup tables of the library store;
/// any other key is persisted as a free-form metadata pair.
pub mod keys {
    pub const TITLE: &str = "title";
    pub const ARTIST: &str = "artist";
    pub const ALBUM: &str = "album";
    pub const ALBUM_ARTIST: &str = "album_artist";
    pub const GENRE: &str = "genre";
    pub const TRACK: &str = "track";
    pub const DISC: &str = "disc";
    pub const BPM: &str = "bpm";
    pub const DURATION: &str = "duration";
    pub const YEAR: &str = "year";
    pub const FILENAME: &str = "filename";
    pub const FILESIZE: &str = "filesize";
    pub const FILETIME: &str = "filetime";
    pub const PATH_ID: &str = "path_id";
    pub const SOURCE_ID: &str = "source_id";
    pub const EXTERNAL_ID: &str = "external_id";

    /// Keys stored directly on the track row or in dedicated lookup tables
    pub const RESERVED: &[&str] = &[
        TITLE,
        ARTIST,
        ALBUM,
        ALBUM_ARTIST,
        GENRE,
        TRACK,
        DISC,
        BPM,
        DURATION,
        YEAR,
        FILENAME,
        FILESIZE,
        FILETIME,
        PATH_ID,
        SOURCE_ID,
        EXTERNAL_ID,
    ];

    pub fn is_reserved(key: &str) -> bool {
        RESERVED.contains(&key)
    }
}

/// Metadata for exactly one track.
///
/// Values form an ordered multimap: `set_value` on a key that already holds
/// values appends, which is how multi-artist and multi-genre tags arrive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackRecord {
    id: Option<TrackId>,
    values: BTreeMap<String, Vec<String>>,
    replay_gain: Option<ReplayGain>,
}

impl TrackRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record bound to an existing row
    ///
    /// Only the library store binds ids; writes coming from sources are
    /// unbound again before they reach it.
    pub fn with_id(id: TrackId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn id(&self) -> Option<TrackId> {
        self.id
    }

    pub fn set_id(&mut self, id: TrackId) {
        self.id = Some(id);
    }

    /// Detach from any row so the store resolves the target itself
    pub fn clear_id(&mut self) {
        self.id = None;
    }

    /// First value stored under `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Every value stored under `key`, in insertion order
    pub fn get_all(&self, key: &str) -> &[String] {
        self.values.get(key).map_or(&[], Vec::as_slice)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|value| value.trim().parse().ok())
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|value| value.trim().parse().ok())
    }

    /// Replace all values under `key` with a single value
    pub fn replace(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), vec![value.into()]);
    }

    pub fn filename(&self) -> Option<&str> {
        self.get(keys::FILENAME)
    }

    pub fn source_id(&self) -> SourceId {
        self.get_i64(keys::SOURCE_ID).unwrap_or(0)
    }

    pub fn external_id(&self) -> Option<&str> {
        self.get(keys::EXTERNAL_ID).filter(|id| !id.is_empty())
    }

    pub fn replay_gain(&self) -> Option<ReplayGain> {
        self.replay_gain
    }

    /// Multi-valued field joined for display, e.g. `"A, B"` for two artists
    pub fn joined(&self, key: &str) -> Option<String> {
        let values: Vec<&str> = self
            .get_all(key)
            .iter()
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .collect();

        (!values.is_empty()).then(|| values.join(", "))
    }

    /// Key/value pairs that are not stored on the track row
    pub fn extra_values(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .filter(|(key, _)| !keys::is_reserved(key))
            .flat_map(|(key, values)| values.iter().map(move |v| (key.as_str(), v.as_str())))
    }
}

impl TagStore for TrackRecord {
    fn set_value(&mut self, key: &str, value: &str) {
        self.values
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
    }

    fn clear_value(&mut self, key: &str) {
        self.values.remove(key);
    }

    fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    fn value(&self, key: &str) -> Option<&str> {
        self.get(key)
    }

    fn set_replay_gain(&mut self, gain: ReplayGain) {
        self.replay_gain = Some(gain);
    }
}
