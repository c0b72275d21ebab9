/// Tag reader implementation using lofty
use crate::error::MetadataError;
use lofty::{AudioFile, ItemKey, TaggedFileExt};
use soul_core::types::keys;
use soul_core::{TagReader, TagStore};
use std::path::Path;

/// Extensions lofty can parse tags from
const EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "oga", "opus", "spx", "m4a", "m4b", "mp4", "aac", "wav", "aiff",
    "aif", "ape", "wv", "mpc",
];

/// Tag reader using the lofty library
pub struct LoftyTagReader;

impl LoftyTagReader {
    /// Create a new tag reader
    pub fn new() -> Self {
        Self
    }

    /// Leading number of values like `"3/12"` or `"1999-05-01"`
    fn leading_number(text: &str) -> Option<u32> {
        let digits: String = text
            .trim()
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        digits.parse().ok()
    }

    /// Copy lofty tag items into the store
    fn extract_from_tag(tag: &lofty::Tag, store: &mut dyn TagStore) {
        // lofty 0.18 API - iterate through items
        for item in tag.items() {
            let Some(text) = item.value().text().map(str::trim) else {
                continue;
            };
            if text.is_empty() {
                continue;
            }

            match item.key() {
                ItemKey::TrackTitle => store.set_value(keys::TITLE, text),
                ItemKey::TrackArtist => store.set_value(keys::ARTIST, text),
                ItemKey::AlbumTitle => store.set_value(keys::ALBUM, text),
                ItemKey::AlbumArtist => store.set_value(keys::ALBUM_ARTIST, text),
                ItemKey::Genre => store.set_value(keys::GENRE, text),
                ItemKey::Year | ItemKey::RecordingDate => {
                    if !store.contains(keys::YEAR) {
                        if let Some(year) = Self::leading_number(text) {
                            store.set_value(keys::YEAR, &year.to_string());
                        }
                    }
                }
                ItemKey::TrackNumber => {
                    if let Some(number) = Self::leading_number(text) {
                        store.set_value(keys::TRACK, &number.to_string());
                    }
                }
                ItemKey::DiscNumber => {
                    if let Some(number) = Self::leading_number(text) {
                        store.set_value(keys::DISC, &number.to_string());
                    }
                }
                ItemKey::Composer => store.set_value("composer", text),
                ItemKey::Conductor => store.set_value("conductor", text),
                ItemKey::Lyricist => store.set_value("lyricist", text),
                ItemKey::Comment => store.set_value("comment", text),
                _ => {}
            }
        }
    }
}

impl Default for LoftyTagReader {
    fn default() -> Self {
        Self::new()
    }
}

impl TagReader for LoftyTagReader {
    fn name(&self) -> &str {
        "lofty"
    }

    fn can_read(&self, extension: &str) -> bool {
        EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str())
    }

    fn read(&self, path: &Path, store: &mut dyn TagStore) -> soul_core::Result<bool> {
        if !path.exists() {
            return Err(MetadataError::FileNotFound(path.display().to_string()).into());
        }

        let tagged_file = lofty::read_from_path(path).map_err(MetadataError::from)?;

        // Primary tag first, otherwise whatever tag the container carries
        if let Some(tag) = tagged_file
            .primary_tag()
            .or_else(|| tagged_file.tags().first())
        {
            Self::extract_from_tag(tag, store);
        }

        let duration = tagged_file.properties().duration().as_secs();
        store.clear_value(keys::DURATION);
        store.set_value(keys::DURATION, &duration.to_string());

        // Untagged files are still indexed, titled after the file
        if !store.contains(keys::TITLE) {
            if let Some(stem) = path.file_stem() {
                store.set_value(keys::TITLE, &stem.to_string_lossy());
            }
        }

        Ok(true)
    }
}
