mod audio;
mod replay_gain;
mod sync;
mod track;

pub use audio::{AudioBuffer, AudioFormat, SampleRate, StreamOptions};
pub use replay_gain::ReplayGain;
pub use sync::{ScanPaths, ScanResult, SourceId, SyncContext, SyncType, LOCAL_SOURCE_ID};
pub use track::{keys, TrackId, TrackRecord};
