/// Audio-specific errors
use thiserror::Error;

/// Result type alias using `AudioError`
pub type Result<T> = std::result::Result<T, AudioError>;

/// Audio error types
#[derive(Error, Debug)]
pub enum AudioError {
    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Decoding error
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// Invalid stream shape
    #[error("Invalid audio buffer: {0}")]
    InvalidBuffer(String),

    /// Requested stream feature this decoder lacks
    #[error("Unsupported stream option: {0}")]
    Unsupported(&'static str),

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Symphonia error
    #[error("Symphonia error: {0}")]
    Symphonia(String),
}

impl From<AudioError> for soul_core::SoulError {
    fn from(err: AudioError) -> Self {
        soul_core::SoulError::audio(err.to_string())
    }
}
