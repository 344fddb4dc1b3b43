use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading, populating or inspecting a model.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("buffer does not carry the '{expected}' file identifier")]
    WrongIdentifier { expected: &'static str },

    #[error("malformed flatbuffer")]
    InvalidFlatbuffer(#[from] flatbuffers::InvalidFlatbuffer),

    #[error("no metadata loaded, call load_metadata before populate")]
    MetadataNotLoaded,

    #[error("the model does not contain TFLITE_METADATA")]
    MetadataNotFound,

    #[error("buffer index {index} out of range ({len} buffers)")]
    BufferIndexOutOfRange { index: usize, len: usize },

    #[error("buffer {index} points outside the model file")]
    BufferOutOfBounds { index: usize },

    #[error("failed to render metadata as JSON")]
    Json(#[from] serde_json::Error),

    #[error("new object referenced but never written")]
    UnresolvedOffset,

    #[error("populated model exceeds the 32-bit flatbuffer offset range")]
    TooLarge,
}

pub type Result<T> = std::result::Result<T, MetadataError>;
