use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// An embedding of unexpected length reached vector math or the registry.
    #[error("embedding has {actual} components, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding component {index} is not finite ({value})")]
    NonFiniteEmbedding { index: usize, value: f64 },

    #[error("cannot average an empty set of embeddings")]
    EmptyInput,

    #[error("no embeddings to aggregate")]
    NoValidSamples,

    #[error("no valid faces found in any of the {submitted} provided images")]
    NoValidFaces { submitted: usize },

    #[error("invalid image data: {0}")]
    InvalidImage(String),

    #[error("no face detected in the image")]
    NoFaceDetected,

    #[error("corrupt record {location}: {reason}")]
    CorruptRecord { location: String, reason: String },

    #[error("identity store unavailable ({context})")]
    StorageUnavailable {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("face extraction failed: {0}")]
    Extraction(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    pub(crate) fn storage(context: impl Into<String>, source: io::Error) -> Self {
        Error::StorageUnavailable {
            context: context.into(),
            source,
        }
    }
}
