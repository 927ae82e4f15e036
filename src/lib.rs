pub mod aggregate;
pub mod config;
pub mod error;
pub mod matcher;
pub mod registry;
pub mod service;
pub mod storage;
pub mod vector;

pub use error::{Error, Result};
pub use matcher::{MatchEngine, MatchResult};
pub use registry::{IdentityRecord, IdentityRegistry, MemoryRegistry, Snapshot, UpsertStatus};
pub use service::{EnrollmentOutcome, EnrollmentService, RecognitionOutcome, RecognitionService};
pub use storage::FileRegistry;
pub use vector::Embedding;

// Re-export the extraction contract for convenience
pub use facereg_vision::{ExtractError, FaceExtractor, FaceSelection, OnnxExtractor};
