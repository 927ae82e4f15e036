pub mod decode;
pub mod extract;
pub mod model;
pub mod pipeline;

// Re-export commonly used types
pub use decode::decode_payload;
pub use extract::{ExtractError, FaceExtractor};
pub use pipeline::{FaceSelection, OnnxExtractor};
