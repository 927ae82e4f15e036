use thiserror::Error;

/// Why a payload did not yield an embedding.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("cannot decode image: {0}")]
    InvalidImage(String),

    #[error("no face detected")]
    NoFace,

    /// The model runtime failed; the payload itself may be fine.
    #[error("face model failed: {0:#}")]
    Backend(anyhow::Error),
}

impl ExtractError {
    /// Decode failures and empty detections only concern the one payload.
    pub fn is_per_image(&self) -> bool {
        matches!(self, ExtractError::InvalidImage(_) | ExtractError::NoFace)
    }
}

/// Turns an encoded image payload into the embedding of one selected face.
pub trait FaceExtractor {
    fn extract(&mut self, payload: &[u8]) -> Result<Vec<f32>, ExtractError>;
}

impl<T: FaceExtractor + ?Sized> FaceExtractor for Box<T> {
    fn extract(&mut self, payload: &[u8]) -> Result<Vec<f32>, ExtractError> {
        (**self).extract(payload)
    }
}

impl<T: FaceExtractor + ?Sized> FaceExtractor for &mut T {
    fn extract(&mut self, payload: &[u8]) -> Result<Vec<f32>, ExtractError> {
        (**self).extract(payload)
    }
}
