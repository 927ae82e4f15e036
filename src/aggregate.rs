use crate::error::{Error, Result};
use crate::vector::{self, Embedding};

/// Reduce the per-image embeddings of one enrollment to its canonical
/// embedding. Samples are weighted equally; their quality is not assessed.
pub fn aggregate(candidates: &[Embedding]) -> Result<Embedding> {
    if candidates.is_empty() {
        return Err(Error::NoValidSamples);
    }
    vector::mean(candidates)
}
