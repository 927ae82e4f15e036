//! Enrollment and recognition: the two entry points exposed upward.

use std::sync::Arc;

use facereg_vision::{ExtractError, FaceExtractor};
use log::{info, warn};
use serde::Serialize;

use crate::aggregate::aggregate;
use crate::error::{Error, Result};
use crate::matcher::{MatchEngine, MatchResult};
use crate::registry::{IdentityRecord, IdentityRegistry, UpsertStatus};
use crate::vector::Embedding;

/// An enrollment image that produced no embedding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedImage {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct EnrollmentOutcome {
    pub record: IdentityRecord,
    pub status: UpsertStatus,
    pub samples_used: usize,
    pub skipped: Vec<SkippedImage>,
}

impl EnrollmentOutcome {
    /// The canonical embedding that was stored.
    pub fn embedding(&self) -> &Embedding {
        &self.record.embedding
    }
}

#[derive(Debug, Clone)]
pub struct RecognitionOutcome {
    pub result: MatchResult,
    /// Records compared against the query.
    pub scanned: usize,
    /// Records left out of the scan because they could not be read.
    pub skipped_records: usize,
}

fn extraction_failed(err: ExtractError) -> Error {
    Error::Extraction(err.to_string())
}

pub struct EnrollmentService<X> {
    registry: Arc<dyn IdentityRegistry>,
    extractor: X,
}

impl<X: FaceExtractor> EnrollmentService<X> {
    pub fn new(registry: Arc<dyn IdentityRegistry>, extractor: X) -> Self {
        Self {
            registry,
            extractor,
        }
    }

    /// Enroll `external_id` from a batch of images. Images that cannot be
    /// decoded or show no face are skipped; the rest are averaged and
    /// stored, replacing any previous embedding for the identifier.
    pub fn enroll<P: AsRef<[u8]>>(
        &mut self,
        external_id: &str,
        display_name: &str,
        images: &[P],
    ) -> Result<EnrollmentOutcome> {
        if external_id.trim().is_empty() {
            return Err(Error::InvalidRequest("missing external identifier".into()));
        }
        if display_name.trim().is_empty() {
            return Err(Error::InvalidRequest("missing display name".into()));
        }
        if images.is_empty() {
            return Err(Error::InvalidRequest("no images provided".into()));
        }

        let dimension = self.registry.dimension();
        let mut samples = Vec::with_capacity(images.len());
        let mut skipped = Vec::new();

        for (index, image) in images.iter().enumerate() {
            match self.extractor.extract(image.as_ref()) {
                Ok(raw) => {
                    let embedding = Embedding::from_f32(&raw);
                    embedding.validate(dimension)?;
                    samples.push(embedding);
                }
                Err(err) if err.is_per_image() => {
                    warn!("Image {} for {}: {}", index + 1, external_id, err);
                    skipped.push(SkippedImage {
                        index,
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(extraction_failed(err)),
            }
        }

        if samples.is_empty() {
            return Err(Error::NoValidFaces {
                submitted: images.len(),
            });
        }

        let canonical = aggregate(&samples)?;
        let upserted = self.registry.upsert(external_id, display_name, canonical)?;
        info!(
            "Enrolled {} from {} of {} images ({:?})",
            external_id,
            samples.len(),
            images.len(),
            upserted.status
        );

        Ok(EnrollmentOutcome {
            record: upserted.record,
            status: upserted.status,
            samples_used: samples.len(),
            skipped,
        })
    }
}

pub struct RecognitionService<X> {
    registry: Arc<dyn IdentityRegistry>,
    extractor: X,
    engine: MatchEngine,
}

impl<X: FaceExtractor> RecognitionService<X> {
    pub fn new(registry: Arc<dyn IdentityRegistry>, extractor: X, engine: MatchEngine) -> Self {
        Self {
            registry,
            extractor,
            engine,
        }
    }

    /// Identify the face in `image`. Failing to find anyone close enough is
    /// a normal outcome (`MatchResult::NoMatch`), not an error.
    pub fn recognize(&mut self, image: &[u8]) -> Result<RecognitionOutcome> {
        let raw = match self.extractor.extract(image) {
            Ok(raw) => raw,
            Err(ExtractError::InvalidImage(reason)) => return Err(Error::InvalidImage(reason)),
            Err(ExtractError::NoFace) => return Err(Error::NoFaceDetected),
            Err(err) => return Err(extraction_failed(err)),
        };
        let query = Embedding::from_f32(&raw);
        query.validate(self.registry.dimension())?;

        let snapshot = self.registry.snapshot()?;
        let result = self.engine.linear_scan(&query, &snapshot.records)?;

        match &result {
            MatchResult::Matched {
                external_id,
                distance,
                ..
            } => info!(
                "Recognized {} at distance {:.4} (threshold: {:.3})",
                external_id,
                distance,
                self.engine.threshold()
            ),
            MatchResult::NoMatch => info!(
                "No match among {} records (threshold: {:.3})",
                snapshot.records.len(),
                self.engine.threshold()
            ),
        }

        Ok(RecognitionOutcome {
            result,
            scanned: snapshot.records.len(),
            skipped_records: snapshot.skipped.len(),
        })
    }
}
