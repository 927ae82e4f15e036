use std::path::Path;

use anyhow::{Context, Result};
use image::DynamicImage;
use ndarray::Array4;
use ort::{session::Session, value::Value};
use serde::{Deserialize, Serialize};

use crate::decode::decode_payload;
use crate::extract::{ExtractError, FaceExtractor};

/// Which face to keep when the model reports several.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceSelection {
    /// Row 0 of the model output.
    #[default]
    First,
    /// Highest detection score, ties resolved to the lowest row. Falls back to
    /// `First` when the model emits no scores.
    HighestScore,
}

impl FaceSelection {
    pub fn select(self, faces: usize, scores: Option<&[f32]>) -> Option<usize> {
        if faces == 0 {
            return None;
        }
        match (self, scores) {
            (FaceSelection::HighestScore, Some(scores)) if scores.len() >= faces => {
                let mut best = 0;
                for (row, score) in scores[..faces].iter().enumerate().skip(1) {
                    if *score > scores[best] {
                        best = row;
                    }
                }
                Some(best)
            }
            _ => Some(0),
        }
    }
}

/// Embedding extractor backed by a single ONNX model.
///
/// The model takes a `[1, 3, S, S]` BGR tensor with values in `[0, 255]` and
/// yields `[N, D]` embeddings, one row per detected face, optionally followed
/// by an `[N]` score output.
pub struct OnnxExtractor {
    session: Session,
    input_size: u32,
    selection: FaceSelection,
}

impl OnnxExtractor {
    pub fn new(model_path: &Path, input_size: u32, selection: FaceSelection) -> Result<Self> {
        Ok(Self {
            session: crate::model::embedding_session(model_path)?,
            input_size,
            selection,
        })
    }

    /// Run the model on a decoded image. `None` means no face was found.
    pub fn embed_image(&mut self, img: &DynamicImage) -> Result<Option<Vec<f32>>> {
        let input_tensor = Value::from_array(bgr_tensor(img, self.input_size))?;
        let outputs = self.session.run(ort::inputs![input_tensor])?;

        let mut tensors: Vec<(Vec<i64>, Vec<f32>)> = Vec::new();
        for (_name, output) in outputs.iter() {
            let (shape, data) = output.try_extract_tensor::<f32>()?;
            tensors.push((shape.iter().copied().collect(), data.to_vec()));
        }

        let (shape, data) = tensors.first().context("model produced no outputs")?;
        let (faces, dim) = match shape.as_slice() {
            [n, d] => (*n as usize, *d as usize),
            [d] => (usize::from(*d > 0), *d as usize),
            other => anyhow::bail!("unexpected embedding output shape {:?}", other),
        };
        let scores = tensors.get(1).map(|(_, scores)| scores.as_slice());

        let Some(row) = self.selection.select(faces, scores) else {
            return Ok(None);
        };
        let start = row * dim;
        let embedding = data
            .get(start..start + dim)
            .context("embedding output shorter than its shape")?;
        log::debug!("selected face {} of {} ({} dims)", row, faces, dim);
        Ok(Some(embedding.to_vec()))
    }
}

impl FaceExtractor for OnnxExtractor {
    fn extract(&mut self, payload: &[u8]) -> Result<Vec<f32>, ExtractError> {
        let img = decode_payload(payload)?;
        match self.embed_image(&img).map_err(ExtractError::Backend)? {
            Some(embedding) => Ok(embedding),
            None => Err(ExtractError::NoFace),
        }
    }
}

/// Resize to `size x size` and lay out as NCHW in BGR order, values in `[0, 255]`.
pub fn bgr_tensor(img: &DynamicImage, size: u32) -> Array4<f32> {
    let rgb = img
        .resize_exact(size, size, image::imageops::FilterType::Triangle)
        .to_rgb8();
    let side = size as usize;
    Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
        let px = rgb.get_pixel(x as u32, y as u32);
        px[2 - c] as f32
    })
}
