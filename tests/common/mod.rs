use facereg::{ExtractError, FaceExtractor};

/// Extractor that reads embeddings straight out of the payload:
/// `"0.5,0.25"` yields `[0.5, 0.25]`, `"garbage"` fails to decode,
/// `"blank"` has no face and `"crash"` breaks the model.
#[derive(Default)]
pub struct ScriptedExtractor {
    pub calls: usize,
}

impl FaceExtractor for ScriptedExtractor {
    fn extract(&mut self, payload: &[u8]) -> Result<Vec<f32>, ExtractError> {
        self.calls += 1;
        let text = std::str::from_utf8(payload)
            .map_err(|e| ExtractError::InvalidImage(e.to_string()))?;
        match text {
            "blank" => Err(ExtractError::NoFace),
            "crash" => Err(ExtractError::Backend(anyhow::anyhow!("session poisoned"))),
            _ => text
                .split(',')
                .map(|c| c.trim().parse::<f32>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| ExtractError::InvalidImage(e.to_string())),
        }
    }
}

pub fn assert_close(got: &[f64], want: &[f64]) {
    assert_eq!(got.len(), want.len(), "{:?} vs {:?}", got, want);
    for (g, w) in got.iter().zip(want) {
        assert!((g - w).abs() < 1e-6, "{:?} vs {:?}", got, want);
    }
}
