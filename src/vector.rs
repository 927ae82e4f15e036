//! Fixed-dimension vector operations on face embeddings.

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A face embedding. Components are kept as 64-bit floats so that stored
/// values round-trip exactly and repeated distance computations agree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f64>);

impl Embedding {
    pub fn new(components: Vec<f64>) -> Self {
        Self(components)
    }

    /// Widen a model output.
    pub fn from_f32(components: &[f32]) -> Self {
        Self(components.iter().map(|&x| f64::from(x)).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.0
    }

    pub fn view(&self) -> ArrayView1<'_, f64> {
        ArrayView1::from(self.0.as_slice())
    }

    pub fn check_dimension(&self, expected: usize) -> Result<()> {
        if self.len() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                actual: self.len(),
            });
        }
        Ok(())
    }

    /// Every component must be a finite number.
    pub fn check_finite(&self) -> Result<()> {
        match self.0.iter().position(|x| !x.is_finite()) {
            Some(index) => Err(Error::NonFiniteEmbedding {
                index,
                value: self.0[index],
            }),
            None => Ok(()),
        }
    }

    /// Length and finiteness checks applied to anything stored or queried.
    pub fn validate(&self, expected: usize) -> Result<()> {
        self.check_dimension(expected)?;
        self.check_finite()
    }
}

impl From<Vec<f64>> for Embedding {
    fn from(components: Vec<f64>) -> Self {
        Self(components)
    }
}

/// Elementwise arithmetic mean. All inputs must share the first input's length.
pub fn mean(vectors: &[Embedding]) -> Result<Embedding> {
    let first = vectors.first().ok_or(Error::EmptyInput)?;
    for v in &vectors[1..] {
        v.check_dimension(first.len())?;
    }

    let mut sum = Array1::<f64>::zeros(first.len());
    for v in vectors {
        sum += &v.view();
    }
    let mean = sum / vectors.len() as f64;
    Ok(Embedding(mean.to_vec()))
}

/// Euclidean (L2) distance.
pub fn distance(a: &Embedding, b: &Embedding) -> Result<f64> {
    b.check_dimension(a.len())?;
    let diff = &a.view() - &b.view();
    Ok(diff.dot(&diff).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    fn emb(v: &[f64]) -> Embedding {
        Embedding::new(v.to_vec())
    }

    #[test]
    fn test_mean_componentwise() {
        let vectors = vec![
            emb(&[1.0, 0.0, 3.0]),
            emb(&[0.0, 1.0, 6.0]),
            emb(&[2.0, 2.0, -3.0]),
        ];
        let m = mean(&vectors).unwrap();
        let expected = [1.0, 1.0, 2.0];
        for (got, want) in m.as_slice().iter().zip(expected) {
            assert!((got - want).abs() < EPS, "{} != {}", got, want);
        }
    }

    #[test]
    fn test_mean_single_is_identity() {
        let v = emb(&[0.25, -0.5, 0.125]);
        assert_eq!(mean(std::slice::from_ref(&v)).unwrap(), v);
    }

    #[test]
    fn test_mean_errors() {
        assert!(matches!(mean(&[]), Err(Error::EmptyInput)));
        let err = mean(&[emb(&[1.0, 2.0]), emb(&[1.0, 2.0, 3.0])]).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_distance_properties() {
        let a = emb(&[0.1, 0.7, -0.3, 2.0]);
        let b = emb(&[1.5, -0.2, 0.0, 0.5]);
        assert_eq!(distance(&a, &a).unwrap(), 0.0);
        let ab = distance(&a, &b).unwrap();
        let ba = distance(&b, &a).unwrap();
        assert!(ab > 0.0);
        assert!((ab - ba).abs() < EPS);
    }

    #[test]
    fn test_distance_value() {
        let d = distance(&emb(&[0.0, 0.0]), &emb(&[3.0, 4.0])).unwrap();
        assert!((d - 5.0).abs() < EPS);
    }

    #[test]
    fn test_distance_dimension_mismatch() {
        let err = distance(&emb(&[1.0]), &emb(&[1.0, 2.0])).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }

    #[test]
    fn test_validate_rejects_non_finite() {
        assert!(emb(&[0.0, 1.0]).validate(2).is_ok());
        let err = emb(&[0.0, f64::NAN]).validate(2).unwrap_err();
        assert!(matches!(err, Error::NonFiniteEmbedding { index: 1, .. }));
        let err = emb(&[f64::INFINITY, 0.0]).validate(2).unwrap_err();
        assert!(matches!(err, Error::NonFiniteEmbedding { index: 0, .. }));
        assert!(matches!(
            emb(&[f64::NAN]).validate(2),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_from_f32_widens() {
        let e = Embedding::from_f32(&[0.5, -1.25]);
        assert_eq!(e.as_slice(), &[0.5, -1.25]);
    }
}
