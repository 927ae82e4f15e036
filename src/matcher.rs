use serde::Serialize;

use crate::error::Result;
use crate::registry::IdentityRecord;
use crate::vector::{self, Embedding};

/// Default maximum distance for a positive match. Lower is stricter: fewer
/// false accepts, more false rejects.
pub const DEFAULT_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MatchResult {
    Matched {
        external_id: String,
        display_name: String,
        distance: f64,
        /// `1 - distance`. Not clamped: Euclidean distance is unbounded, so
        /// this is only guaranteed to lie in `(1 - threshold, 1]`.
        confidence: f64,
    },
    NoMatch,
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Matched { .. })
    }

    pub fn confidence(&self) -> f64 {
        match self {
            MatchResult::Matched { confidence, .. } => *confidence,
            MatchResult::NoMatch => 0.0,
        }
    }

    /// Confidence as a percentage rounded to two decimals.
    pub fn confidence_percent(&self) -> f64 {
        (self.confidence() * 100.0 * 100.0).round() / 100.0
    }
}

/// Threshold-gated nearest-neighbour search.
#[derive(Debug, Clone, Copy)]
pub struct MatchEngine {
    threshold: f64,
}

impl Default for MatchEngine {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl MatchEngine {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Full linear scan, O(N·D). The closest candidate wins, earliest on
    /// ties, and is accepted only if strictly closer than the threshold.
    pub fn linear_scan(&self, query: &Embedding, candidates: &[IdentityRecord]) -> Result<MatchResult> {
        let mut best: Option<(&IdentityRecord, f64)> = None;
        for candidate in candidates {
            let d = vector::distance(query, &candidate.embedding)?;
            // NaN never compares closer, so it can neither win nor displace a winner
            let closer = match best {
                None => !d.is_nan(),
                Some((_, best_d)) => d < best_d,
            };
            if closer {
                best = Some((candidate, d));
            }
        }

        Ok(match best {
            Some((record, d)) if d < self.threshold => MatchResult::Matched {
                external_id: record.external_id.clone(),
                display_name: record.display_name.clone(),
                distance: d,
                confidence: 1.0 - d,
            },
            _ => MatchResult::NoMatch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use uuid::Uuid;

    fn record(id: &str, v: &[f64]) -> IdentityRecord {
        IdentityRecord {
            id: Uuid::now_v7(),
            external_id: id.to_string(),
            display_name: format!("name of {id}"),
            embedding: Embedding::new(v.to_vec()),
        }
    }

    #[test]
    fn test_close_match() {
        let engine = MatchEngine::default();
        let result = engine
            .linear_scan(
                &Embedding::new(vec![0.51, 0.49]),
                &[record("E1", &[0.5, 0.5])],
            )
            .unwrap();
        match result {
            MatchResult::Matched {
                ref external_id,
                distance,
                confidence,
                ..
            } => {
                assert_eq!(external_id, "E1");
                assert!((distance - 0.0141421356).abs() < 1e-6);
                assert!((confidence - 0.9858578644).abs() < 1e-6);
            }
            MatchResult::NoMatch => panic!("expected a match"),
        }
        assert_eq!(result.confidence_percent(), 98.59);
    }

    #[test]
    fn test_empty_registry_is_no_match() {
        let result = MatchEngine::default()
            .linear_scan(&Embedding::new(vec![0.0, 0.0]), &[])
            .unwrap();
        assert_eq!(result, MatchResult::NoMatch);
        assert_eq!(result.confidence(), 0.0);
    }

    #[test]
    fn test_threshold_is_strict() {
        let candidates = [record("E1", &[0.0, 0.0])];
        let engine = MatchEngine::new(0.6);
        let beyond = engine
            .linear_scan(&Embedding::new(vec![0.65, 0.0]), &candidates)
            .unwrap();
        assert!(!beyond.is_match());

        // Exactly at the threshold is rejected too
        let at = MatchEngine::new(0.5)
            .linear_scan(&Embedding::new(vec![0.5, 0.0]), &candidates)
            .unwrap();
        assert!(!at.is_match());
    }

    #[test]
    fn test_nearest_wins_and_ties_go_to_first() {
        let candidates = [
            record("far", &[1.0, 1.0]),
            record("left", &[-0.1, 0.0]),
            record("right", &[0.1, 0.0]),
        ];
        let result = MatchEngine::default()
            .linear_scan(&Embedding::new(vec![0.0, 0.0]), &candidates)
            .unwrap();
        match result {
            MatchResult::Matched { external_id, .. } => assert_eq!(external_id, "left"),
            MatchResult::NoMatch => panic!("expected a match"),
        }
    }

    #[test]
    fn test_nan_candidate_does_not_hide_winner() {
        let query = Embedding::new(vec![0.51, 0.49]);
        for candidates in [
            [record("E1", &[0.5, 0.5]), record("BAD", &[f64::NAN, 0.0])],
            [record("BAD", &[f64::NAN, 0.0]), record("E1", &[0.5, 0.5])],
        ] {
            match MatchEngine::default().linear_scan(&query, &candidates).unwrap() {
                MatchResult::Matched { external_id, .. } => assert_eq!(external_id, "E1"),
                MatchResult::NoMatch => panic!("expected E1 to match"),
            }
        }

        let only_nan = [record("BAD", &[f64::NAN, 0.0])];
        let result = MatchEngine::default().linear_scan(&query, &only_nan).unwrap();
        assert_eq!(result, MatchResult::NoMatch);
    }

    #[test]
    fn test_confidence_not_clamped() {
        // A permissive threshold lets distances above 1 through
        let result = MatchEngine::new(3.0)
            .linear_scan(&Embedding::new(vec![0.0, 0.0]), &[record("E1", &[2.0, 0.0])])
            .unwrap();
        assert!((result.confidence() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_dimension_mismatch_surfaces() {
        let err = MatchEngine::default()
            .linear_scan(&Embedding::new(vec![0.0]), &[record("E1", &[0.0, 0.0])])
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }
}
