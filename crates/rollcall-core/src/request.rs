//! Statically typed matching request.
//!
//! Unknown fields are rejected and required fields must be present. Only
//! `threshold`, `detectedBoxes` and `algorithm` are optional.

use serde::{Deserialize, Serialize};

use crate::error::ReconcileError;
use crate::resolver::MatchAlgorithm;
use crate::types::{BoundingBox, DetectedFace, Embedding, Roster, RosterEntry};

pub const DEFAULT_THRESHOLD: f32 = 0.6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct MatchRequest {
    /// N×D, in detection order.
    pub detected_embeddings: Vec<Vec<f32>>,
    /// M×D, index-aligned with `student_ids`.
    pub roster_embeddings: Vec<Vec<f32>>,
    pub student_ids: Vec<String>,
    /// Falls back to the caller's default (0.6 unless configured).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f32>,
    /// Index-aligned with `detected_embeddings` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_boxes: Option<Vec<BoundingBox>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<MatchAlgorithm>,
}

/// A request checked for shape and split into the core's input types.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub faces: Vec<DetectedFace>,
    pub roster: Roster,
    pub threshold: f32,
    pub algorithm: MatchAlgorithm,
}

impl MatchRequest {
    pub fn new(
        detected_embeddings: Vec<Vec<f32>>,
        roster_embeddings: Vec<Vec<f32>>,
        student_ids: Vec<String>,
    ) -> Self {
        Self {
            detected_embeddings,
            roster_embeddings,
            student_ids,
            threshold: None,
            detected_boxes: None,
            algorithm: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// [`prepare_with`](Self::prepare_with) using the built-in defaults.
    pub fn prepare(self) -> Result<PreparedRequest, ReconcileError> {
        self.prepare_with(DEFAULT_THRESHOLD, MatchAlgorithm::default())
    }

    /// Check request-level shape (threshold range, aligned lengths) and
    /// build faces and roster. Embedding contents are checked later by the
    /// validator.
    pub fn prepare_with(
        self,
        default_threshold: f32,
        default_algorithm: MatchAlgorithm,
    ) -> Result<PreparedRequest, ReconcileError> {
        let threshold = self.threshold.unwrap_or(default_threshold);
        validate_threshold(threshold)?;

        if self.student_ids.len() != self.roster_embeddings.len() {
            return Err(ReconcileError::InputLengthMismatch {
                field: "studentIds",
                expected: self.roster_embeddings.len(),
                actual: self.student_ids.len(),
            });
        }

        let boxes: Vec<Option<BoundingBox>> = match self.detected_boxes {
            Some(b) if b.len() != self.detected_embeddings.len() => {
                return Err(ReconcileError::InputLengthMismatch {
                    field: "detectedBoxes",
                    expected: self.detected_embeddings.len(),
                    actual: b.len(),
                });
            }
            Some(b) => b.into_iter().map(Some).collect(),
            None => vec![None; self.detected_embeddings.len()],
        };

        let faces = self
            .detected_embeddings
            .into_iter()
            .zip(boxes)
            .enumerate()
            .map(|(index, (values, bbox))| DetectedFace {
                index,
                embedding: Embedding::new(values),
                bbox,
            })
            .collect();

        let roster = Roster::new(
            self.student_ids
                .into_iter()
                .zip(self.roster_embeddings)
                .map(|(student_id, values)| RosterEntry {
                    student_id,
                    embedding: Embedding::new(values),
                })
                .collect(),
        );

        Ok(PreparedRequest {
            faces,
            roster,
            threshold,
            algorithm: self.algorithm.unwrap_or(default_algorithm),
        })
    }
}

/// Thresholds must lie in (0, 1].
pub fn validate_threshold(threshold: f32) -> Result<(), ReconcileError> {
    if threshold > 0.0 && threshold <= 1.0 {
        Ok(())
    } else {
        Err(ReconcileError::InvalidThreshold(threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_request() {
        let req = MatchRequest::from_json(
            r#"{
                "detectedEmbeddings": [[1.0, 0.0]],
                "rosterEmbeddings": [[1.0, 0.0], [0.0, 1.0]],
                "studentIds": ["s1", "s2"]
            }"#,
        )
        .unwrap();
        assert_eq!(req.threshold, None);
        assert_eq!(req.algorithm, None);
        assert!(req.detected_boxes.is_none());

        let prepared = req.prepare().unwrap();
        assert_eq!(prepared.threshold, DEFAULT_THRESHOLD);
        assert_eq!(prepared.algorithm, MatchAlgorithm::GreedyV1);
    }

    #[test]
    fn test_parse_rejects_unknown_field() {
        let err = MatchRequest::from_json(
            r#"{
                "detectedEmbeddings": [],
                "rosterEmbeddings": [],
                "studentIds": [],
                "topK": 3
            }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("topK"), "{err}");
    }

    #[test]
    fn test_parse_rejects_missing_field() {
        let err = MatchRequest::from_json(r#"{"detectedEmbeddings": [], "studentIds": []}"#)
            .unwrap_err();
        assert!(err.to_string().contains("rosterEmbeddings"), "{err}");
    }

    #[test]
    fn test_parse_algorithm_and_boxes() {
        let req = MatchRequest::from_json(
            r#"{
                "detectedEmbeddings": [[1.0]],
                "rosterEmbeddings": [[1.0]],
                "studentIds": ["s1"],
                "threshold": 0.75,
                "algorithm": "optimal-v1",
                "detectedBoxes": [{"x": 1, "y": 2, "width": 30, "height": 40}]
            }"#,
        )
        .unwrap();
        let prepared = req.prepare().unwrap();
        assert_eq!(prepared.algorithm, MatchAlgorithm::OptimalV1);
        assert_eq!(prepared.threshold, 0.75);
        assert_eq!(prepared.faces[0].bbox.as_ref().map(|b| b.height), Some(40.0));
    }

    #[test]
    fn test_prepare_with_caller_defaults() {
        let req = MatchRequest::new(vec![vec![1.0]], vec![vec![1.0]], vec!["s1".into()]);
        let prepared = req
            .clone()
            .prepare_with(0.8, MatchAlgorithm::OptimalV1)
            .unwrap();
        assert_eq!(prepared.threshold, 0.8);
        assert_eq!(prepared.algorithm, MatchAlgorithm::OptimalV1);

        let mut explicit = req;
        explicit.threshold = Some(0.65);
        explicit.algorithm = Some(MatchAlgorithm::GreedyV1);
        let prepared = explicit.prepare_with(0.8, MatchAlgorithm::OptimalV1).unwrap();
        assert_eq!(prepared.threshold, 0.65);
        assert_eq!(prepared.algorithm, MatchAlgorithm::GreedyV1);
    }

    #[test]
    fn test_prepare_length_mismatch() {
        let req = MatchRequest::new(
            vec![vec![1.0]],
            vec![vec![1.0], vec![0.5]],
            vec!["s1".into()],
        );
        assert_eq!(
            req.prepare().unwrap_err(),
            ReconcileError::InputLengthMismatch {
                field: "studentIds",
                expected: 2,
                actual: 1,
            }
        );
    }

    #[test]
    fn test_prepare_box_count_mismatch() {
        let mut req = MatchRequest::new(vec![vec![1.0], vec![0.0]], vec![vec![1.0]], vec!["s1".into()]);
        req.detected_boxes = Some(vec![BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 1.0,
            height: 1.0,
            confidence: Some(0.99),
        }]);
        assert!(matches!(
            req.prepare().unwrap_err(),
            ReconcileError::InputLengthMismatch {
                field: "detectedBoxes",
                ..
            }
        ));
    }

    #[test]
    fn test_threshold_range() {
        assert!(validate_threshold(0.6).is_ok());
        assert!(validate_threshold(1.0).is_ok());
        assert!(validate_threshold(0.0).is_err());
        assert!(validate_threshold(-0.2).is_err());
        assert!(validate_threshold(1.01).is_err());
        assert!(validate_threshold(f32::NAN).is_err());
    }

    #[test]
    fn test_prepare_assigns_detection_order_indices() {
        let req = MatchRequest::new(
            vec![vec![1.0], vec![0.5], vec![0.2]],
            vec![vec![1.0]],
            vec!["s1".into()],
        );
        let prepared = req.prepare().unwrap();
        let indices: Vec<usize> = prepared.faces.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(prepared.roster.entries[0].student_id, "s1");
    }
}
