//! Final reconciliation result handed back to the caller.

use serde::{Deserialize, Serialize};

use crate::classifier::{StatusTier, TierCounts, TierThresholds};
use crate::resolver::{MatchAlgorithm, Resolution};
use crate::types::{BoundingBox, DetectedFace, Roster};

/// One student credited to one detected face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchAssignment {
    pub student_id: String,
    pub face_index: usize,
    pub score: f32,
    pub status_tier: StatusTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    /// Ascending by face index.
    pub matches: Vec<MatchAssignment>,
    /// Ascending.
    pub unmatched_face_indices: Vec<usize>,
    pub total_detected: usize,
    pub total_matched: usize,
    pub unmatched_count: usize,
    pub threshold: f32,
    pub algorithm: MatchAlgorithm,
    pub tier_counts: TierCounts,
    pub message: String,
}

impl ReconciliationReport {
    /// Report for a photo in which no faces were detected.
    pub fn no_faces(threshold: f32, algorithm: MatchAlgorithm) -> Self {
        Self {
            matches: Vec::new(),
            unmatched_face_indices: Vec::new(),
            total_detected: 0,
            total_matched: 0,
            unmatched_count: 0,
            threshold,
            algorithm,
            tier_counts: TierCounts::default(),
            message: "No faces detected".to_string(),
        }
    }

    /// Assemble a report from a resolution over `faces` × `roster`.
    ///
    /// Resolution rows index into `faces`, columns into `roster.entries`.
    pub fn build(
        faces: &[DetectedFace],
        roster: &Roster,
        resolution: &Resolution,
        tiers: &TierThresholds,
        threshold: f32,
        algorithm: MatchAlgorithm,
    ) -> Self {
        let mut tier_counts = TierCounts::default();

        let mut matches: Vec<MatchAssignment> = resolution
            .pairs
            .iter()
            .filter_map(|pair| {
                let face = faces.get(pair.row)?;
                let entry = roster.entries.get(pair.col)?;
                let status_tier = tiers.classify(pair.score);
                tier_counts.record(status_tier);
                Some(MatchAssignment {
                    student_id: entry.student_id.clone(),
                    face_index: face.index,
                    score: pair.score,
                    status_tier,
                    bbox: face.bbox.clone(),
                })
            })
            .collect();
        matches.sort_by_key(|m| m.face_index);

        let mut unmatched_face_indices: Vec<usize> = resolution
            .unmatched_rows
            .iter()
            .filter_map(|&row| faces.get(row).map(|f| f.index))
            .collect();
        unmatched_face_indices.sort_unstable();

        let total_detected = faces.len();
        let total_matched = matches.len();
        let unmatched_count = total_detected.saturating_sub(total_matched);

        Self {
            message: format!("Matched {total_matched} of {total_detected} detected faces"),
            matches,
            unmatched_face_indices,
            total_detected,
            total_matched,
            unmatched_count,
            threshold,
            algorithm,
            tier_counts,
        }
    }

    /// Check the structural invariants: counts add up, and no face or
    /// student appears in more than one match.
    pub fn is_consistent(&self) -> bool {
        use std::collections::HashSet;

        let mut faces = HashSet::new();
        let mut students = HashSet::new();
        let injective = self
            .matches
            .iter()
            .all(|m| faces.insert(m.face_index) && students.insert(m.student_id.as_str()));
        let disjoint = self
            .unmatched_face_indices
            .iter()
            .all(|i| !faces.contains(i));

        injective
            && disjoint
            && self.total_matched == self.matches.len()
            && self.unmatched_count == self.unmatched_face_indices.len()
            && self.total_matched + self.unmatched_count == self.total_detected
            && self.tier_counts.total() == self.total_matched
    }

    /// Student IDs credited in this report, in face order.
    pub fn matched_students(&self) -> impl Iterator<Item = &str> {
        self.matches.iter().map(|m| m.student_id.as_str())
    }

    pub fn tier_of(&self, student_id: &str) -> Option<StatusTier> {
        self.matches
            .iter()
            .find(|m| m.student_id == student_id)
            .map(|m| m.status_tier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::Pair;
    use crate::types::{Embedding, RosterEntry};

    fn faces(n: usize) -> Vec<DetectedFace> {
        (0..n)
            .map(|index| DetectedFace {
                index,
                embedding: Embedding::new(vec![1.0]),
                bbox: Some(BoundingBox {
                    x: index as f32 * 10.0,
                    y: 0.0,
                    width: 8.0,
                    height: 8.0,
                    confidence: None,
                }),
            })
            .collect()
    }

    fn roster(ids: &[&str]) -> Roster {
        Roster::new(
            ids.iter()
                .map(|id| RosterEntry {
                    student_id: id.to_string(),
                    embedding: Embedding::new(vec![1.0]),
                })
                .collect(),
        )
    }

    #[test]
    fn test_build_counts_and_tiers() {
        let f = faces(3);
        let r = roster(&["alice", "bob"]);
        let resolution = Resolution {
            pairs: vec![
                Pair { row: 0, col: 1, score: 0.9 },
                Pair { row: 2, col: 0, score: 0.65 },
            ],
            unmatched_rows: vec![1],
        };

        let report = ReconciliationReport::build(
            &f,
            &r,
            &resolution,
            &TierThresholds::default(),
            0.6,
            MatchAlgorithm::GreedyV1,
        );

        assert!(report.is_consistent());
        assert_eq!(report.total_detected, 3);
        assert_eq!(report.total_matched, 2);
        assert_eq!(report.unmatched_count, 1);
        assert_eq!(report.unmatched_face_indices, vec![1]);
        assert_eq!(report.matches[0].student_id, "bob");
        assert_eq!(report.matches[0].status_tier, StatusTier::Present);
        assert_eq!(report.tier_of("alice"), Some(StatusTier::LowConfidence));
        assert_eq!(report.tier_counts.present, 1);
        assert_eq!(report.tier_counts.low_confidence, 1);
        assert_eq!(report.matches[1].bbox.as_ref().map(|b| b.x), Some(20.0));
        assert_eq!(report.message, "Matched 2 of 3 detected faces");
        assert_eq!(report.matched_students().collect::<Vec<_>>(), vec!["bob", "alice"]);
    }

    #[test]
    fn test_face_index_comes_from_detection_not_row() {
        let mut f = faces(2);
        f[0].index = 4;
        f[1].index = 7;
        let r = roster(&["alice"]);
        let resolution = Resolution {
            pairs: vec![Pair { row: 1, col: 0, score: 0.7 }],
            unmatched_rows: vec![0],
        };
        let report = ReconciliationReport::build(
            &f,
            &r,
            &resolution,
            &TierThresholds::default(),
            0.6,
            MatchAlgorithm::GreedyV1,
        );
        assert_eq!(report.matches[0].face_index, 7);
        assert_eq!(report.unmatched_face_indices, vec![4]);
    }

    #[test]
    fn test_no_faces_report() {
        let report = ReconciliationReport::no_faces(0.6, MatchAlgorithm::GreedyV1);
        assert!(report.is_consistent());
        assert_eq!(report.total_detected, 0);
        assert!(report.matches.is_empty());
        assert!(report.unmatched_face_indices.is_empty());
    }

    #[test]
    fn test_inconsistency_detected() {
        let mut report = ReconciliationReport::no_faces(0.6, MatchAlgorithm::GreedyV1);
        report.matches.push(MatchAssignment {
            student_id: "alice".into(),
            face_index: 0,
            score: 0.9,
            status_tier: StatusTier::Present,
            bbox: None,
        });
        assert!(!report.is_consistent());
    }

    #[test]
    fn test_json_field_names() {
        let f = faces(1);
        let r = roster(&["alice"]);
        let resolution = Resolution {
            pairs: vec![Pair { row: 0, col: 0, score: 0.75 }],
            unmatched_rows: vec![],
        };
        let report = ReconciliationReport::build(
            &f,
            &r,
            &resolution,
            &TierThresholds::default(),
            0.6,
            MatchAlgorithm::OptimalV1,
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["matches"][0]["studentId"], "alice");
        assert_eq!(json["matches"][0]["faceIndex"], 0);
        assert_eq!(json["matches"][0]["statusTier"], "Uncertain");
        assert_eq!(json["totalDetected"], 1);
        assert_eq!(json["totalMatched"], 1);
        assert_eq!(json["unmatchedCount"], 0);
        assert_eq!(json["algorithm"], "optimal-v1");
        assert_eq!(json["tierCounts"]["uncertain"], 1);
        assert!(json["unmatchedFaceIndices"].as_array().unwrap().is_empty());
    }
}
