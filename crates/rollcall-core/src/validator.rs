//! Embedding shape and integrity checks.
//!
//! Runs before any scoring. Mismatched dimensions are rejected outright:
//! a padded or truncated vector would still produce a plausible-looking
//! similarity score, and that score would be wrong.
//!
//! When no faces were detected only roster identity (unique student IDs)
//! is checked; roster embeddings are not inspected because nothing will be
//! scored against them.

use std::collections::HashSet;

use crate::error::{InvalidReason, ReconcileError, Side};
use crate::types::{DetectedFace, Embedding, Roster};

/// Outcome of a successful validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validated {
    /// No faces were detected. The caller short-circuits to an empty report.
    NoFaces,
    /// Both sides are non-empty, finite, and share dimensionality `dim`.
    Ready { dim: usize },
}

/// Validate detected faces against a roster.
pub fn validate(faces: &[DetectedFace], roster: &Roster) -> Result<Validated, ReconcileError> {
    check_unique_ids(roster)?;

    if faces.is_empty() {
        return Ok(Validated::NoFaces);
    }
    if roster.is_empty() {
        return Err(ReconcileError::EmptyRoster {
            detected: faces.len(),
        });
    }

    let detected_dim = check_side(faces.iter().map(|f| &f.embedding), Side::Detected)?;
    let reference_dim = check_side(roster.entries.iter().map(|e| &e.embedding), Side::Reference)?;

    if detected_dim != reference_dim {
        tracing::warn!(detected_dim, reference_dim, "embedding dimension mismatch");
        return Err(ReconcileError::DimensionMismatch {
            detected_dim,
            reference_dim,
        });
    }

    Ok(Validated::Ready { dim: detected_dim })
}

fn check_unique_ids(roster: &Roster) -> Result<(), ReconcileError> {
    let mut seen = HashSet::with_capacity(roster.len());
    for id in roster.student_ids() {
        if !seen.insert(id) {
            return Err(ReconcileError::DuplicateStudentId(id.to_string()));
        }
    }
    Ok(())
}

/// Check one non-empty collection; returns its common dimension.
fn check_side<'a>(
    embeddings: impl Iterator<Item = &'a Embedding>,
    side: Side,
) -> Result<usize, ReconcileError> {
    let mut expected: Option<usize> = None;

    for (index, embedding) in embeddings.enumerate() {
        let invalid = |reason| ReconcileError::InvalidEmbedding {
            side,
            index,
            reason,
        };

        if embedding.values.is_empty() {
            return Err(invalid(InvalidReason::Empty));
        }
        if let Some(position) = embedding.values.iter().position(|v| !v.is_finite()) {
            return Err(invalid(InvalidReason::NonFinite { position }));
        }
        match expected {
            None => expected = Some(embedding.dim()),
            Some(dim) if dim != embedding.dim() => {
                return Err(invalid(InvalidReason::InconsistentLength {
                    expected: dim,
                    actual: embedding.dim(),
                }));
            }
            Some(_) => {}
        }
    }

    Ok(expected.unwrap_or(0))
}
