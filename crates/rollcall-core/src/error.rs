use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Which collection an embedding came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Detected,
    Reference,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Detected => f.write_str("detected"),
            Side::Reference => f.write_str("reference"),
        }
    }
}

/// Why a single embedding was rejected.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvalidReason {
    /// Zero-length vector.
    Empty,
    /// NaN or infinite component at `position`.
    NonFinite { position: usize },
    /// Length differs from the first embedding on the same side.
    InconsistentLength { expected: usize, actual: usize },
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidReason::Empty => f.write_str("embedding has no components"),
            InvalidReason::NonFinite { position } => {
                write!(f, "non-finite value at component {position}")
            }
            InvalidReason::InconsistentLength { expected, actual } => {
                write!(f, "length {actual} differs from {expected} on the same side")
            }
        }
    }
}

/// Coarse error taxonomy surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The request itself is malformed; nothing was attempted.
    InputValidation,
    /// Upstream model or enrollment data is inconsistent.
    DataIntegrity,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconcileError {
    #[error(
        "detected embeddings are {detected_dim}-dimensional but reference embeddings are \
         {reference_dim}-dimensional; students need to re-enroll with the current model"
    )]
    DimensionMismatch {
        detected_dim: usize,
        reference_dim: usize,
    },
    #[error("invalid {side} embedding at index {index}: {reason}")]
    InvalidEmbedding {
        side: Side,
        index: usize,
        reason: InvalidReason,
    },
    #[error("roster is empty but {detected} faces were detected")]
    EmptyRoster { detected: usize },
    #[error("{field} has {actual} entries, expected {expected}")]
    InputLengthMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("student id {0:?} appears more than once in the roster")]
    DuplicateStudentId(String),
    #[error("threshold {0} is outside (0, 1]")]
    InvalidThreshold(f32),
    #[error("tier cut points must be finite and strictly ordered (high {high} > medium {medium} > low {low})")]
    InvalidTierCutPoints { high: f32, medium: f32, low: f32 },
}

impl ReconcileError {
    /// Stable machine-readable identifier.
    pub fn kind(&self) -> &'static str {
        match self {
            ReconcileError::DimensionMismatch { .. } => "dimension_mismatch",
            ReconcileError::InvalidEmbedding { .. } => "invalid_embedding",
            ReconcileError::EmptyRoster { .. } => "empty_roster",
            ReconcileError::InputLengthMismatch { .. } => "input_length_mismatch",
            ReconcileError::DuplicateStudentId(_) => "duplicate_student_id",
            ReconcileError::InvalidThreshold(_) => "invalid_threshold",
            ReconcileError::InvalidTierCutPoints { .. } => "invalid_tier_cut_points",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ReconcileError::DimensionMismatch { .. } | ReconcileError::InvalidEmbedding { .. } => {
                ErrorClass::DataIntegrity
            }
            _ => ErrorClass::InputValidation,
        }
    }
}

/// Serialized form of an error for callers that speak JSON.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub class: ErrorClass,
    pub message: String,
}

impl From<&ReconcileError> for ErrorBody {
    fn from(err: &ReconcileError) -> Self {
        Self {
            kind: err.kind(),
            class: err.class(),
            message: err.to_string(),
        }
    }
}
