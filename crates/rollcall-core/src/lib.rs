//! rollcall-core — Attendance reconciliation over face embeddings.
//!
//! Takes embeddings of faces detected in a classroom photo and a roster of
//! per-student reference embeddings, and decides which face belongs to which
//! student. Detection and embedding extraction happen elsewhere; this crate
//! only sees fixed-length vectors and opaque student IDs.

pub mod classifier;
pub mod error;
pub mod reconcile;
pub mod report;
pub mod request;
pub mod resolver;
pub mod scorer;
pub mod types;
pub mod validator;

pub use classifier::{StatusTier, TierCounts, TierThresholds};
pub use error::{ErrorBody, ErrorClass, InvalidReason, ReconcileError, Side};
pub use reconcile::{reconcile, reconcile_prepared, MatchConfig, Scored};
pub use report::{MatchAssignment, ReconciliationReport};
pub use request::{MatchRequest, PreparedRequest, DEFAULT_THRESHOLD};
pub use resolver::{GreedyResolver, MatchAlgorithm, OptimalResolver, Resolution, Resolver};
pub use scorer::SimilarityMatrix;
pub use types::{BoundingBox, DetectedFace, Embedding, Roster, RosterEntry};
