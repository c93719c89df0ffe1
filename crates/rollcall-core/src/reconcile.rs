//! The matching operation: validate, score, resolve, classify, report.
//!
//! Every call is self-contained. Configuration and roster come in as
//! arguments and nothing survives the call, so concurrent sessions cannot
//! see each other's data.

use serde::{Deserialize, Serialize};

use crate::classifier::TierThresholds;
use crate::error::ReconcileError;
use crate::report::ReconciliationReport;
use crate::request::{self, MatchRequest, PreparedRequest};
use crate::scorer::SimilarityMatrix;
use crate::validator::{self, Validated};

/// Per-call matching configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    pub tiers: TierThresholds,
    /// Threads used to compute the similarity matrix. 1 = calling thread only.
    pub scorer_workers: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            tiers: TierThresholds::default(),
            scorer_workers: 1,
        }
    }
}

/// Output of the validation and scoring phase.
#[derive(Debug, Clone, PartialEq)]
pub enum Scored {
    NoFaces,
    Matrix(SimilarityMatrix),
}

/// Validate inputs and build the similarity matrix.
///
/// This is the only phase worth bounding with a timeout: it is the only
/// one that fans out, and resolution must see the complete matrix.
pub fn score(prepared: &PreparedRequest, config: &MatchConfig) -> Result<Scored, ReconcileError> {
    // `PreparedRequest` fields are public, so the range is re-checked here.
    request::validate_threshold(prepared.threshold)?;

    match validator::validate(&prepared.faces, &prepared.roster)? {
        Validated::NoFaces => Ok(Scored::NoFaces),
        Validated::Ready { dim } => {
            tracing::debug!(
                faces = prepared.faces.len(),
                students = prepared.roster.len(),
                dim,
                "inputs validated"
            );
            Ok(Scored::Matrix(SimilarityMatrix::compute(
                &prepared.faces,
                &prepared.roster,
                config.scorer_workers,
            )))
        }
    }
}

/// Resolve matches over a scored request and assemble the report.
/// Runs to completion; cannot fail once scoring succeeded.
pub fn resolve(
    prepared: &PreparedRequest,
    scored: &Scored,
    config: &MatchConfig,
) -> ReconciliationReport {
    let matrix = match scored {
        Scored::NoFaces => {
            return ReconciliationReport::no_faces(prepared.threshold, prepared.algorithm);
        }
        Scored::Matrix(matrix) => matrix,
    };

    let resolution = prepared
        .algorithm
        .resolver()
        .resolve(matrix, prepared.threshold);

    let report = ReconciliationReport::build(
        &prepared.faces,
        &prepared.roster,
        &resolution,
        &config.tiers,
        prepared.threshold,
        prepared.algorithm,
    );

    tracing::info!(
        algorithm = %prepared.algorithm,
        threshold = prepared.threshold,
        detected = report.total_detected,
        matched = report.total_matched,
        unmatched = report.unmatched_count,
        "reconciliation complete"
    );

    report
}

/// Run a prepared request through every phase.
pub fn reconcile_prepared(
    prepared: &PreparedRequest,
    config: &MatchConfig,
) -> Result<ReconciliationReport, ReconcileError> {
    let scored = score(prepared, config)?;
    Ok(resolve(prepared, &scored, config))
}

/// Reconcile detected faces against a roster.
///
/// Validation and integrity errors abort the whole call; no partial report
/// is returned.
pub fn reconcile(
    request: MatchRequest,
    config: &MatchConfig,
) -> Result<ReconciliationReport, ReconcileError> {
    let prepared = request.prepare().map_err(|e| {
        tracing::warn!(kind = e.kind(), error = %e, "request rejected");
        e
    })?;
    reconcile_prepared(&prepared, config).map_err(|e| {
        tracing::warn!(kind = e.kind(), error = %e, "reconciliation failed");
        e
    })
}
