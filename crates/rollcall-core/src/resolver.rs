//! Face-to-student assignment over a similarity matrix.
//!
//! Two versioned policies exist. `greedy-v1` is the production policy and
//! the default: faces are taken in detection order, each claims its single
//! best-scoring student if that student is still free and the score clears
//! the threshold, and a face whose top choice is already taken gets nothing.
//! There is no fallback to a second-best student. This is order-dependent and
//! not globally optimal, and it must stay that way: changing it changes who
//! gets attendance credit.
//!
//! `optimal-v1` maximises the total similarity of accepted pairs instead. It
//! is only used when a caller asks for it by name, and every report records
//! which policy produced it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::scorer::SimilarityMatrix;

/// A resolved (face row, roster column) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pair {
    pub row: usize,
    pub col: usize,
    pub score: f32,
}

/// Injective partial matching between matrix rows and columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// Accepted pairs, ascending by row.
    pub pairs: Vec<Pair>,
    /// Rows with no pair, ascending.
    pub unmatched_rows: Vec<usize>,
}

/// Strategy for turning a similarity matrix into face/student pairs.
pub trait Resolver {
    fn resolve(&self, matrix: &SimilarityMatrix, threshold: f32) -> Resolution;
}

/// Selectable, versioned matching policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchAlgorithm {
    #[default]
    #[serde(rename = "greedy-v1")]
    GreedyV1,
    #[serde(rename = "optimal-v1")]
    OptimalV1,
}

impl MatchAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchAlgorithm::GreedyV1 => "greedy-v1",
            MatchAlgorithm::OptimalV1 => "optimal-v1",
        }
    }

    pub fn resolver(&self) -> &'static dyn Resolver {
        match self {
            MatchAlgorithm::GreedyV1 => &GreedyResolver,
            MatchAlgorithm::OptimalV1 => &OptimalResolver,
        }
    }
}

impl fmt::Display for MatchAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "greedy-v1" => Ok(MatchAlgorithm::GreedyV1),
            "optimal-v1" => Ok(MatchAlgorithm::OptimalV1),
            other => Err(format!(
                "unknown match algorithm {other:?} (expected greedy-v1 or optimal-v1)"
            )),
        }
    }
}

/// First-come-first-served greedy matching in detection order.
pub struct GreedyResolver;

impl Resolver for GreedyResolver {
    fn resolve(&self, matrix: &SimilarityMatrix, threshold: f32) -> Resolution {
        let mut consumed = vec![false; matrix.cols()];
        let mut resolution = Resolution::default();

        for row in 0..matrix.rows() {
            let Some((col, best)) = first_max(matrix.row(row).iter().copied()) else {
                resolution.unmatched_rows.push(row);
                continue;
            };

            if best < threshold {
                tracing::trace!(row, col, score = best, "best score below threshold");
                resolution.unmatched_rows.push(row);
            } else if consumed[col] {
                // No fallback to the next-best column.
                tracing::trace!(row, col, score = best, "best candidate already claimed");
                resolution.unmatched_rows.push(row);
            } else {
                consumed[col] = true;
                resolution.pairs.push(Pair { row, col, score: best });
            }
        }

        resolution
    }
}

/// Index and value of the strictly highest score; the first one wins ties.
fn first_max(scores: impl Iterator<Item = f32>) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, s) in scores.enumerate() {
        match best {
            Some((_, b)) if s > b => best = Some((i, s)),
            None if !s.is_nan() => best = Some((i, s)),
            _ => {}
        }
    }
    best
}

/// Maximum-weight bipartite assignment (Hungarian method) over pairs whose
/// score clears the threshold.
pub struct OptimalResolver;

impl Resolver for OptimalResolver {
    fn resolve(&self, matrix: &SimilarityMatrix, threshold: f32) -> Resolution {
        let (rows, cols) = (matrix.rows(), matrix.cols());
        let weight = |r: usize, c: usize| -> f64 {
            match matrix.get(r, c) {
                Some(s) if s >= threshold => f64::from(s),
                _ => 0.0,
            }
        };

        let assigned: Vec<(usize, usize)> = if rows == 0 || cols == 0 {
            Vec::new()
        } else if rows <= cols {
            hungarian_min_cost(rows, cols, |i, j| -weight(i, j))
        } else {
            hungarian_min_cost(cols, rows, |i, j| -weight(j, i))
                .into_iter()
                .map(|(c, r)| (r, c))
                .collect()
        };

        let mut row_to_col: Vec<Option<usize>> = vec![None; rows];
        for (r, c) in assigned {
            // Pairs below threshold carry zero weight; an assignment there
            // is the same as no assignment.
            if matches!(matrix.get(r, c), Some(s) if s >= threshold) {
                row_to_col[r] = Some(c);
            }
        }

        let mut resolution = Resolution::default();
        for (row, col) in row_to_col.into_iter().enumerate() {
            match col.and_then(|c| matrix.get(row, c).map(|s| (c, s))) {
                Some((col, score)) => resolution.pairs.push(Pair { row, col, score }),
                None => resolution.unmatched_rows.push(row),
            }
        }
        resolution
    }
}

/// Minimum-cost assignment of every one of `n` rows to a distinct one of
/// `m ≥ n` columns, using the potentials formulation of the Hungarian method.
/// Returns (row, col) pairs.
fn hungarian_min_cost(n: usize, m: usize, cost: impl Fn(usize, usize) -> f64) -> Vec<(usize, usize)> {
    debug_assert!(n <= m);
    // 1-based internally; index 0 is the virtual column.
    let mut u = vec![0.0f64; n + 1];
    let mut v = vec![0.0f64; m + 1];
    let mut p = vec![0usize; m + 1];
    let mut way = vec![0usize; m + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;

            for j in 1..=m {
                if used[j] {
                    continue;
                }
                let cur = cost(i0 - 1, j - 1) - u[i0] - v[j];
                if cur < minv[j] {
                    minv[j] = cur;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }

            for j in 0..=m {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }

            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    (1..=m)
        .filter(|&j| p[j] != 0)
        .map(|j| (p[j] - 1, j - 1))
        .collect()
}
