//! Pairwise cosine similarity between detected faces and the roster.
//!
//! Rows (one per detected face) are independent, so they may be spread
//! across worker threads. Each cell is produced by the same sequential
//! [`Embedding::similarity`] walk regardless of which thread runs it, so the
//! matrix is bit-identical for any worker count.

use ndarray::{Array2, ArrayView1, ArrayViewMut2, Axis};

use crate::types::{DetectedFace, Embedding, Roster};

/// Dense N×M similarity table: rows are detected faces in input order,
/// columns are roster entries in roster order.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    scores: Array2<f32>,
}

impl SimilarityMatrix {
    /// Score every detected face against every roster entry.
    ///
    /// `workers` ≤ 1 computes on the calling thread.
    pub fn compute(faces: &[DetectedFace], roster: &Roster, workers: usize) -> Self {
        let references: Vec<&Embedding> = roster.entries.iter().map(|e| &e.embedding).collect();
        let mut scores = Array2::<f32>::zeros((faces.len(), references.len()));

        let workers = workers.max(1).min(faces.len().max(1));
        if workers == 1 || references.is_empty() {
            fill_rows(scores.view_mut(), faces, &references);
        } else {
            let rows_per_worker = faces.len().div_ceil(workers);
            tracing::debug!(
                workers,
                rows_per_worker,
                rows = faces.len(),
                cols = references.len(),
                "scoring in parallel"
            );
            std::thread::scope(|s| {
                for (chunk, face_chunk) in scores
                    .axis_chunks_iter_mut(Axis(0), rows_per_worker)
                    .zip(faces.chunks(rows_per_worker))
                {
                    let references = &references;
                    s.spawn(move || fill_rows(chunk, face_chunk, references));
                }
            });
        }

        Self { scores }
    }

    /// Number of detected faces (rows).
    pub fn rows(&self) -> usize {
        self.scores.nrows()
    }

    /// Number of roster entries (columns).
    pub fn cols(&self) -> usize {
        self.scores.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        self.scores.get((row, col)).copied()
    }

    pub fn row(&self, row: usize) -> ArrayView1<'_, f32> {
        self.scores.row(row)
    }

    pub fn as_array(&self) -> &Array2<f32> {
        &self.scores
    }
}

impl From<Array2<f32>> for SimilarityMatrix {
    fn from(scores: Array2<f32>) -> Self {
        Self { scores }
    }
}

fn fill_rows(mut out: ArrayViewMut2<'_, f32>, faces: &[DetectedFace], references: &[&Embedding]) {
    for (mut row, face) in out.outer_iter_mut().zip(faces) {
        for (cell, reference) in row.iter_mut().zip(references) {
            *cell = face.embedding.similarity(reference);
        }
    }
}
