//! Exact nearest-neighbor index over a named vector collection
//!
//! Two metrics, selected at build time: `l2` normalizes every vector to
//! unit length and scores queries by inner product (equal to cosine
//! similarity on unit vectors, descending), `none` keeps raw vectors
//! and scores by squared Euclidean distance (ascending). The index is
//! read-only after build; updates require a full rebuild.

use anyhow::{bail, Result};
use ndarray::{Array1, Array2};
use std::str::FromStr;

use crate::utils::configuration::ConfigurationError;

/// Vector normalization applied at build and query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Norm {
    /// Raw vectors, squared-Euclidean distance, ascending.
    #[default]
    None,
    /// Unit-length vectors, inner product = cosine similarity, descending.
    L2,
}

impl FromStr for Norm {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "" => Ok(Norm::None),
            "l2" | "cosine" => Ok(Norm::L2),
            other => Err(ConfigurationError::UnsupportedNorm {
                norm: other.to_string(),
            }),
        }
    }
}

impl Norm {
    /// Normalize one vector in place according to the metric. An
    /// all-zero vector is left unchanged rather than divided by zero.
    pub fn apply(&self, v: &mut Array1<f32>) {
        if let Norm::L2 = self {
            let length = v.dot(v).sqrt();
            if length > 0.0 {
                *v /= length;
            }
        }
    }
}

/// Cosine similarity between two vectors. Either vector being all-zero
/// yields 0.0.
pub fn cosine(a: &Array1<f32>, b: &Array1<f32>) -> f32 {
    let la = a.dot(a).sqrt();
    let lb = b.dot(b).sqrt();
    if la > 0.0 && lb > 0.0 {
        a.dot(b) / (la * lb)
    } else {
        0.0
    }
}

/// One search result: document id and metric-dependent score.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
}

/// Exact similarity index over an ordered `(id, vector)` collection.
///
/// Insertion order is preserved; search results map matrix positions
/// back to document ids.
pub struct VectorIndex {
    norm: Norm,
    ids: Vec<String>,
    matrix: Array2<f32>,
}

impl VectorIndex {
    /// Build the index, normalizing every row per the metric.
    pub fn build(ids: Vec<String>, mut matrix: Array2<f32>, norm: Norm) -> Result<Self> {
        if ids.len() != matrix.nrows() {
            bail!(
                "id count ({}) does not match vector count ({})",
                ids.len(),
                matrix.nrows()
            );
        }
        if let Norm::L2 = norm {
            for mut row in matrix.rows_mut() {
                let length = row.dot(&row).sqrt();
                if length > 0.0 {
                    row /= length;
                }
            }
        }
        tracing::debug!("indexed {} vectors of dimension {}", ids.len(), matrix.ncols());
        Ok(Self { norm, ids, matrix })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn norm(&self) -> Norm {
        self.norm
    }

    /// Document id at a matrix position.
    pub fn id_at(&self, position: usize) -> Option<&str> {
        self.ids.get(position).map(String::as_str)
    }

    /// Stored (normalized) vector at a matrix position.
    pub fn vector_at(&self, position: usize) -> Option<Array1<f32>> {
        if position < self.matrix.nrows() {
            Some(self.matrix.row(position).to_owned())
        } else {
            None
        }
    }

    /// Top-N neighbors of `query` under the build-time metric.
    ///
    /// The query is normalized with the same metric before scoring.
    /// Results are ordered best-first (descending cosine, ascending
    /// distance). With `min_score`, only hits with `score > min_score`
    /// are returned; the caller owns picking a metric-consistent
    /// threshold.
    pub fn search(
        &self,
        query: &Array1<f32>,
        topn: usize,
        min_score: Option<f32>,
    ) -> Vec<SearchHit> {
        let mut q = query.clone();
        self.norm.apply(&mut q);

        let mut scored: Vec<(usize, f32)> = match self.norm {
            Norm::L2 => self
                .matrix
                .dot(&q)
                .iter()
                .copied()
                .enumerate()
                .collect(),
            Norm::None => self
                .matrix
                .rows()
                .into_iter()
                .map(|row| {
                    let diff = &row.to_owned() - &q;
                    diff.dot(&diff)
                })
                .enumerate()
                .collect(),
        };

        match self.norm {
            Norm::L2 => scored.sort_by(|a, b| b.1.total_cmp(&a.1)),
            Norm::None => scored.sort_by(|a, b| a.1.total_cmp(&b.1)),
        }

        scored
            .into_iter()
            .take(topn)
            .filter(|(_, score)| min_score.map_or(true, |min| *score > min))
            .map(|(position, score)| SearchHit {
                id: self.ids[position].clone(),
                score,
            })
            .collect()
    }
}
