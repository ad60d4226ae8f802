//! Trained document-embedding models
//!
//! The embedding itself is an external collaborator: anything that can
//! (1) infer a vector from a token sequence and (2) look up the stored
//! vector of a known document id satisfies [`DocumentEmbedding`]. The
//! retrieval engine never looks past this seam.
//!
//! [`StoredModel`] is the bundled adapter: a serialized model file
//! holding the trained document vectors plus the token vectors needed
//! for inference on unseen genomes.

use ahash::AHashMap;
use anyhow::{bail, Context, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The two capabilities the engine needs from a trained embedding model,
/// plus enumeration of its document ids.
pub trait DocumentEmbedding {
    /// Vector dimensionality of the model.
    fn dimension(&self) -> usize;

    /// All document ids known to the model, in training order.
    fn document_ids(&self) -> &[String];

    /// Stored vector of a trained document, if the id is known.
    fn lookup(&self, document_id: &str) -> Option<&Array1<f32>>;

    /// Infer a vector for an unseen token sequence, running `steps`
    /// inference iterations. More steps, less variance between repeated
    /// inferences of the same sequence.
    fn infer_vector(&self, tokens: &[String], steps: usize) -> Array1<f32>;
}

#[derive(Serialize, Deserialize)]
struct VectorRecord {
    id: String,
    vector: Vec<f32>,
}

/// On-disk model layout. Documents are a list, not a map, so the
/// training order of document ids survives serialization.
#[derive(Serialize, Deserialize)]
struct StoredModelFile {
    dimension: usize,
    documents: Vec<VectorRecord>,
    tokens: Vec<VectorRecord>,
}

/// A trained embedding model loaded from a serialized file.
pub struct StoredModel {
    dimension: usize,
    doc_ids: Vec<String>,
    doc_vectors: AHashMap<String, Array1<f32>>,
    token_vectors: AHashMap<String, Array1<f32>>,
}

impl StoredModel {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open model file {}", path.display()))?;
        let parsed: StoredModelFile = serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("failed to parse model file {}", path.display()))?;
        Self::from_parts(parsed)
    }

    /// Build a model from already-materialized vectors. Used by tests
    /// and by tooling that converts models trained elsewhere.
    pub fn from_vectors(
        dimension: usize,
        documents: Vec<(String, Vec<f32>)>,
        tokens: Vec<(String, Vec<f32>)>,
    ) -> Result<Self> {
        Self::from_parts(StoredModelFile {
            dimension,
            documents: documents
                .into_iter()
                .map(|(id, vector)| VectorRecord { id, vector })
                .collect(),
            tokens: tokens
                .into_iter()
                .map(|(id, vector)| VectorRecord { id, vector })
                .collect(),
        })
    }

    fn from_parts(parsed: StoredModelFile) -> Result<Self> {
        if parsed.dimension == 0 {
            bail!("model dimension must be positive");
        }
        if parsed.documents.is_empty() {
            bail!("model contains no document vectors");
        }

        let mut doc_ids = Vec::with_capacity(parsed.documents.len());
        let mut doc_vectors = AHashMap::with_capacity(parsed.documents.len());
        for record in parsed.documents {
            if record.vector.len() != parsed.dimension {
                bail!(
                    "document {} has dimension {} (model dimension {})",
                    record.id,
                    record.vector.len(),
                    parsed.dimension
                );
            }
            doc_ids.push(record.id.clone());
            doc_vectors.insert(record.id, Array1::from_vec(record.vector));
        }

        let mut token_vectors = AHashMap::with_capacity(parsed.tokens.len());
        for record in parsed.tokens {
            if record.vector.len() != parsed.dimension {
                bail!(
                    "token {} has dimension {} (model dimension {})",
                    record.id,
                    record.vector.len(),
                    parsed.dimension
                );
            }
            token_vectors.insert(record.id, Array1::from_vec(record.vector));
        }

        Ok(Self {
            dimension: parsed.dimension,
            doc_ids,
            doc_vectors,
            token_vectors,
        })
    }
}

impl DocumentEmbedding for StoredModel {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn document_ids(&self) -> &[String] {
        &self.doc_ids
    }

    fn lookup(&self, document_id: &str) -> Option<&Array1<f32>> {
        self.doc_vectors.get(document_id)
    }

    fn infer_vector(&self, tokens: &[String], steps: usize) -> Array1<f32> {
        let known: Vec<&Array1<f32>> = tokens
            .iter()
            .filter_map(|t| self.token_vectors.get(t))
            .collect();

        if known.is_empty() {
            tracing::warn!(
                "none of {} tokens are in the model vocabulary, inferring zero vector",
                tokens.len()
            );
            return Array1::zeros(self.dimension);
        }

        // Stochastic composition: each step accumulates one uniformly
        // sampled token vector. Averaging over more steps shrinks the
        // variance between repeated inferences of the same sequence.
        let steps = steps.max(1);
        let mut acc = Array1::<f32>::zeros(self.dimension);
        for _ in 0..steps {
            acc += known[fastrand::usize(0..known.len())];
        }
        acc / steps as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_model() -> StoredModel {
        StoredModel::from_vectors(
            2,
            vec![
                ("GCA_A".to_string(), vec![1.0, 0.0]),
                ("GCA_B".to_string(), vec![0.0, 1.0]),
            ],
            vec![
                ("PF00001".to_string(), vec![2.0, 0.0]),
                ("PF00002".to_string(), vec![0.0, 2.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn lookup_and_enumeration() {
        let model = tiny_model();
        assert_eq!(model.dimension(), 2);
        assert_eq!(model.document_ids(), ["GCA_A", "GCA_B"]);
        assert_eq!(model.lookup("GCA_A").unwrap()[0], 1.0);
        assert!(model.lookup("GCA_missing").is_none());
    }

    #[test]
    fn rejects_dimension_mismatch() {
        let result = StoredModel::from_vectors(
            3,
            vec![("GCA_A".to_string(), vec![1.0, 0.0])],
            vec![],
        );
        assert!(result.is_err());
    }

    #[test]
    fn inference_of_single_known_token_is_exact() {
        let model = tiny_model();
        let tokens = vec!["PF00001".to_string()];
        let v = model.infer_vector(&tokens, 100);
        assert_eq!(v, Array1::from_vec(vec![2.0, 0.0]));
    }

    #[test]
    fn inference_without_vocabulary_is_zero() {
        let model = tiny_model();
        let tokens = vec!["unknown".to_string()];
        let v = model.infer_vector(&tokens, 100);
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn inference_stays_in_token_convex_hull() {
        let model = tiny_model();
        let tokens = vec!["PF00001".to_string(), "PF00002".to_string()];
        fastrand::seed(7);
        let v = model.infer_vector(&tokens, 1000);
        // each component is a fraction of the corresponding token vector
        assert!(v[0] > 0.0 && v[0] < 2.0);
        assert!(v[1] > 0.0 && v[1] < 2.0);
        assert!((v[0] + v[1] - 2.0).abs() < 1e-3);
    }
}
