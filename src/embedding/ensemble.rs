//! Mean-centering and cross-model ensemble vectors
//!
//! Independently trained embedding models are not directly comparable:
//! each carries its own dominant mean direction ("all-but-the-top").
//! Centering subtracts the per-model mean, never shared across models;
//! the ensemble vector of a document is the element-wise average of
//! its centered vectors across the models that know the document.

use ahash::AHashMap;
use anyhow::{bail, Result};
use ndarray::{Array1, Array2};

use crate::embedding::model::DocumentEmbedding;

/// One model's mean-centered document vectors, in model document order.
pub struct CenteredModel {
    pub ids: Vec<String>,
    pub mean: Array1<f32>,
    vectors: AHashMap<String, Array1<f32>>,
}

impl CenteredModel {
    pub fn get(&self, document_id: &str) -> Option<&Array1<f32>> {
        self.vectors.get(document_id)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

/// Ensemble vectors for the ids found in at least one model.
pub struct Ensemble {
    /// Input id order, filtered for availability.
    pub found_ids: Vec<String>,
    /// One row per found id.
    pub matrix: Array2<f32>,
    /// Ids found in none of the models.
    pub missing: usize,
}

impl Ensemble {
    pub fn missing_fraction(&self, requested: usize) -> f64 {
        if requested == 0 {
            0.0
        } else {
            self.missing as f64 / requested as f64
        }
    }
}

/// Subtract the arithmetic mean vector from every document vector of a
/// model.
///
/// The mean is computed over all documents, or over `document_ids` if a
/// subset is supplied; ids the model does not contain are skipped and
/// counted, never treated as zero vectors.
pub fn mean_center(
    model: &dyn DocumentEmbedding,
    document_ids: Option<&[String]>,
) -> Result<CenteredModel> {
    let ids: Vec<String> = match document_ids {
        Some(subset) => subset.to_vec(),
        None => model.document_ids().to_vec(),
    };

    let mut mean = Array1::<f32>::zeros(model.dimension());
    let mut found: Vec<(String, Array1<f32>)> = Vec::with_capacity(ids.len());
    let mut missing = 0usize;
    for id in &ids {
        match model.lookup(id) {
            Some(v) => {
                mean += v;
                found.push((id.clone(), v.clone()));
            }
            None => missing += 1,
        }
    }

    if found.is_empty() {
        bail!("no document vectors available for mean centering");
    }
    if missing > 0 {
        tracing::warn!("{missing} of {} ids not in model, skipped for centering", ids.len());
    }

    mean /= found.len() as f32;

    let mut vectors = AHashMap::with_capacity(found.len());
    let mut found_ids = Vec::with_capacity(found.len());
    for (id, v) in found {
        vectors.insert(id.clone(), v - &mean);
        found_ids.push(id);
    }

    Ok(CenteredModel {
        ids: found_ids,
        mean,
        vectors,
    })
}

/// Average each document's centered vectors across the models that
/// contain it.
///
/// A model lacking an id is silently skipped; ids found in no model are
/// dropped and counted. Row order follows `document_ids` filtered for
/// availability, so the result is deterministic for a given input
/// order.
pub fn build_ensemble(models: &[CenteredModel], document_ids: &[String]) -> Result<Ensemble> {
    if models.is_empty() {
        bail!("ensemble requires at least one centered model");
    }
    let dim = models[0].mean.len();
    for m in models {
        if m.mean.len() != dim {
            bail!("centered models disagree on dimension ({} vs {dim})", m.mean.len());
        }
    }

    let mut found_ids = Vec::with_capacity(document_ids.len());
    let mut rows: Vec<f32> = Vec::with_capacity(document_ids.len() * dim);
    let mut missing = 0usize;

    for id in document_ids {
        let contributions: Vec<&Array1<f32>> =
            models.iter().filter_map(|m| m.get(id)).collect();
        if contributions.is_empty() {
            missing += 1;
            continue;
        }

        let mut avg = Array1::<f32>::zeros(dim);
        for v in &contributions {
            avg += *v;
        }
        avg /= contributions.len() as f32;

        found_ids.push(id.clone());
        rows.extend(avg.iter());
    }

    if missing > 0 {
        tracing::warn!(
            "{missing} of {} ids found in no model ({:.1}% dropped)",
            document_ids.len(),
            100.0 * missing as f64 / document_ids.len() as f64
        );
    }

    let matrix = Array2::from_shape_vec((found_ids.len(), dim), rows)?;
    Ok(Ensemble {
        found_ids,
        matrix,
        missing,
    })
}
