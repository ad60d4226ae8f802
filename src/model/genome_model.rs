//! The genome embedding façade
//!
//! Composes interval resolution, domain sequence assembly, ensemble
//! centering and the vector index into one Ready-state object:
//! `infer` turns an annotation file into a query vector, `search`
//! retrieves the nearest indexed genomes, `subset` hands out cached
//! vectors. All state is immutable once `load` returns, so a
//! `GenomeModel` is safe to share across read-only callers.

use ahash::AHashMap;
use anyhow::{Context, Result};
use ndarray::Array1;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::domain_sequence::{
    create_domain_sequence, strip_accession_version, truncate_sequence,
};
use crate::core::intervals::{deduplicate, remove_overlap};
use crate::embedding::ensemble::{build_ensemble, mean_center, CenteredModel};
use crate::embedding::model::{DocumentEmbedding, StoredModel};
use crate::index::{Norm, SearchHit, VectorIndex};
use crate::io::annotations::{load_domains, AnnotationFormat};
use crate::utils::configuration::ConfigurationError;

/// Serialized model file name inside each model subdirectory.
const MODEL_FILE: &str = "genovec_r89.model.json";

/// Which trained models to load. Each mode names a fixed subset of the
/// available models; the numbers are the window hyperparameters the
/// models were trained with (small windows capture accessory genome
/// context, large windows core genome context).
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
    Ensemble,
    Core,
    Accessory,
}

impl Mode {
    pub fn model_names(&self) -> &'static [&'static str] {
        match self {
            Mode::Ensemble => &["22", "45", "93"],
            Mode::Core => &["93"],
            Mode::Accessory => &["22"],
        }
    }
}

impl FromStr for Mode {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ensemble" => Ok(Mode::Ensemble),
            "core" => Ok(Mode::Core),
            "accessory" => Ok(Mode::Accessory),
            other => Err(ConfigurationError::UnknownMode {
                mode: other.to_string(),
            }),
        }
    }
}

/// Result of [`GenomeModel::subset`]: the cached vectors that exist,
/// plus a count of the requested ids that do not.
pub struct Subset {
    pub vectors: AHashMap<String, Array1<f32>>,
    pub missing: usize,
}

/// A loaded ensemble of trained genome embedding models plus the
/// similarity index over their combined vector collection.
pub struct GenomeModel {
    mode: Mode,
    norm: Norm,
    models: Vec<StoredModel>,
    /// Per-model mean vectors, aligned with `models`. Subtracted from
    /// inferred vectors so they live in the same centered space as the
    /// indexed collection.
    means: Vec<Array1<f32>>,
    /// Document ids of the first model, the reference id set.
    names: Vec<String>,
    /// Cached `{document id -> normalized ensemble vector}`.
    embedding: AHashMap<String, Array1<f32>>,
    index: VectorIndex,
    dimension: usize,
    ensemble_inference_warned: AtomicBool,
}

impl GenomeModel {
    /// Load the models of `mode` from `model_dir` and build the Ready
    /// state: per-model means, the centered ensemble collection, the
    /// index, and the direct-lookup cache.
    pub fn load<P: AsRef<Path>>(model_dir: P, mode: Mode, norm: Norm) -> Result<Self> {
        let model_dir = model_dir.as_ref();

        let mut models = Vec::new();
        for name in mode.model_names() {
            let path = model_dir.join(name).join(MODEL_FILE);
            let model = StoredModel::load(&path)
                .with_context(|| format!("failed to load model '{name}'"))?;
            models.push(model);
        }
        tracing::info!("loaded {} model(s) for {mode:?} mode", models.len());

        let dimension = models[0].dimension();
        for (name, model) in mode.model_names().iter().zip(&models) {
            if model.dimension() != dimension {
                anyhow::bail!(
                    "model '{name}' has dimension {} (expected {dimension})",
                    model.dimension()
                );
            }
        }

        let names: Vec<String> = models[0].document_ids().to_vec();

        tracing::info!("subtracting mean from model(s)");
        let mut centered: Vec<CenteredModel> = Vec::with_capacity(models.len());
        let mut means: Vec<Array1<f32>> = Vec::with_capacity(models.len());
        for model in &models {
            let c = mean_center(model, None)?;
            means.push(c.mean.clone());
            centered.push(c);
        }

        tracing::info!("indexing model(s) with {norm:?} norm");
        let ensemble = build_ensemble(&centered, &names)?;
        if ensemble.missing > 0 {
            tracing::warn!(
                "{} reference ids missing from every model ({:.1}% dropped)",
                ensemble.missing,
                100.0 * ensemble.missing_fraction(names.len())
            );
        }

        let index = VectorIndex::build(ensemble.found_ids.clone(), ensemble.matrix, norm)?;

        let mut embedding = AHashMap::with_capacity(index.len());
        for (position, id) in ensemble.found_ids.iter().enumerate() {
            // vector_at returns the stored row, already normalized
            if let Some(v) = index.vector_at(position) {
                embedding.insert(id.clone(), v);
            }
        }

        Ok(Self {
            mode,
            norm,
            models,
            means,
            names,
            embedding,
            index,
            dimension,
            ensemble_inference_warned: AtomicBool::new(false),
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn norm(&self) -> Norm {
        self.norm
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Reference document ids, in model training order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Cached normalized vector of an indexed genome.
    pub fn vector_for(&self, document_id: &str) -> Option<&Array1<f32>> {
        self.embedding.get(document_id)
    }

    /// Infer a query vector from a domain annotation file.
    ///
    /// Load domains, resolve overlaps, deduplicate
    /// consecutive repeats, assemble the gap-filled domain sequence
    /// (version-stripped accessions), optionally truncate by a random
    /// contiguous fraction, infer one vector per loaded model for
    /// `steps` iterations, subtract that model's mean, average across
    /// models and re-normalize.
    ///
    /// Returns `Ok(None)` when the annotation yields no usable records
    /// (the malformed-input no-result contract).
    pub fn infer<P: AsRef<Path>>(
        &self,
        annotation: P,
        format: AnnotationFormat,
        steps: usize,
        truncate_by: f64,
    ) -> Result<Option<Array1<f32>>> {
        if self.mode == Mode::Ensemble
            && !self.ensemble_inference_warned.swap(true, Ordering::Relaxed)
        {
            tracing::warn!(
                "inference with a model ensemble works well only if the resulting \
                 vectors are not combined with the indexed ones: small inference \
                 variations magnify across the ensemble and offset inferred from \
                 indexed vectors by more than they actually differ"
            );
        }

        let Some(intervals) = load_domains(annotation, format)? else {
            return Ok(None);
        };
        if intervals.is_empty() {
            tracing::warn!("annotation holds no domain calls, no result");
            return Ok(None);
        }

        let resolved = remove_overlap(&intervals).to_sorted_vec();
        let resolved = deduplicate(&resolved);
        let sequence = create_domain_sequence(&resolved, true, strip_accession_version);

        // Contigs are concatenated; the artificial context at contig
        // boundaries has negligible effect on the inferred vector for
        // reasonably fragmented assemblies.
        let mut flat: Vec<String> = sequence.into_values().flatten().collect();
        if truncate_by > 0.0 {
            flat = truncate_sequence(&flat, truncate_by)
                .into_iter()
                .flatten()
                .collect();
            if flat.is_empty() {
                tracing::warn!("truncation removed the whole sequence, no result");
                return Ok(None);
            }
        }

        let mut bag: Vec<Array1<f32>> = Vec::with_capacity(self.models.len());
        for (model, mean) in self.models.iter().zip(&self.means) {
            let v = model.infer_vector(&flat, steps);
            bag.push(v - mean);
        }

        let mut ensemble = Array1::<f32>::zeros(self.dimension);
        for v in &bag {
            ensemble += v;
        }
        ensemble /= bag.len() as f32;
        self.norm.apply(&mut ensemble);

        Ok(Some(ensemble))
    }

    /// Top-N neighbors of a query vector. Delegates to the index.
    pub fn search(
        &self,
        query: &Array1<f32>,
        topn: usize,
        min_score: Option<f32>,
    ) -> Vec<SearchHit> {
        self.index.search(query, topn, min_score)
    }

    /// Cached vectors for the requested ids. Missing ids are counted
    /// and reported, never an error.
    pub fn subset(&self, document_ids: &[String]) -> Subset {
        let mut vectors = AHashMap::with_capacity(document_ids.len());
        let mut missing = 0usize;
        for id in document_ids {
            match self.embedding.get(id) {
                Some(v) => {
                    vectors.insert(id.clone(), v.clone());
                }
                None => missing += 1,
            }
        }
        if missing > 0 {
            tracing::warn!("{missing} records not found");
        }
        Subset { vectors, missing }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_selects_fixed_model_subsets() {
        assert_eq!(Mode::Ensemble.model_names(), ["22", "45", "93"]);
        assert_eq!(Mode::Core.model_names(), ["93"]);
        assert_eq!(Mode::Accessory.model_names(), ["22"]);
    }

    #[test]
    fn mode_strings_are_validated() {
        assert_eq!("ensemble".parse::<Mode>().unwrap(), Mode::Ensemble);
        assert_eq!("core".parse::<Mode>().unwrap(), Mode::Core);
        assert_eq!("accessory".parse::<Mode>().unwrap(), Mode::Accessory);
        assert!("everything".parse::<Mode>().is_err());
    }
}
