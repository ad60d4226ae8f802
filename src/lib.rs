//! Genome similarity search over protein-domain embeddings.
//!
//! A genome is represented by its ordered protein-domain annotation:
//! overlapping domain calls are resolved, consecutive repeats
//! collapsed, and gaps between annotated ORFs filled with placeholder
//! tokens. Trained document-embedding models turn that token sequence
//! into a vector; mean-centered vectors from several models are
//! averaged into an ensemble representation and searched against an
//! exact nearest-neighbor index of reference genomes.

pub mod cli;
pub mod core;
pub mod embedding;
pub mod index;
pub mod io;
pub mod model;
pub mod utils;

pub use crate::model::{GenomeModel, Mode};

/// Crate-wide result alias.
pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
