pub mod genome_model;

pub use genome_model::{GenomeModel, Mode};
