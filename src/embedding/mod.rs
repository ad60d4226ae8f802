pub mod ensemble;
pub mod model;

pub use ensemble::{build_ensemble, mean_center, CenteredModel, Ensemble};
pub use model::{DocumentEmbedding, StoredModel};
