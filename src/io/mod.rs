pub mod annotations;
pub mod taxonomy;

pub use annotations::{load_domains, AnnotationFormat};
pub use taxonomy::{taxonomy_for_ids, GtdbTaxonomy, Lineage};
