pub mod domain_sequence;
pub mod intervals;

// Re-export key types for downstream modules
pub use domain_sequence::{
    create_domain_sequence, split_orf_uid, strip_accession_version, truncate_sequence,
    UNKNOWN_TOKEN,
};
pub use intervals::{deduplicate, remove_overlap, GenomicInterval, IntervalSet, Strand};
