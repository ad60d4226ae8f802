//! GTDB taxonomy lookup for search hits
//!
//! Used only downstream of a similarity search: given hit accessions,
//! attach their GTDB lineages. Misses are counted and reported, never
//! fatal.

use ahash::AHashMap;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::path::Path;

/// GTDB ranks, outermost first.
pub const RANKS: [&str; 7] = [
    "domain", "phylum", "class", "order", "family", "genus", "species",
];

/// One genome's taxonomy as `(rank, value)` pairs in rank order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineage(pub Vec<(String, String)>);

impl Lineage {
    pub fn rank(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(rank, _)| rank == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Accession → lineage table loaded from a GTDB taxonomy TSV.
pub struct GtdbTaxonomy {
    records: AHashMap<String, Lineage>,
}

/// Strip the GTDB database prefix from an accession:
/// `RS_GCF_000759855.1` → `GCF_000759855.1`.
fn strip_name(accession: &str) -> &str {
    accession
        .strip_prefix("RS_")
        .or_else(|| accession.strip_prefix("GB_"))
        .unwrap_or(accession)
}

impl GtdbTaxonomy {
    /// Load a GTDB taxonomy table: per line, an accession and a
    /// semicolon-joined lineage (`d__Bacteria;p__Firmicutes;...`),
    /// tab-separated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open taxonomy {}", path.display()))?;
        let reader = std::io::BufReader::new(file);

        let mut records = AHashMap::new();
        for line in reader.lines() {
            let line = line?;
            let Some((accession, lineage)) = line.trim_end().split_once('\t') else {
                continue;
            };
            let values: Vec<(String, String)> = RANKS
                .iter()
                .zip(lineage.split(';'))
                .map(|(rank, value)| {
                    // drop the rank marker: d__Bacteria → Bacteria
                    let value = value.trim();
                    let value = value.split_once("__").map_or(value, |(_, v)| v);
                    (rank.to_string(), value.to_string())
                })
                .collect();
            records.insert(strip_name(accession).to_string(), Lineage(values));
        }

        tracing::info!("loaded taxonomy for {} accessions", records.len());
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, accession: &str) -> Option<&Lineage> {
        self.records.get(strip_name(accession))
    }
}

/// Look up lineages for a batch of accessions. Returns the found
/// `(accession, lineage)` pairs in input order plus the miss count.
pub fn taxonomy_for_ids<'a>(
    taxonomy: &'a GtdbTaxonomy,
    ids: &[String],
) -> (Vec<(String, &'a Lineage)>, usize) {
    let mut found = Vec::with_capacity(ids.len());
    let mut missing = 0usize;
    for id in ids {
        match taxonomy.get(id) {
            Some(lineage) => found.push((id.clone(), lineage)),
            None => missing += 1,
        }
    }
    if missing > 0 {
        tracing::warn!("{missing} of {} accessions have no taxonomy record", ids.len());
    }
    (found, missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "RS_GCF_000759855.1\td__Bacteria;p__Firmicutes;c__Bacilli;o__Lactobacillales;f__Lactobacillaceae;g__Lactobacillus;s__Lactobacillus gasseri"
        )
        .unwrap();
        writeln!(
            file,
            "GB_GCA_000634215.1\td__Archaea;p__Halobacteriota;c__;o__;f__;g__;s__"
        )
        .unwrap();
        file
    }

    #[test]
    fn loads_and_strips_database_prefixes() {
        let taxonomy = GtdbTaxonomy::load(fixture().path()).unwrap();
        assert_eq!(taxonomy.len(), 2);

        let lineage = taxonomy.get("GCF_000759855.1").unwrap();
        assert_eq!(lineage.rank("domain"), Some("Bacteria"));
        assert_eq!(lineage.rank("genus"), Some("Lactobacillus"));

        // prefixed query hits the same record
        assert!(taxonomy.get("RS_GCF_000759855.1").is_some());
    }

    #[test]
    fn batch_lookup_counts_misses() {
        let taxonomy = GtdbTaxonomy::load(fixture().path()).unwrap();
        let ids: Vec<String> = ["GCF_000759855.1", "GCA_000634215.1", "GCA_missing.1"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let (found, missing) = taxonomy_for_ids(&taxonomy, &ids);
        assert_eq!(found.len(), 2);
        assert_eq!(missing, 1);
        assert_eq!(found[0].0, "GCF_000759855.1");
    }

    #[test]
    fn empty_rank_values_stay_empty() {
        let taxonomy = GtdbTaxonomy::load(fixture().path()).unwrap();
        let lineage = taxonomy.get("GCA_000634215.1").unwrap();
        assert_eq!(lineage.rank("class"), Some(""));
    }
}
