//! Domain annotation table parsers
//!
//! Two tab/whitespace-delimited formats are supported: the output of
//! `pfam_scan.pl` (fixed 29-line free-text header, positional columns)
//! and HMMER domain tables reformatted to a headered TSV. Malformed or
//! empty hmmer input is a reported no-result (`Ok(None)`), not an
//! error, so a caller can degrade gracefully.

use ahash::AHashMap;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::path::Path;
use std::str::FromStr;

use crate::core::intervals::{GenomicInterval, IntervalSet};
use crate::utils::configuration::ConfigurationError;

/// Supported annotation table formats, validated at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum AnnotationFormat {
    /// `pfam_scan.pl` output: free-text header, whitespace columns.
    Pfamscan,
    /// HMMER domain table as headered TSV.
    Hmmer,
}

impl FromStr for AnnotationFormat {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pfamscan" => Ok(AnnotationFormat::Pfamscan),
            "hmmer" => Ok(AnnotationFormat::Hmmer),
            other => Err(ConfigurationError::UnsupportedFormat {
                format: other.to_string(),
            }),
        }
    }
}

/// Free-text preamble lines before the first record of pfam_scan.pl
/// output.
const PFAMSCAN_HEADER_LINES: usize = 29;

// pfam_scan.pl columns, by position
const PFAM_COL_SEQ_ID: usize = 0;
const PFAM_COL_ENV_START: usize = 3;
const PFAM_COL_ENV_END: usize = 4;
const PFAM_COL_HMM_ACC: usize = 5;
const PFAM_COL_EVALUE: usize = 12;

/// Load the domain calls of one genome annotation.
///
/// Identical spans overwrite each other (the [`IntervalSet`] keying),
/// matching the per-span deduplication the downstream overlap resolver
/// expects. Returns `Ok(None)` when a hmmer table is empty or carries
/// no usable header.
pub fn load_domains<P: AsRef<Path>>(
    path: P,
    format: AnnotationFormat,
) -> Result<Option<IntervalSet>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open annotation {}", path.display()))?;
    let reader = std::io::BufReader::new(file);

    match format {
        AnnotationFormat::Pfamscan => parse_pfamscan(reader).map(Some),
        AnnotationFormat::Hmmer => parse_hmmer(reader),
    }
}

fn parse_pfamscan<R: BufRead>(reader: R) -> Result<IntervalSet> {
    let mut intervals = IntervalSet::new();

    for (line_num, line) in reader.lines().enumerate().skip(PFAMSCAN_HEADER_LINES) {
        let line = line?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() <= PFAM_COL_EVALUE {
            tracing::warn!("skipping short pfamscan record on line {}", line_num + 1);
            continue;
        }

        let start: u64 = fields[PFAM_COL_ENV_START]
            .parse()
            .with_context(|| format!("bad envelope start on line {}", line_num + 1))?;
        let end: u64 = fields[PFAM_COL_ENV_END]
            .parse()
            .with_context(|| format!("bad envelope end on line {}", line_num + 1))?;
        let evalue: f64 = fields[PFAM_COL_EVALUE]
            .parse()
            .with_context(|| format!("bad E-value on line {}", line_num + 1))?;

        intervals.insert(GenomicInterval::new(
            fields[PFAM_COL_SEQ_ID],
            start,
            end,
            fields[PFAM_COL_HMM_ACC],
            evalue,
        )?);
    }

    Ok(intervals)
}

/// Parse a headered HMMER domain-table TSV.
///
/// Column positions are taken from the header line. HMMER emits two
/// `accession` columns (domain model and query sequence); the second
/// occurrence is renamed `accession_query` on read so the mapping stays
/// unambiguous. Required columns: `query_name`, `env_from`, `env_to`,
/// `accession`, `e_value`.
fn parse_hmmer<R: BufRead>(reader: R) -> Result<Option<IntervalSet>> {
    let mut lines = reader.lines();

    let header_line = match lines.next() {
        Some(line) => line?,
        None => {
            tracing::warn!("empty hmmer annotation, no result");
            return Ok(None);
        }
    };

    let mut columns: AHashMap<String, usize> = AHashMap::new();
    for (position, raw) in header_line.split('\t').enumerate() {
        let name = raw.trim();
        let key = if name == "accession" && columns.contains_key("accession") {
            "accession_query".to_string()
        } else {
            name.to_string()
        };
        columns.insert(key, position);
    }

    let required = ["query_name", "env_from", "env_to", "accession", "e_value"];
    for name in required {
        if !columns.contains_key(name) {
            tracing::warn!("hmmer annotation lacks column '{name}', no result");
            return Ok(None);
        }
    }

    let col = |name: &str| columns[name];
    let mut intervals = IntervalSet::new();
    let mut records = 0usize;

    for (line_num, line) in lines.enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        let field = |name: &str| fields.get(col(name)).copied().unwrap_or("");

        let (start, end, evalue) = match (
            field("env_from").parse::<u64>(),
            field("env_to").parse::<u64>(),
            field("e_value").parse::<f64>(),
        ) {
            (Ok(s), Ok(e), Ok(v)) => (s, e, v),
            _ => {
                tracing::warn!("skipping unparseable hmmer record on line {}", line_num + 2);
                continue;
            }
        };

        intervals.insert(GenomicInterval::new(
            field("query_name"),
            start,
            end,
            field("accession"),
            evalue,
        )?);
        records += 1;
    }

    if records == 0 {
        tracing::warn!("hmmer annotation holds no parseable records, no result");
        return Ok(None);
    }
    Ok(Some(intervals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn pfamscan_fixture(records: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 0..PFAMSCAN_HEADER_LINES {
            writeln!(file, "# header line {i}").unwrap();
        }
        for record in records {
            writeln!(file, "{record}").unwrap();
        }
        file
    }

    #[test]
    fn parses_pfamscan_records() {
        let file = pfamscan_fixture(&[
            "NZ_CVUA01000001.1_2711 1030 1110 1037 1107 PF01131.15 DNA_topoisoI Domain 1 71 72 100.1 6.3e-14 1 CL0000",
            "NZ_CVUA01000001.1_2711 1140 1182 1142 1180 PF01396.14 zf-C4_Topoisom Domain 1 38 38 55.0 1.5e-14 1 No_clan",
        ]);

        let intervals = load_domains(file.path(), AnnotationFormat::Pfamscan)
            .unwrap()
            .unwrap()
            .to_sorted_vec();

        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0].seq_id, "NZ_CVUA01000001.1_2711");
        assert_eq!(intervals[0].start, 1037);
        assert_eq!(intervals[0].end, 1107);
        assert_eq!(intervals[0].accession, "PF01131.15");
        assert!((intervals[0].evalue - 6.3e-14).abs() < 1e-20);
    }

    #[test]
    fn pfamscan_with_no_records_is_empty_but_ok() {
        let file = pfamscan_fixture(&[]);
        let intervals = load_domains(file.path(), AnnotationFormat::Pfamscan)
            .unwrap()
            .unwrap();
        assert!(intervals.is_empty());
    }

    #[test]
    fn parses_hmmer_with_renamed_duplicate_accession() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "target_name\taccession\tquery_name\taccession\tenv_from\tenv_to\te_value"
        )
        .unwrap();
        writeln!(
            file,
            "DNA_topoisoI\tPF01131.15\tNZ_C_12\t-\t1037\t1107\t6.3e-14"
        )
        .unwrap();

        let intervals = load_domains(file.path(), AnnotationFormat::Hmmer)
            .unwrap()
            .unwrap()
            .to_sorted_vec();

        assert_eq!(intervals.len(), 1);
        // first accession column is the domain, not the query's
        assert_eq!(intervals[0].accession, "PF01131.15");
        assert_eq!(intervals[0].seq_id, "NZ_C_12");
    }

    #[test]
    fn empty_hmmer_input_is_a_no_result() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let result = load_domains(file.path(), AnnotationFormat::Hmmer).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn headerless_hmmer_input_is_a_no_result() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not\ta\tdomain\ttable").unwrap();
        let result = load_domains(file.path(), AnnotationFormat::Hmmer).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn format_strings_are_validated() {
        assert_eq!("pfamscan".parse::<AnnotationFormat>().unwrap(), AnnotationFormat::Pfamscan);
        assert!("genbank".parse::<AnnotationFormat>().is_err());
    }
}
