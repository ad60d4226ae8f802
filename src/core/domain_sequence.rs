//! Gap-aware domain token sequences, keyed by ORF ordinal
//!
//! The embedding treats a genome as a document of protein-domain tokens.
//! Token order must be reproducible regardless of annotation input
//! order, because vector inference is sensitive to it: groups are keyed
//! by `(contig, ORF ordinal)` and walked in sorted order, with ORFs that
//! carry no domain call filled in as `"unknown"` sentinels.

use std::collections::BTreeMap;

use crate::core::intervals::GenomicInterval;

/// Sentinel token for ORFs without a domain call.
pub const UNKNOWN_TOKEN: &str = "unknown";

/// Split an annotated sequence id into contig id and 1-based ORF ordinal.
///
/// `NZ_CVUA01000001.1_993` → `("NZ_CVUA01000001.1", 993)`. Ids without a
/// numeric ordinal suffix map to ordinal 1 (single-ORF convention).
pub fn split_orf_uid(seq_id: &str) -> (String, u32) {
    match seq_id.rsplit_once('_') {
        Some((contig, suffix)) => match suffix.parse::<u32>() {
            Ok(orf) => (contig.to_string(), orf),
            Err(_) => (seq_id.to_string(), 1),
        },
        None => (seq_id.to_string(), 1),
    }
}

/// Drop the version suffix of a Pfam accession: `PF07005.14` → `PF07005`.
pub fn strip_accession_version(accession: &str) -> String {
    match accession.split_once('.') {
        Some((base, _)) => base.to_string(),
        None => accession.to_string(),
    }
}

/// Build one ordered domain token sequence per contig.
///
/// Intervals are grouped by `(contig, ORF ordinal)` after applying
/// `fmt_fn` to each accession (identity or [`strip_accession_version`]).
/// With `keep_unknown`, every ORF gap between two domain-bearing ORFs on
/// the same contig is filled with one [`UNKNOWN_TOKEN`] per missing ORF.
/// The ordinal counter resets on each new contig; prodigal ORFs are
/// indexed starting at 1.
pub fn create_domain_sequence<F>(
    intervals: &[GenomicInterval],
    keep_unknown: bool,
    fmt_fn: F,
) -> BTreeMap<String, Vec<String>>
where
    F: Fn(&str) -> String,
{
    let mut groups: BTreeMap<(String, u32), Vec<String>> = BTreeMap::new();
    for interval in intervals {
        groups
            .entry(split_orf_uid(&interval.seq_id))
            .or_default()
            .push(fmt_fn(&interval.accession));
    }

    let mut result: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut cache_contig = String::new();
    let mut cache_orf: u32 = 0;

    for ((contig, orf), accessions) in groups {
        if cache_contig != contig {
            cache_contig = contig.clone();
            cache_orf = 0;
        }

        let tokens = result.entry(contig).or_default();
        if keep_unknown && cache_orf + 1 != orf {
            let gap = orf - cache_orf - 1;
            tokens.extend(std::iter::repeat(UNKNOWN_TOKEN.to_string()).take(gap as usize));
        }
        tokens.extend(accessions);
        cache_orf = orf;
    }

    result
}

/// Randomly drop a contiguous `by` fraction of a token sequence.
///
/// Simulates an incomplete genome assembly: a window of
/// `round(len * by)` tokens starting at a uniformly chosen position is
/// removed and the surviving prefix/suffix fragments are returned.
/// Empty fragments are dropped, so the result holds one or two
/// fragments whose combined length is `len - round(len * by)`.
pub fn truncate_sequence(tokens: &[String], by: f64) -> Vec<Vec<String>> {
    let by = by.clamp(0.0, 1.0);
    let cut = (tokens.len() as f64 * by).round() as usize;
    if cut == 0 {
        return vec![tokens.to_vec()];
    }
    if cut >= tokens.len() {
        return Vec::new();
    }

    let start = fastrand::usize(0..=tokens.len() - cut);
    let mut fragments = Vec::with_capacity(2);
    if start > 0 {
        fragments.push(tokens[..start].to_vec());
    }
    if start + cut < tokens.len() {
        fragments.push(tokens[start + cut..].to_vec());
    }
    fragments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::intervals::GenomicInterval;

    fn call(seq_id: &str, acc: &str) -> GenomicInterval {
        GenomicInterval::new(seq_id, 10, 20, acc, 1e-10).unwrap()
    }

    #[test]
    fn splits_orf_ordinal_suffix() {
        assert_eq!(
            split_orf_uid("NZ_CVUA01000001.1_993"),
            ("NZ_CVUA01000001.1".to_string(), 993)
        );
        // no numeric suffix defaults to ordinal 1
        assert_eq!(split_orf_uid("contig"), ("contig".to_string(), 1));
        assert_eq!(split_orf_uid("contig_a"), ("contig_a".to_string(), 1));
    }

    #[test]
    fn strips_accession_version() {
        assert_eq!(strip_accession_version("PF07005.14"), "PF07005");
        assert_eq!(strip_accession_version("PF07005"), "PF07005");
    }

    #[test]
    fn fills_orf_gaps_with_unknown() {
        let intervals = vec![call("ctg_1", "A"), call("ctg_2", "B"), call("ctg_4", "C")];
        let seq = create_domain_sequence(&intervals, true, |a| a.to_string());
        assert_eq!(seq["ctg"], vec!["A", "B", "unknown", "C"]);
    }

    #[test]
    fn gap_filling_can_be_disabled() {
        let intervals = vec![call("ctg_1", "A"), call("ctg_4", "C")];
        let seq = create_domain_sequence(&intervals, false, |a| a.to_string());
        assert_eq!(seq["ctg"], vec!["A", "C"]);
    }

    #[test]
    fn leading_gap_is_filled() {
        // first domain call sits on ORF 3: two leading unknowns
        let intervals = vec![call("ctg_3", "A")];
        let seq = create_domain_sequence(&intervals, true, |a| a.to_string());
        assert_eq!(seq["ctg"], vec!["unknown", "unknown", "A"]);
    }

    #[test]
    fn ordinal_counter_resets_per_contig() {
        let intervals = vec![call("alpha_1", "A"), call("alpha_2", "B"), call("beta_2", "C")];
        let seq = create_domain_sequence(&intervals, true, |a| a.to_string());
        assert_eq!(seq["alpha"], vec!["A", "B"]);
        // beta starts at ORF 2, so its own leading gap is filled
        assert_eq!(seq["beta"], vec!["unknown", "C"]);
    }

    #[test]
    fn multiple_domains_per_orf_keep_call_order() {
        let intervals = vec![call("ctg_1", "A1"), call("ctg_1", "A2")];
        let seq = create_domain_sequence(&intervals, true, |x| x.to_string());
        assert_eq!(seq["ctg"], vec!["A1", "A2"]);
    }

    #[test]
    fn accession_transform_is_applied() {
        let intervals = vec![call("ctg_1", "PF00001.21")];
        let seq = create_domain_sequence(&intervals, true, |a| strip_accession_version(a));
        assert_eq!(seq["ctg"], vec!["PF00001"]);
    }

    #[test]
    fn input_order_does_not_matter() {
        let forward = vec![call("ctg_1", "A"), call("ctg_2", "B"), call("ctg_3", "C")];
        let mut reversed = forward.clone();
        reversed.reverse();
        assert_eq!(
            create_domain_sequence(&forward, true, |a| a.to_string()),
            create_domain_sequence(&reversed, true, |a| a.to_string())
        );
    }

    #[test]
    fn truncation_fragment_lengths_add_up() {
        let tokens: Vec<String> = (0..100).map(|i| format!("PF{i:05}")).collect();
        for seed in 0..20 {
            fastrand::seed(seed);
            let fragments = truncate_sequence(&tokens, 0.3);
            assert!(fragments.len() <= 2);
            let total: usize = fragments.iter().map(|f| f.len()).sum();
            assert_eq!(total, 70);
            assert!(fragments.iter().all(|f| !f.is_empty()));
        }
    }

    #[test]
    fn truncation_edge_fractions() {
        let tokens: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        assert_eq!(truncate_sequence(&tokens, 0.0), vec![tokens.clone()]);
        assert!(truncate_sequence(&tokens, 1.0).is_empty());
    }
}
