//! Domain-annotation intervals and deterministic conflict resolution
//!
//! A genome annotation yields one interval per domain call: a span on a
//! contig (here the per-ORF sequence id), the Pfam accession and the
//! E-value of the call. Before a genome can be tokenized into a domain
//! sequence, redundant and implausible calls have to be resolved:
//! nested domains collapse onto the outer one, partially overlapping
//! calls keep the more plausible (smaller E-value) one, and consecutive
//! repeats of the same accession are collapsed to a single occurrence.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Strand of a domain call. Most annotation tables leave this blank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strand {
    Forward,
    Reverse,
}

/// A single protein-domain call on a contig.
///
/// `seq_id` is the annotated sequence identifier, usually contig id plus
/// a 1-based ORF ordinal suffix (`NZ_CVUA01000001.1_2711`). Coordinates
/// are half-open, `start < end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenomicInterval {
    pub seq_id: String,
    pub start: u64,
    pub end: u64,
    pub accession: String,
    pub evalue: f64,
    pub strand: Option<Strand>,
}

impl GenomicInterval {
    pub fn new(
        seq_id: impl Into<String>,
        start: u64,
        end: u64,
        accession: impl Into<String>,
        evalue: f64,
    ) -> Result<Self> {
        if start >= end {
            bail!("invalid interval: start {start} >= end {end}");
        }
        Ok(Self {
            seq_id: seq_id.into(),
            start,
            end,
            accession: accession.into(),
            evalue,
            strand: None,
        })
    }

    /// Unique id of an interval within a genome annotation.
    pub fn uid(&self) -> (String, u64, u64) {
        (self.seq_id.clone(), self.start, self.end)
    }

    /// Half-open span intersection on the same sequence.
    pub fn overlaps(&self, other: &GenomicInterval) -> bool {
        self.seq_id == other.seq_id && self.start < other.end && other.start < self.end
    }

    /// Is `self` strictly nested inside `other`? Not symmetric:
    /// `u.is_nested_in(v) != v.is_nested_in(u)`. Shared boundaries do
    /// not count as nesting.
    pub fn is_nested_in(&self, other: &GenomicInterval) -> bool {
        self.seq_id == other.seq_id && self.start > other.start && self.end < other.end
    }
}

/// The domain calls of one genome, keyed by `(seq_id, start, end)`.
///
/// Identical spans overwrite each other on insert (last call wins), so
/// at most one accession survives per exact span. Iteration is ordered
/// by `(seq_id, start, end)`.
#[derive(Debug, Clone, Default)]
pub struct IntervalSet {
    inner: BTreeMap<(String, u64, u64), GenomicInterval>,
}

impl IntervalSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, interval: GenomicInterval) {
        self.inner.insert(interval.uid(), interval);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Intervals in `(seq_id, start, end)` order.
    pub fn to_sorted_vec(&self) -> Vec<GenomicInterval> {
        self.inner.values().cloned().collect()
    }
}

impl FromIterator<GenomicInterval> for IntervalSet {
    fn from_iter<T: IntoIterator<Item = GenomicInterval>>(iter: T) -> Self {
        let mut set = Self::new();
        for i in iter {
            set.insert(i);
        }
        set
    }
}

/// Remove overlapping domain calls, leaving at most one winner per
/// conflicting pair.
///
/// For every ordered pair `(u, v)` of distinct intersecting intervals on
/// the same sequence:
/// - nested spans drop the inner interval, regardless of E-value;
/// - partial overlaps drop the call with the larger (less plausible)
///   E-value.
///
/// Discard decisions are taken against the original pair set, so the
/// result is independent of iteration order. On an exact E-value tie in
/// the partial-overlap case the first interval of the ordered pair is
/// dropped; callers should not rely on that choice.
pub fn remove_overlap(intervals: &IntervalSet) -> IntervalSet {
    let sorted = intervals.to_sorted_vec();
    let mut discarded: ahash::AHashSet<(String, u64, u64)> = ahash::AHashSet::new();

    for (i, u) in sorted.iter().enumerate() {
        for v in &sorted[i + 1..] {
            if v.seq_id != u.seq_id {
                break;
            }
            if !u.overlaps(v) {
                // Sorted by start, but a later interval can still start
                // inside u; only a different seq_id ends the scan.
                continue;
            }
            if v.is_nested_in(u) {
                discarded.insert(v.uid());
            } else if u.is_nested_in(v) {
                discarded.insert(u.uid());
            } else if u.evalue >= v.evalue {
                discarded.insert(u.uid());
            } else {
                discarded.insert(v.uid());
            }
        }
    }

    if !discarded.is_empty() {
        tracing::debug!(
            "overlap resolution discarded {} of {} intervals",
            discarded.len(),
            sorted.len()
        );
    }

    sorted
        .into_iter()
        .filter(|i| !discarded.contains(&i.uid()))
        .collect()
}

/// Collapse consecutive runs of the same accession on the same contig
/// to their first occurrence: `A-B-C-C-C-D` becomes `A-B-C-D`.
///
/// Input must already be ordered by `(seq_id, start)`; the sorted output
/// of [`remove_overlap`] qualifies. Non-consecutive repeats are kept.
pub fn deduplicate(intervals: &[GenomicInterval]) -> Vec<GenomicInterval> {
    let mut result: Vec<GenomicInterval> = Vec::with_capacity(intervals.len());
    for interval in intervals {
        match result.last() {
            Some(prev)
                if prev.accession == interval.accession && prev.seq_id == interval.seq_id => {}
            _ => result.push(interval.clone()),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(seq: &str, start: u64, end: u64, acc: &str, e: f64) -> GenomicInterval {
        GenomicInterval::new(seq, start, end, acc, e).unwrap()
    }

    #[test]
    fn rejects_empty_span() {
        assert!(GenomicInterval::new("c", 10, 10, "PF00001", 1e-5).is_err());
        assert!(GenomicInterval::new("c", 10, 9, "PF00001", 1e-5).is_err());
    }

    #[test]
    fn nested_discard_keeps_outer_regardless_of_evalue() {
        let set: IntervalSet = vec![
            iv("contig_1", 10, 50, "A", 1e-10),
            iv("contig_1", 20, 30, "B", 1e-5),
        ]
        .into_iter()
        .collect();

        let survivors = remove_overlap(&set).to_sorted_vec();
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].accession, "A");

        // Same outcome with the plausibility reversed
        let set: IntervalSet = vec![
            iv("contig_1", 10, 50, "A", 1e-5),
            iv("contig_1", 20, 30, "B", 1e-20),
        ]
        .into_iter()
        .collect();
        let survivors = remove_overlap(&set).to_sorted_vec();
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].accession, "A");
    }

    #[test]
    fn partial_overlap_discards_larger_evalue() {
        let set: IntervalSet = vec![
            iv("contig_1", 891, 993, "PF00136", 1e-14),
            iv("contig_1", 991, 1101, "PF13403", 1e-8),
        ]
        .into_iter()
        .collect();

        let survivors = remove_overlap(&set).to_sorted_vec();
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].accession, "PF00136");
    }

    #[test]
    fn disjoint_and_cross_contig_intervals_survive() {
        let set: IntervalSet = vec![
            iv("contig_1", 10, 20, "A", 1e-5),
            iv("contig_1", 30, 40, "B", 1e-5),
            iv("contig_2", 10, 20, "C", 1e-5),
            // same span as contig_1 interval but on another contig
            iv("contig_2", 30, 40, "D", 1e-5),
        ]
        .into_iter()
        .collect();

        assert_eq!(remove_overlap(&set).len(), 4);
    }

    #[test]
    fn survivors_never_overlap() {
        let set: IntervalSet = vec![
            iv("c", 0, 100, "A", 1e-30),
            iv("c", 10, 40, "B", 1e-10),
            iv("c", 35, 120, "C", 1e-3),
            iv("c", 150, 200, "D", 1e-6),
            iv("c", 195, 260, "E", 1e-9),
        ]
        .into_iter()
        .collect();

        let survivors = remove_overlap(&set).to_sorted_vec();
        for (i, u) in survivors.iter().enumerate() {
            for v in &survivors[i + 1..] {
                assert!(!u.overlaps(v), "{u:?} still overlaps {v:?}");
            }
        }
    }

    #[test]
    fn identical_spans_keep_last_insert() {
        let mut set = IntervalSet::new();
        set.insert(iv("c", 10, 20, "A", 1e-5));
        set.insert(iv("c", 10, 20, "B", 1e-9));
        assert_eq!(set.len(), 1);
        assert_eq!(set.to_sorted_vec()[0].accession, "B");
    }

    #[test]
    fn empty_set_yields_empty_result() {
        let set = IntervalSet::new();
        assert!(remove_overlap(&set).is_empty());
        assert!(deduplicate(&[]).is_empty());
    }

    #[test]
    fn deduplicate_collapses_consecutive_runs_only() {
        let run = vec![
            iv("c1", 10, 20, "A", 1e-5),
            iv("c1", 30, 40, "B", 1e-5),
            iv("c1", 50, 60, "C", 1e-5),
            iv("c1", 70, 80, "C", 1e-5),
            iv("c1", 90, 100, "C", 1e-5),
            iv("c1", 110, 120, "D", 1e-5),
            // interrupted repeat of C is kept
            iv("c1", 130, 140, "C", 1e-5),
            // same accession on a new contig starts a new run
            iv("c2", 10, 20, "C", 1e-5),
        ];
        let deduped = deduplicate(&run);
        let accs: Vec<&str> = deduped.iter().map(|i| i.accession.as_str()).collect();
        assert_eq!(accs, vec!["A", "B", "C", "D", "C", "C"]);
    }

    #[test]
    fn deduplicate_is_idempotent() {
        let run = vec![
            iv("c1", 10, 20, "A", 1e-5),
            iv("c1", 30, 40, "A", 1e-5),
            iv("c1", 50, 60, "B", 1e-5),
        ];
        let once = deduplicate(&run);
        let twice = deduplicate(&once);
        assert_eq!(once, twice);
    }
}
