//! The coverage aggregator (spec §4.5): folds a stream of [`Hit`]s into a
//! per-base depth vector and a per-base mutation multiset for one template,
//! and exposes derived statistics over it.
//!
//! Grounded on `examples/original_source/kvarq/analyse.py`'s `Coverage`
//! class, split per spec §9's redesign note into a plain-data
//! [`CoverageBuffers`] (the thing the aggregator actually mutates) and a
//! [`CoverageView`] that computes derived metrics on demand against an
//! immutable borrow — this avoids the original's pattern of a class that
//! both owns the arrays and caches derived state.

use crate::base::Base;
use crate::error::ScanError;
use crate::hit::Hit;
use crate::template::{Strand, Template, TemplateEntry, TemplateKind};
use foldhash::HashMap;
use std::ops::Range;

/// Raw per-template coverage: depth per position, plus a multiset of
/// mutant bases observed at each position (spec §3 `Coverage`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageBuffers {
    pub depth: Vec<u32>,
    /// `mutations[i]` never contains `template[i]` itself (spec §8
    /// invariant 2: "mutation template exclusion").
    pub mutations: Vec<HashMap<Base, u32>>,
}

impl CoverageBuffers {
    #[must_use]
    pub fn new(len: usize) -> CoverageBuffers {
        CoverageBuffers { depth: vec![0; len], mutations: vec![HashMap::default(); len] }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.depth.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.depth.is_empty()
    }

    #[inline]
    fn mutation_count(&self, i: usize) -> u32 {
        self.mutations[i].values().sum()
    }

    /// Serializes to the two dash-separated strings described in spec
    /// §4.5: depths, a space, then `pos[bases]-pos[bases]-…` for every
    /// position with at least one mutation.
    #[must_use]
    pub fn serialize(&self) -> String {
        let depth_str = self.depth.iter().map(u32::to_string).collect::<Vec<_>>().join("-");

        let mut positions: Vec<usize> = (0..self.len()).filter(|&i| !self.mutations[i].is_empty()).collect();
        positions.sort_unstable();

        let mut_str = positions
            .into_iter()
            .map(|i| {
                let mut bases: Vec<u8> = self.mutations[i]
                    .iter()
                    .flat_map(|(&b, &count)| std::iter::repeat_n(b.to_ascii(), count as usize))
                    .collect();
                bases.sort_unstable();
                format!("{i}[{}]", String::from_utf8_lossy(&bases))
            })
            .collect::<Vec<_>>()
            .join("-");

        format!("{depth_str} {mut_str}")
    }

    /// Parses the inverse of [`Self::serialize`] (spec §8 invariant 6).
    pub fn deserialize(s: &str) -> Result<CoverageBuffers, ScanError> {
        let bad = |reason| ScanError::MalformedRecord { offset: 0, reason };
        let (depth_str, mut_str) = s.split_once(' ').unwrap_or((s, ""));

        let depth: Vec<u32> = depth_str
            .split('-')
            .map(|tok| tok.parse::<u32>().map_err(|_| bad("invalid coverage depth token")))
            .collect::<Result<_, _>>()?;

        let mut mutations = vec![HashMap::default(); depth.len()];
        if !mut_str.is_empty() {
            for part in mut_str.split('-') {
                let open = part.find('[').ok_or_else(|| bad("malformed mutation token: missing '['"))?;
                let close = part.find(']').ok_or_else(|| bad("malformed mutation token: missing ']'"))?;
                let idx: usize = part[..open].parse().map_err(|_| bad("malformed mutation token: bad index"))?;
                if idx >= mutations.len() {
                    return Err(bad("mutation token index out of range"));
                }
                for byte in part[open + 1..close].bytes() {
                    let base = Base::from_ascii(byte).ok_or_else(|| bad("mutation token has a non-ACGTN byte"))?;
                    *mutations[idx].entry(base).or_insert(0) += 1;
                }
            }
        }

        Ok(CoverageBuffers { depth, mutations })
    }
}

/// Applies one hit to `buffers` (spec §4.5 "apply-hit contract").
///
/// `forward_template` is the originating template's forward-strand entry
/// (index `0..K`) regardless of which strand `entry`/`hit` matched on;
/// reverse-strand hits are re-indexed into forward-strand coordinates and
/// their read bases complemented, so every coverage is reported in the
/// forward frame (spec §4.5, §8 invariant 5 "reverse-strand symmetry").
/// `window` is the quality-trimmed read window the hit was matched
/// against — `hit.seq_pos` is an offset into it, not into the full read.
pub fn apply_hit(buffers: &mut CoverageBuffers, hit: &Hit, entry: &TemplateEntry, forward_template: &Template, window: &[Base]) {
    let lt = entry.template.len() as i64;
    let a = hit.seq_pos.max(0);
    // `hit.length` is already the clipped overlap span computed by the
    // matcher (`b - a` there too), not a read-relative span — adding it to
    // `seq_pos` directly instead of to `a` double-counts a left overhang.
    let b = (a + hit.length as i64).min(lt);

    for p in a..b {
        let read_idx = (p - hit.seq_pos) as usize;
        let Some(&read_base) = window.get(read_idx) else { continue };

        let (fwd_pos, fwd_base) = match entry.strand {
            Strand::Forward => (p as usize, read_base),
            Strand::Reverse => ((lt as usize - 1) - p as usize, read_base.complement()),
        };

        buffers.depth[fwd_pos] += 1;
        let template_base = forward_template.bases[fwd_pos];
        if fwd_base != template_base {
            *buffers.mutations[fwd_pos].entry(fwd_base).or_insert(0) += 1;
        }
    }
}

/// Read-only derived metrics over a [`CoverageBuffers`] paired with its
/// template (spec §9: split from the buffers themselves so nothing needs
/// to invalidate a cached derived value).
pub struct CoverageView<'a> {
    pub buffers: &'a CoverageBuffers,
    pub template: &'a Template,
}

impl<'a> CoverageView<'a> {
    #[must_use]
    pub fn new(buffers: &'a CoverageBuffers, template: &'a Template) -> CoverageView<'a> {
        CoverageView { buffers, template }
    }

    /// The non-flank range `[left, len - right)` used as the default range
    /// for every derived metric below.
    #[must_use]
    pub fn core_range(&self) -> Range<usize> {
        self.template.left..(self.buffers.len() - self.template.right)
    }

    /// Average depth over `range`, defaulting to [`Self::core_range`]
    /// (spec §4.5 `mean`). Unlike the original this never silently mixes a
    /// full-vector sum with a sliced range (spec §9 Open Questions).
    #[must_use]
    pub fn mean(&self, range: Option<Range<usize>>) -> f64 {
        let range = range.unwrap_or_else(|| self.core_range());
        if range.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.buffers.depth[range.clone()].iter().map(|&d| u64::from(d)).sum();
        sum as f64 / range.len() as f64
    }

    /// Standard deviation of depth over `range`, defaulting to
    /// [`Self::core_range`] (spec §4.5 `std`), computed range-correctly
    /// against the mean of the *same* range.
    #[must_use]
    pub fn std(&self, range: Option<Range<usize>>) -> f64 {
        let range = range.unwrap_or_else(|| self.core_range());
        if range.is_empty() {
            return 0.0;
        }
        let mean = self.mean(Some(range.clone()));
        let variance: f64 = self.buffers.depth[range.clone()]
            .iter()
            .map(|&d| {
                let diff = f64::from(d) - mean;
                diff * diff
            })
            .sum::<f64>()
            / range.len() as f64;
        variance.sqrt()
    }

    /// Mean of `depth[i] - |mutations[i]|` over [`Self::core_range`]: depth
    /// actually supporting the template's own base at each position (spec
    /// §4.5 `seq_mean`).
    #[must_use]
    pub fn seq_mean(&self) -> f64 {
        let range = self.core_range();
        if range.is_empty() {
            return 0.0;
        }
        let sum: i64 = range
            .clone()
            .map(|i| i64::from(self.buffers.depth[i]) - i64::from(self.buffers.mutation_count(i)))
            .sum();
        sum as f64 / range.len() as f64
    }

    /// Map `base => count` at position `i`, crediting the template's own
    /// base with `depth[i] - mutant_count[i]` (spec §4.5 `bases_at`).
    #[must_use]
    pub fn bases_at(&self, i: usize) -> HashMap<Base, u32> {
        let mut out = self.buffers.mutations[i].clone();
        let template_base = self.template.bases[i];
        let credited = self.buffers.depth[i].saturating_sub(self.buffers.mutation_count(i));
        out.insert(template_base, credited);
        out
    }

    /// The minimum, over [`Self::core_range`], of the dominant-base
    /// fraction at each covered position — used by interpretation to flag
    /// mixed samples (spec §4.5, §9: the 0.9 mixed-sample threshold is an
    /// interpretation-layer constant, not computed here).
    ///
    /// Positions with zero depth carry no information and are skipped; if
    /// every position in range has zero depth this returns `1.0` (no
    /// evidence of a minority variant).
    #[must_use]
    pub fn minority_fraction(&self) -> f64 {
        let mut min_fraction = f64::INFINITY;
        for i in self.core_range() {
            let depth = self.buffers.depth[i];
            if depth == 0 {
                continue;
            }
            let dominant = self.bases_at(i).values().copied().max().unwrap_or(0);
            let fraction = f64::from(dominant) / f64::from(depth);
            min_fraction = min_fraction.min(fraction);
        }
        if min_fraction.is_finite() { min_fraction } else { 1.0 }
    }

    /// Whether this coverage counts as "found" (spec §4.5 `validate`):
    /// generic templates need non-flank mean depth `>= 2`; SNP templates
    /// need depth `>= 2` at their anchor position with the dominant base
    /// supported by at least half of that depth. `anchor` is the SNP's
    /// position within the template; ignored for generic templates.
    #[must_use]
    pub fn validate(&self, kind: TemplateKind, anchor: usize) -> bool {
        match kind {
            TemplateKind::Generic => self.mean(None) >= 2.0,
            TemplateKind::Snp => {
                let Some(&depth) = self.buffers.depth.get(anchor) else { return false };
                if depth < 2 {
                    return false;
                }
                let dominant = self.bases_at(anchor).values().copied().max().unwrap_or(0);
                f64::from(dominant) >= f64::from(depth) / 2.0
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::parse_bases;
    use crate::template::{Strand, TemplateEntry};

    fn template(bases: &str, left: usize, right: usize) -> Template {
        Template::new("t", parse_bases(bases.as_bytes()).unwrap(), left, right, false, false, TemplateKind::Generic).unwrap()
    }

    fn entry(template: Template, strand: Strand) -> TemplateEntry {
        // Mirrors `template::make_entry`'s anchor selection closely enough
        // for these unit tests, which never exercise `candidates()`.
        let len = template.len();
        TemplateEntry { source: 0, strand, template, anchor_start: 0, anchor_len: len }
    }

    #[test]
    fn depth_bound_and_mutation_exclusion_invariants() {
        let t = template("ACGT", 0, 0);
        let e = entry(t.clone(), Strand::Forward);
        let mut buffers = CoverageBuffers::new(4);
        let hit = Hit { template_entry: 0, file_pos: 0, seq_pos: 0, length: 4, readlength: 4 };
        let window = parse_bases(b"ACTT").unwrap(); // mismatch at position 2

        apply_hit(&mut buffers, &hit, &e, &t, &window);

        for i in 0..4 {
            let mutant_total: u32 = buffers.mutations[i].values().sum();
            assert!(buffers.depth[i] >= mutant_total);
            assert!(!buffers.mutations[i].contains_key(&t.bases[i]));
        }
        assert_eq!(buffers.depth, vec![1, 1, 1, 1]);
        assert_eq!(*buffers.mutations[2].get(&Base::T).unwrap(), 1);
    }

    #[test]
    fn reverse_strand_hit_is_reported_in_forward_frame() {
        let t = template("ACGT", 0, 0);
        let rc = Template::new("t", crate::base::reverse_complement(&t.bases), 0, 0, false, false, TemplateKind::Generic).unwrap();
        let e = entry(rc, Strand::Reverse);
        let mut buffers = CoverageBuffers::new(4);
        let hit = Hit { template_entry: 0, file_pos: 0, seq_pos: 0, length: 4, readlength: 4 };
        // read exactly matches the reverse-complemented template (ACGT is
        // its own revcomp), so every forward position should show depth 1
        // and no mutation.
        let window = parse_bases(b"ACGT").unwrap();

        apply_hit(&mut buffers, &hit, &e, &t, &window);

        assert_eq!(buffers.depth, vec![1, 1, 1, 1]);
        assert!(buffers.mutations.iter().all(|m| m.is_empty()));
    }

    #[test]
    fn serialize_round_trips() {
        let t = template("ACGTACGT", 0, 0);
        let e = entry(t.clone(), Strand::Forward);
        let mut buffers = CoverageBuffers::new(8);
        for (file_pos, read) in [(0u64, b"ACGTACGT"), (1, b"ACCTACGT"), (2, b"ACGTAGGT")].into_iter() {
            let hit = Hit { template_entry: 0, file_pos, seq_pos: 0, length: 8, readlength: 8 };
            let window = parse_bases(read).unwrap();
            apply_hit(&mut buffers, &hit, &e, &t, &window);
        }

        let serialized = buffers.serialize();
        let round_tripped = CoverageBuffers::deserialize(&serialized).unwrap();
        assert_eq!(round_tripped, buffers);
    }

    #[test]
    fn mean_and_std_are_range_correct() {
        let t = template("AAAAAAAAAA", 2, 2); // core range [2, 8)
        let mut buffers = CoverageBuffers::new(10);
        // flanks get depth 100 (should never affect core-range stats),
        // core gets a uniform depth of 4.
        for i in 0..10 {
            buffers.depth[i] = if (2..8).contains(&i) { 4 } else { 100 };
        }
        let view = CoverageView::new(&buffers, &t);
        assert!((view.mean(None) - 4.0).abs() < 1e-9);
        assert!((view.std(None) - 0.0).abs() < 1e-9);
        assert!((view.mean(Some(0..10)) - 42.4).abs() < 1e-9);
    }

    #[test]
    fn validate_generic_needs_mean_at_least_two() {
        let t = template("AAAA", 0, 0);
        let mut buffers = CoverageBuffers::new(4);
        buffers.depth = vec![2, 2, 2, 2];
        let view = CoverageView::new(&buffers, &t);
        assert!(view.validate(TemplateKind::Generic, 0));

        buffers.depth = vec![1, 1, 1, 1];
        let view = CoverageView::new(&buffers, &t);
        assert!(!view.validate(TemplateKind::Generic, 0));
    }

    #[test]
    fn validate_snp_needs_anchor_depth_and_majority() {
        let t = template("AAAA", 0, 0);
        let mut buffers = CoverageBuffers::new(4);
        buffers.depth[1] = 4;
        *buffers.mutations[1].entry(Base::G).or_insert(0) = 1; // 3 A, 1 G: majority holds
        let view = CoverageView::new(&buffers, &t);
        assert!(view.validate(TemplateKind::Snp, 1));

        *buffers.mutations[1].entry(Base::G).or_insert(0) = 3; // 1 A, 3 G: no majority for A alone but dominant (G)=3>=2
        let view = CoverageView::new(&buffers, &t);
        assert!(view.validate(TemplateKind::Snp, 1)); // dominant base (whichever it is) still supports >= depth/2

        buffers.depth[1] = 1;
        let view = CoverageView::new(&buffers, &t);
        assert!(!view.validate(TemplateKind::Snp, 1)); // depth below 2
    }

    #[test]
    fn minority_fraction_skips_zero_depth_positions() {
        let t = template("AAAA", 0, 0);
        let mut buffers = CoverageBuffers::new(4);
        buffers.depth = vec![0, 10, 10, 0];
        *buffers.mutations[2].entry(Base::G).or_insert(0) = 5; // 50/50 split at position 2
        let view = CoverageView::new(&buffers, &t);
        assert!((view.minority_fraction() - 0.5).abs() < 1e-9);
    }
}
