//! The template index (spec §4.3): an ordered, immutable set of reference
//! sequences with wildcard flanks, plus a first-match acceleration layer.
//!
//! Templates here carry only what the scan engine needs — bases, flank
//! lengths, open-flank flags, and a SNP/generic discriminator for the
//! coverage aggregator's `validate()` split (spec §4.5, §9). Resolving a
//! template from a reference genome (`TemplateFromGenome`, `SNP` in
//! `examples/original_source/kvarq/genes.py`) is the test-suite layer's
//! job (spec §1 Out-of-scope); by the time a `Template` reaches this
//! crate its bases are already concrete.

use crate::base::{reverse_complement, Base};
use crate::error::ScanError;
use foldhash::HashMap;
use std::collections::HashMap as StdHashMap;

/// Discriminates the two `validate()` policies in spec §4.5: a generic
/// template is "found" on mean depth alone, a SNP needs depth at its
/// single anchor position plus majority support there.
///
/// This collapses spec §9's fuller `{StaticSeq, GenomeRegion, Snp}` tagged
/// variant to the one distinction the core actually branches on; genome
/// provenance (`GenomeRegion`/`Snp`'s backing coordinates) lives with the
/// caller that resolved the bases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Generic,
    Snp,
}

/// One reference sequence to scan for (spec §3 `Template`).
#[derive(Debug, Clone)]
pub struct Template {
    pub identifier: String,
    pub bases: Vec<Base>,
    /// Length of the wildcard flank at the start of `bases`.
    pub left: usize,
    /// Length of the wildcard flank at the end of `bases`.
    pub right: usize,
    /// Whether overhang past the left edge is permitted (leading `...`).
    pub left_open: bool,
    /// Whether overhang past the right edge is permitted (trailing `...`).
    pub right_open: bool,
    pub kind: TemplateKind,
}

impl Template {
    /// Builds a template directly from bases and explicit flank lengths.
    pub fn new(
        identifier: impl Into<String>, bases: Vec<Base>, left: usize, right: usize, left_open: bool,
        right_open: bool, kind: TemplateKind,
    ) -> Result<Template, ScanError> {
        let identifier = identifier.into();
        if left + right >= bases.len() {
            return Err(ScanError::MalformedRecord {
                offset: 0,
                reason: "template flank lengths must leave at least one core base",
            });
        }
        Ok(Template { identifier, bases, left, right, left_open, right_open, kind })
    }

    /// Parses the `...`-flagged, `.`/`N`-wildcard notation from spec §4.3,
    /// e.g. `"...NACTT"` (left-open, one-base wildcard flank, core `ACTT`).
    pub fn parse(identifier: impl Into<String>, notation: &str, kind: TemplateKind) -> Result<Template, ScanError> {
        let mut s = notation;
        let left_open = s.starts_with("...");
        if left_open {
            s = &s[3..];
        }
        let right_open = s.ends_with("...");
        if right_open {
            s = &s[..s.len() - 3];
        }

        let bases = s
            .bytes()
            .map(|b| if b == b'.' { Base::N } else { Base::from_ascii(b).ok_or(b) })
            .collect::<Result<Vec<_>, u8>>()
            .map_err(|bad| ScanError::MalformedRecord { offset: 0, reason: reason_from(bad) })?;

        let left = bases.iter().take_while(|&&b| b == Base::N).count();
        let right = bases.iter().rev().take_while(|&&b| b == Base::N).count();
        let right = right.min(bases.len() - left); // don't double-count an all-wildcard template

        Template::new(identifier, bases, left, right, left_open, right_open, kind)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bases.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    /// Builds the reverse-complement counterpart used for the `K..2K-1`
    /// half of the index: bases are reverse-complemented and the flank
    /// lengths/open-flags swap sides.
    fn reverse_complemented(&self) -> Template {
        Template {
            identifier: self.identifier.clone(),
            bases: reverse_complement(&self.bases),
            left: self.right,
            right: self.left,
            left_open: self.right_open,
            right_open: self.left_open,
            kind: self.kind,
        }
    }
}

// `ScanError::MalformedRecord` wants a `&'static str`; this helper buys a
// readable message for the (rare) invalid-template-notation case without
// giving `parse` a lifetime headache.
fn reason_from(_bad: u8) -> &'static str {
    "template notation contains a byte outside A, C, G, T, N, '.'"
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strand {
    Forward,
    Reverse,
}

/// One half (forward or reverse-complement) of one template, as stored in
/// the flat `0..2K-1` index (spec §4.3).
#[derive(Debug, Clone)]
pub struct TemplateEntry {
    /// Index of the originating template in `0..K`, shared between the
    /// forward and reverse-complement halves.
    pub source: usize,
    pub strand: Strand,
    pub template: Template,
    pub(crate) anchor_start: usize,
    pub(crate) anchor_len: usize,
}

impl TemplateEntry {
    #[inline]
    #[must_use]
    pub fn anchor(&self) -> &[Base] {
        &self.template.bases[self.anchor_start..self.anchor_start + self.anchor_len]
    }
}

/// The ordered, immutable set of templates scanned against every read,
/// with a first-match acceleration index keyed on each entry's anchor
/// k-mer (spec §4.3).
pub struct TemplateIndex {
    entries: Vec<TemplateEntry>,
    /// Entries grouped by anchor length, each with an exact-match lookup
    /// from anchor bases to entry indices sharing that exact k-mer.
    anchor_groups: StdHashMap<usize, (HashMap<Vec<Base>, Vec<usize>>, Vec<usize>)>,
}

impl TemplateIndex {
    /// Builds the index from the caller's template set, rejecting
    /// duplicate identifiers that disagree on their base sequence (spec
    /// §7 `TemplateConflict`).
    pub fn build(templates: Vec<Template>, minoverlap: usize, include_reverse: bool) -> Result<TemplateIndex, ScanError> {
        let mut seen: StdHashMap<String, Vec<Base>> = StdHashMap::new();
        for t in &templates {
            match seen.get(&t.identifier) {
                Some(existing) if *existing != t.bases => {
                    return Err(ScanError::TemplateConflict(t.identifier.clone()));
                }
                _ => {
                    seen.insert(t.identifier.clone(), t.bases.clone());
                }
            }
        }

        let mut entries = Vec::with_capacity(templates.len() * if include_reverse { 2 } else { 1 });
        for (source, template) in templates.into_iter().enumerate() {
            entries.push(make_entry(source, Strand::Forward, template.clone(), minoverlap));
            if include_reverse {
                entries.push(make_entry(source, Strand::Reverse, template.reverse_complemented(), minoverlap));
            }
        }

        let mut anchor_groups: StdHashMap<usize, (HashMap<Vec<Base>, Vec<usize>>, Vec<usize>)> = StdHashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            let group = anchor_groups.entry(entry.anchor_len).or_default();
            group.0.entry(entry.anchor().to_vec()).or_default().push(idx);
            group.1.push(idx);
        }

        Ok(TemplateIndex { entries, anchor_groups })
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn entry(&self, idx: usize) -> &TemplateEntry {
        &self.entries[idx]
    }

    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[TemplateEntry] {
        &self.entries
    }

    /// Finds every entry whose anchor k-mer occurs somewhere in `read`.
    /// Windows that themselves contain a wildcard base fall back to a
    /// wildcard-aware comparison against every entry in that anchor-length
    /// group (anchors never carry a wildcard; only the read can).
    ///
    /// An entry whose anchor spans its *entire* template (the "else
    /// template length" fallback from spec §4.3, used whenever
    /// `minoverlap >= template length`) is always included rather than
    /// filtered by the hash lookup below: a single mismatch anywhere in
    /// such a template makes the read window differ literally from the
    /// anchor even when the alignment is still a valid hit under
    /// `maxerrors`, so the hash filter would otherwise silently drop
    /// genuine matches against short templates. For these, the k-mer
    /// "acceleration" buys nothing anyway (the anchor already is the
    /// whole template) and verification is left entirely to
    /// `matcher::best_alignment`.
    #[must_use]
    pub fn candidates(&self, read: &[Base]) -> Vec<usize> {
        let mut candidates: Vec<usize> = (0..self.entries.len())
            .filter(|&idx| self.entries[idx].anchor_len == self.entries[idx].template.len())
            .collect();

        for (&anchor_len, (map, members)) in &self.anchor_groups {
            if anchor_len == 0 || read.len() < anchor_len {
                continue;
            }
            for start in 0..=(read.len() - anchor_len) {
                let window = &read[start..start + anchor_len];
                if window.contains(&Base::N) {
                    for &idx in members {
                        if bases_match(self.entries[idx].anchor(), window) && !candidates.contains(&idx) {
                            candidates.push(idx);
                        }
                    }
                } else if let Some(ids) = map.get(window) {
                    for &idx in ids {
                        if !candidates.contains(&idx) {
                            candidates.push(idx);
                        }
                    }
                }
            }
        }
        candidates
    }
}

fn bases_match(template: &[Base], read: &[Base]) -> bool {
    template.len() == read.len() && template.iter().zip(read).all(|(&t, &r)| t.matches(r) || r == Base::N)
}

/// Picks the anchor k-mer for one template half: the first window of
/// `minoverlap` bases (falling back to the template's full length) that
/// contains no wildcard base (spec §4.3: "k = minoverlap when feasible,
/// else template length").
fn make_entry(source: usize, strand: Strand, template: Template, minoverlap: usize) -> TemplateEntry {
    let k = minoverlap.min(template.len()).max(1);
    let mut anchor_start = 0;
    let mut anchor_len = template.len();
    'search: for start in 0..=(template.len().saturating_sub(k)) {
        if template.bases[start..start + k].iter().all(|&b| b != Base::N) {
            anchor_start = start;
            anchor_len = k;
            break 'search;
        }
    }
    TemplateEntry { source, strand, template, anchor_start, anchor_len }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::parse_bases;

    fn bases(s: &str) -> Vec<Base> {
        parse_bases(s.as_bytes()).unwrap()
    }

    #[test]
    fn parses_open_flank_notation() {
        let t = Template::parse("t1", "...NACTT", TemplateKind::Generic).unwrap();
        assert!(t.left_open);
        assert!(!t.right_open);
        assert_eq!(t.left, 1);
        assert_eq!(t.right, 0);
        assert_eq!(t.bases, bases("NACTT"));
    }

    #[test]
    fn rejects_all_flank_template() {
        let t = Template::new("t", bases("NN"), 1, 1, false, false, TemplateKind::Generic);
        assert!(t.is_err());
    }

    #[test]
    fn duplicate_identifier_with_same_bases_is_fine() {
        let t1 = Template::new("a", bases("ACGT"), 0, 0, false, false, TemplateKind::Generic).unwrap();
        let t2 = Template::new("a", bases("ACGT"), 0, 0, false, false, TemplateKind::Generic).unwrap();
        assert!(TemplateIndex::build(vec![t1, t2], 4, false).is_ok());
    }

    #[test]
    fn duplicate_identifier_with_different_bases_conflicts() {
        let t1 = Template::new("a", bases("ACGT"), 0, 0, false, false, TemplateKind::Generic).unwrap();
        let t2 = Template::new("a", bases("TTTT"), 0, 0, false, false, TemplateKind::Generic).unwrap();
        let err = TemplateIndex::build(vec![t1, t2], 4, false).unwrap_err();
        assert!(matches!(err, ScanError::TemplateConflict(_)));
    }

    #[test]
    fn reverse_half_is_appended_after_forward_half() {
        let t = Template::new("a", bases("ACGT"), 0, 0, false, false, TemplateKind::Generic).unwrap();
        let idx = TemplateIndex::build(vec![t], 4, true).unwrap();
        assert_eq!(idx.len(), 2);
        assert_eq!(idx.entry(0).strand, Strand::Forward);
        assert_eq!(idx.entry(1).strand, Strand::Reverse);
        assert_eq!(idx.entry(1).template.bases, bases("ACGT")); // ACGT is its own revcomp
    }

    #[test]
    fn candidates_finds_exact_anchor_and_tolerates_read_wildcard() {
        // minoverlap (4) is shorter than the template (12), so the anchor
        // is a genuine sub-window and the hash filter is actually
        // exercised (as opposed to the always-candidate fallback below).
        let t = Template::new("a", bases("ACGTACGTACGT"), 0, 0, false, false, TemplateKind::Generic).unwrap();
        let idx = TemplateIndex::build(vec![t], 4, false).unwrap();
        assert_eq!(idx.candidates(&bases("ACGTACGTACGT")), vec![0]);
        assert_eq!(idx.candidates(&bases("ANGTACGTACGT")), vec![0]);
        assert!(idx.candidates(&bases("TTTTTTTTTTTT")).is_empty());
    }

    #[test]
    fn full_template_anchor_is_always_a_candidate_despite_mismatches() {
        // minoverlap (8) equals the template length, so the anchor is the
        // whole template (spec §4.3 "k = minoverlap when feasible, else
        // template length"). A mismatching read must still surface as a
        // candidate here -- the hash filter can't tell a genuine bounded
        // mismatch apart from "no relation at all" when the anchor is the
        // entire template, so it's not applied to this entry at all;
        // `matcher::best_alignment` is solely responsible for rejecting it.
        let t = Template::new("a", bases("CAGCATGT"), 0, 0, false, false, TemplateKind::Generic).unwrap();
        let idx = TemplateIndex::build(vec![t], 8, false).unwrap();
        assert_eq!(idx.candidates(&bases("TTGCATGT")), vec![0]);
    }
}
