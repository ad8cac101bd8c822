//! The fuzzy matcher (spec §4.4): quality-trims a read, then aligns it
//! against every candidate template entry under the bounded-consecutive-
//! mismatch / overhang policy.
//!
//! The quality-trim longest-run search is grounded on
//! `examples/original_source/kvarq/fastq.py`'s `cutoff()`, corrected to
//! properly close out a run that extends to the end of the quality
//! string (the original's loop only finalizes a run when quality drops
//! back below `Amin`, so a trailing high-quality tail is silently
//! dropped — the same class of range-slicing bug the spec calls out for
//! `Coverage.mean`/`.std`, §9).

use crate::base::Base;
use crate::config::EngineConfig;
use crate::hit::Hit;
use crate::record::{effective_quality, Record};
use crate::template::{Strand, TemplateEntry, TemplateIndex};

/// Finds the longest contiguous run of `quality[i] >= amin`, returning its
/// `(start, length)`. `length == 0` means no base in `quality` qualifies.
pub(crate) fn quality_trim(quality: &[u8], amin: u8) -> (usize, usize) {
    let mut best_start = 0;
    let mut best_len = 0;
    let mut run_start: Option<usize> = None;

    for (i, &q) in quality.iter().enumerate() {
        if q >= amin {
            run_start.get_or_insert(i);
        } else if let Some(start) = run_start.take() {
            let len = i - start;
            if len > best_len {
                best_len = len;
                best_start = start;
            }
        }
    }
    if let Some(start) = run_start {
        let len = quality.len() - start;
        if len > best_len {
            best_len = len;
            best_start = start;
        }
    }
    (best_start, best_len)
}

/// One candidate alignment within the trimmed read window, in template
/// coordinates: `window[i]` aligns with `template[offset + i]`.
struct Alignment {
    offset: i64,
    length: usize,
}

/// Tries every offset that could yield a valid alignment of `window`
/// against `entry`, and returns the one matching spec §4.4's tie-break
/// (max length, then smallest offset).
///
/// Overhang permission (`left_open`/`right_open`) only gates an edge the
/// template actually declared a wildcard flank on (`left`/`right > 0`).
/// A template with no flank on a side has nothing to "extend past" there,
/// so a read simply running longer than the template on that side — the
/// ordinary case of a short marker sitting inside a longer read — is
/// never an overhang needing permission.
fn best_alignment(window: &[Base], entry: &TemplateEntry, config: &EngineConfig) -> Option<Alignment> {
    let template = &entry.template.bases;
    let lr = window.len() as i64;
    let lt = template.len() as i64;
    if lr == 0 || lt == 0 {
        return None;
    }

    let mut best: Option<Alignment> = None;

    for offset in -(lr - 1)..lt {
        let a = offset.max(0);
        let b = (offset + lr).min(lt);
        if b <= a {
            continue;
        }
        let length = (b - a) as usize;
        if length < config.minoverlap {
            continue;
        }
        if offset < 0 && entry.template.left > 0 && !entry.template.left_open {
            continue;
        }
        if offset + lr > lt && entry.template.right > 0 && !entry.template.right_open {
            continue;
        }

        let mut max_run = 0usize;
        let mut run = 0usize;
        let mut p = a;
        while p < b {
            let read_idx = (p - offset) as usize;
            if !template[p as usize].matches(window[read_idx]) {
                run += 1;
                max_run = max_run.max(run);
            } else {
                run = 0;
            }
            p += 1;
        }
        if max_run > config.maxerrors {
            continue;
        }

        let better = match &best {
            None => true,
            Some(current) => length > current.length || (length == current.length && offset < current.offset),
        };
        if better {
            best = Some(Alignment { offset, length });
        }
    }

    best
}

/// Matches one record against every candidate entry in `index`, emitting
/// at most one [`Hit`] per template entry (spec §4.4 tie-break).
#[must_use]
pub fn match_read(record: &Record, config: &EngineConfig, index: &TemplateIndex) -> Vec<Hit> {
    let quality = effective_quality(record);
    let (trim_start, trim_len) = quality_trim(quality, config.amin);
    if trim_len < config.minreadlength {
        return Vec::new();
    }

    let window: Vec<Base> = record.bases[trim_start..trim_start + trim_len]
        .iter()
        .map(|&b| Base::from_ascii(b).expect("record bases are validated ACGTN on parse"))
        .collect();

    let mut hits = Vec::new();
    for entry_idx in index.candidates(&window) {
        let entry = index.entry(entry_idx);
        if let Some(alignment) = best_alignment(&window, entry, config) {
            hits.push(Hit {
                template_entry: entry_idx,
                file_pos: record.file_offset,
                seq_pos: alignment.offset,
                length: alignment.length,
                readlength: record.len(),
            });
        }
    }
    hits
}

/// Number of non-wildcard template positions a hit covers — the "base
/// hits" statistic (spec §4.4).
#[must_use]
pub fn base_hit_count(hit: &Hit, entry: &TemplateEntry) -> usize {
    let lt = entry.template.bases.len() as i64;
    let a = hit.seq_pos.max(0);
    let b = (a + hit.length as i64).min(lt);
    (a..b).filter(|&p| entry.template.bases[p as usize] != Base::N).count()
}

/// Whether `entry` is the reverse-complement half of its template.
#[inline]
#[must_use]
pub fn is_reverse(entry: &TemplateEntry) -> bool {
    entry.strand == Strand::Reverse
}
