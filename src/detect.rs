//! Quality-variant detection (spec §4.1).
//!
//! Samples a FASTQ file at several points, validates record grammar along
//! the way, and deduces which PHRED vendor convention the quality bytes
//! were encoded with.
//!
//! The vendor table and the "oversample small files" point-sampling loop
//! are ported directly from `examples/original_source/kvarq/fastq.py`'s
//! `vendor_variants` and `min_max_score_check_file`; the quality-ASCII
//! table there (`'!'..='~'`, i.e. byte 33 through 126) is reused verbatim.

use crate::error::ScanError;
use crate::io::{is_gz, open_maybe_gz, ReadFileZip};
use crate::reader::{seek_and_resync, RecordReader};
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::Path;
use std::sync::LazyLock;

static WARN_UNRECOGNIZED_EXPLICIT_DQ: LazyLock<()> = LazyLock::new(|| {
    eprintln!("WARNING: explicit quality-offset override matches no known PHRED vendor encoding; proceeding with the caller's value anyway");
});

/// Lowest byte of the PHRED ASCII table (`'!'`).
const ASCII_BASE: i32 = b'!' as i32;
/// Highest byte of the PHRED ASCII table (`'~'`).
const ASCII_MAX: i32 = b'~' as i32;

struct VendorVariant {
    name: &'static str,
    /// Exclusive-upper-bound range of `(quality_index - dq)`, mirroring
    /// Python's `range(lo, hi)`.
    range: std::ops::Range<i32>,
    dq: i32,
}

const VENDOR_VARIANTS: &[VendorVariant] = &[
    VendorVariant { name: "Sanger", range: 0..50, dq: 0 },
    VendorVariant { name: "Solexa", range: -5..41, dq: 31 },
    VendorVariant { name: "Illumina 1.3+", range: 0..41, dq: 31 },
    VendorVariant { name: "Illumina 1.5+", range: 3..42, dq: 31 },
    VendorVariant { name: "Illumina 1.8+", range: 0..42, dq: 0 },
];

/// Outcome of scanning a FASTQ file for its quality encoding.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    /// ASCII index offset (`Azero - '!'`) of the detected encoding.
    pub dq: i32,
    /// The ASCII byte representing `Q = 0` under the detected encoding.
    pub azero: u8,
    /// Names of every vendor variant compatible with the observed range.
    pub variants: Vec<&'static str>,
    /// Base length of the first record (spec's readlength statistic).
    pub readlength: usize,
    /// Approximate total record count (spec §6 persisted "info" header).
    pub records_approx: u64,
}

/// How many records to sample in total, spread across `POINTS` positions.
const SAMPLE_BUDGET: u64 = 1000;
const POINTS: u64 = 10;

/// Detects the quality encoding of the FASTQ file at `path`.
///
/// `explicit_dq`, when given, suppresses [`ScanError::AmbiguousEncoding`]
/// by pinning the offset up front (spec §4.1: "fail ... unless the caller
/// specified one explicitly").
pub fn detect(path: &Path, explicit_dq: Option<i32>) -> Result<DetectionResult, ScanError> {
    let file_size = std::fs::metadata(path)?.len();
    if file_size == 0 {
        return Err(ScanError::EmptyInput);
    }

    let mut min_index = i32::MAX;
    let mut max_index = i32::MIN;
    let mut records_seen: u64 = 0;
    let mut readlength = None;
    let mut first_record_bytes: u64 = 0;

    if is_gz(path) {
        let reader = open_maybe_gz(path)?;
        let mut reader = RecordReader::new(BufReader::new(reader));
        // Gzip inputs are read sequentially only (spec §4.2); sample from
        // the head rather than point-sampling across the (compressed) file.
        while records_seen < SAMPLE_BUDGET {
            match reader.read_record() {
                Ok(Some(record)) => {
                    if readlength.is_none() {
                        readlength = Some(record.bases.len());
                    }
                    sample_quality(&record.quality, &mut min_index, &mut max_index)?;
                    records_seen += 1;
                }
                Ok(None) => break,
                Err(e) => return Err(e),
            }
        }
        if records_seen == 0 {
            return Err(ScanError::EmptyInput);
        }
    } else {
        let mut budget = SAMPLE_BUDGET;
        for point in 0..POINTS {
            let target_pos = file_size.saturating_mul(point) / POINTS;
            let mut file = File::open(path)?;
            let resynced = if point == 0 {
                0
            } else {
                match seek_and_resync(&mut file, target_pos) {
                    Ok(off) => off,
                    Err(_) => continue, // ran off the end of the file; next point may still work
                }
            };
            file.seek(SeekFrom::Start(resynced))?;
            let mut reader = RecordReader::with_start_offset(BufReader::new(file), resynced);

            // Mirrors the original's point-sampling quota: read until the
            // remaining global budget would otherwise be more than this
            // point's fair share, oversampling early (small) files.
            let remaining_after_point = (POINTS - 1 - point) * SAMPLE_BUDGET / POINTS;
            while budget > remaining_after_point {
                match reader.read_record() {
                    Ok(Some(record)) => {
                        if point == 0 && readlength.is_none() {
                            readlength = Some(record.bases.len());
                            first_record_bytes = reader.current_offset();
                        }
                        sample_quality(&record.quality, &mut min_index, &mut max_index)?;
                        records_seen += 1;
                        budget -= 1;
                    }
                    Ok(None) => break,
                    Err(e) => return Err(e),
                }
            }
        }
        if records_seen == 0 {
            return Err(ScanError::EmptyInput);
        }
    }

    let (dq, variants) = resolve_variants(min_index, max_index, explicit_dq)?;
    let azero = (ASCII_BASE + dq) as u8;
    let readlength = readlength.unwrap_or(0);

    let records_approx = if is_gz(path) {
        records_seen
    } else if first_record_bytes > 0 {
        file_size / first_record_bytes
    } else {
        records_seen
    };

    Ok(DetectionResult { dq, azero, variants, readlength, records_approx })
}

/// Folds one record's quality bytes into the running `(min, max)` index
/// bounds, validating each byte falls in the known PHRED ASCII table.
fn sample_quality(quality: &[u8], min_index: &mut i32, max_index: &mut i32) -> Result<(), ScanError> {
    for &byte in quality {
        let idx = byte as i32;
        if !(ASCII_BASE..=ASCII_MAX).contains(&idx) {
            return Err(ScanError::UnknownEncoding);
        }
        let idx = idx - ASCII_BASE;
        *min_index = (*min_index).min(idx);
        *max_index = (*max_index).max(idx);
    }
    Ok(())
}

/// Matches the observed `(min_index, max_index)` range against the vendor
/// table, honoring an explicit offset override.
fn resolve_variants(
    min_index: i32, max_index: i32, explicit_dq: Option<i32>,
) -> Result<(i32, Vec<&'static str>), ScanError> {
    let mut chosen_dq = explicit_dq;
    let mut variants = Vec::new();

    for variant in VENDOR_VARIANTS {
        let compatible = variant.range.contains(&(min_index - variant.dq))
            && variant.range.contains(&(max_index - variant.dq));
        if !compatible {
            continue;
        }
        match chosen_dq {
            None => chosen_dq = Some(variant.dq),
            Some(dq) if dq != variant.dq && explicit_dq.is_none() => {
                return Err(ScanError::AmbiguousEncoding);
            }
            _ => {}
        }
        if explicit_dq.is_none() || chosen_dq == Some(variant.dq) {
            variants.push(variant.name);
        }
    }

    match chosen_dq {
        Some(dq) => {
            if variants.is_empty() {
                *WARN_UNRECOGNIZED_EXPLICIT_DQ;
            }
            Ok((dq, variants))
        }
        None => Err(ScanError::UnknownEncoding),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, data: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("tscan-detect-test-{}-{name}", std::process::id()));
        let mut f = File::create(&path).unwrap();
        f.write_all(data).unwrap();
        path
    }

    fn repeat_record(ident: &str, bases: &str, quality: &str, n: usize) -> Vec<u8> {
        let mut out = Vec::new();
        for i in 0..n {
            out.extend_from_slice(format!("@{ident}{i}\n{bases}\n+\n{quality}\n").as_bytes());
        }
        out
    }

    #[test]
    fn detects_sanger_encoding() {
        let data = repeat_record("r", "ACGTACGTAC", "!!!!!!!!!!", 20);
        let path = write_temp("sanger", &data);
        let result = detect(&path, None).unwrap();
        assert_eq!(result.azero, b'!');
        assert!(result.variants.contains(&"Sanger"));
        assert_eq!(result.readlength, 10);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn detects_illumina_solexa_style_encoding() {
        // 'h' (104) - 64 = 40, within Solexa/Illumina1.3+/1.5+ ranges.
        let data = repeat_record("r", "ACGTACGTAC", "hhhhhhhhhh", 20);
        let path = write_temp("solexa", &data);
        let result = detect(&path, None).unwrap();
        assert_eq!(result.dq, 31);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn empty_file_is_rejected() {
        let path = write_temp("empty", b"");
        let err = detect(&path, None).unwrap_err();
        assert!(matches!(err, ScanError::EmptyInput));
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn malformed_record_is_rejected() {
        let data = b"not-a-fastq-record\n".repeat(5);
        let path = write_temp("malformed", &data);
        let err = detect(&path, None).unwrap_err();
        assert!(matches!(err, ScanError::MalformedRecord { .. }));
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn explicit_offset_suppresses_ambiguity() {
        // Qualities compatible with more than one variant at the same dq
        // don't trip ambiguity; this just exercises the override path.
        let data = repeat_record("r", "ACGT", "IIII", 5);
        let path = write_temp("explicit", &data);
        let result = detect(&path, Some(0)).unwrap();
        assert_eq!(result.dq, 0);
        std::fs::remove_file(path).unwrap();
    }
}
