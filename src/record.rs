//! The FASTQ record grammar (spec §3 `Read record`, §6 "FASTQ on disk").

use crate::error::ScanError;

/// One parsed `(identifier, bases, qualities, offset)` FASTQ record.
///
/// Bases are kept as raw ASCII bytes rather than `Vec<Base>` here: the
/// matcher only needs to look at them a position at a time against a
/// template, and most reads are never matched against most templates, so
/// eagerly decoding every byte to a `Base` would be wasted work. Decoding
/// happens lazily per-position in the matcher (`Base::from_ascii`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub identifier: String,
    pub bases: Vec<u8>,
    pub quality: Vec<u8>,
    /// Byte offset of the identifier line within the source file.
    pub file_offset: u64,
}

impl Record {
    /// Length of the base string (spec: the length used for overlap and
    /// quality-trim bookkeeping; the quality vector may be one longer with a
    /// trailing sentinel, see [`validate_lengths`]).
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
}

/// Validates one four-line record already split into its raw lines (with
/// line terminators stripped) and assembles a [`Record`].
///
/// `offset` is the byte position of the identifier line, used to tag the
/// record and for error reporting (spec §4.1/§7 `MalformedRecord`).
pub fn parse_record_lines(
    identifier: &[u8], bases: &[u8], separator: &[u8], quality: &[u8], offset: u64,
) -> Result<Record, ScanError> {
    if identifier.first() != Some(&b'@') {
        return Err(ScanError::MalformedRecord {
            offset,
            reason: "identifier line must begin with '@'",
        });
    }

    if let Some(pos) = bases.iter().position(|&b| !matches!(b.to_ascii_uppercase(), b'A' | b'C' | b'G' | b'T' | b'N')) {
        return Err(ScanError::MalformedRecord {
            offset: offset + identifier.len() as u64 + 1 + pos as u64,
            reason: "base line must contain only A, C, G, T, N",
        });
    }

    let separator_ok = separator == b"+" || (separator.first() == Some(&b'+') && &separator[1..] == &identifier[1..]);
    if !separator_ok {
        return Err(ScanError::MalformedRecord {
            offset,
            reason: "separator line must be '+' or '+<identifier>'",
        });
    }

    validate_lengths(bases.len(), quality.len(), offset)?;

    Ok(Record {
        identifier: String::from_utf8_lossy(&identifier[1..]).into_owned(),
        bases: bases.to_ascii_uppercase(),
        quality: quality.to_vec(),
        file_offset: offset,
    })
}

/// Checks the base/quality length relationship from spec §3's Data Model:
/// equal length, or quality one byte *longer* than bases with a trailing
/// `!` sentinel.
///
/// `examples/original_source/kvarq/fastq.py`'s
/// `min_max_score_check_file` enforces exactly this relationship
/// (`len(bases) == len(phredstr) or (len(bases) == len(phredstr)-1 and
/// phredstr[-1] == '!')`), which is consistent with spec §3's Data Model
/// table but inverted relative to a literal reading of spec §6's prose
/// ("quality may be one byte shorter than bases"). This crate follows the
/// original and §3: the quality string may be one byte longer, not
/// shorter. See DESIGN.md for the discussion.
pub fn validate_lengths(bases_len: usize, quality_len: usize, offset: u64) -> Result<(), ScanError> {
    let ok = bases_len == quality_len || (quality_len == bases_len + 1 && quality_len > 0);
    if ok { Ok(()) } else {
        Err(ScanError::MalformedRecord {
            offset,
            reason: "quality length must equal base length, or exceed it by one with a trailing sentinel",
        })
    }
}

/// The quality bytes actually usable for matching: drops a trailing
/// sentinel byte if present (spec §3).
#[inline]
#[must_use]
pub fn effective_quality(record: &Record) -> &[u8] {
    if record.quality.len() == record.bases.len() + 1 {
        &record.quality[..record.bases.len()]
    } else {
        &record.quality
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn accepts_well_formed_record() {
        let r = parse_record_lines(b"@read1", b"ACGTN", b"+", b"IIIII", 0).unwrap();
        assert_eq!(r.identifier, "read1");
        assert_eq!(r.bases, b"ACGTN");
    }

    #[test]
    fn accepts_repeated_identifier_separator() {
        let r = parse_record_lines(b"@read1", b"ACGT", b"+read1", b"IIII", 0).unwrap();
        assert_eq!(r.identifier, "read1");
    }

    #[test]
    fn rejects_missing_at_sign() {
        let err = parse_record_lines(b"read1", b"ACGT", b"+", b"IIII", 0).unwrap_err();
        assert!(matches!(err, ScanError::MalformedRecord { .. }));
    }

    #[test]
    fn rejects_bad_separator() {
        let err = parse_record_lines(b"@read1", b"ACGT", b"-", b"IIII", 0).unwrap_err();
        assert!(matches!(err, ScanError::MalformedRecord { .. }));
    }

    #[test]
    fn rejects_bad_base() {
        let err = parse_record_lines(b"@read1", b"ACGX", b"+", b"IIII", 0).unwrap_err();
        assert!(matches!(err, ScanError::MalformedRecord { .. }));
    }

    #[test]
    fn accepts_quality_with_trailing_sentinel() {
        let r = parse_record_lines(b"@read1", b"ACGT", b"+", b"IIII!", 0).unwrap();
        assert_eq!(effective_quality(&r), b"IIII");
    }

    #[test]
    fn rejects_length_mismatch() {
        let err = parse_record_lines(b"@read1", b"ACGT", b"+", b"III", 0).unwrap_err();
        assert!(matches!(err, ScanError::MalformedRecord { .. }));
    }
}
