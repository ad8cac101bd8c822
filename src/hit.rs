//! A single matched alignment of a read against a template (spec §3 `Hit`,
//! §9: expressed as a named record rather than the source's positional
//! tuple).

/// One hit of a read against one template-index entry.
///
/// `seq_pos` is read-local: zero means the match starts at the read's
/// first (quality-trimmed) base; negative means the match reaches past
/// the template's conceptual left edge, i.e. the read extends further
/// left than the template does (spec §4.4, S4 left-overhang scenario).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    /// Index into the template index's flat `0..2K-1` ordering (forward or
    /// reverse-complement half).
    pub template_entry: usize,
    /// Byte offset of the record's identifier line in the source file.
    pub file_pos: u64,
    /// Read-local start offset of the match; may be negative (left
    /// overhang).
    pub seq_pos: i64,
    /// Number of aligned positions covered by the match.
    pub length: usize,
    /// Length of the originating read (before quality trimming).
    pub readlength: usize,
}

impl Hit {
    /// Builds a `Hit` from the legacy positional form
    /// `(seq_nr, file_pos, seq_pos, length, readlength)` used by
    /// deserialized scans (spec §6 "Engine outputs").
    #[must_use]
    pub fn from_tuple(tuple: (usize, u64, i64, usize, usize)) -> Hit {
        let (template_entry, file_pos, seq_pos, length, readlength) = tuple;
        Hit { template_entry, file_pos, seq_pos, length, readlength }
    }

    #[must_use]
    pub fn as_tuple(&self) -> (usize, u64, i64, usize, usize) {
        (self.template_entry, self.file_pos, self.seq_pos, self.length, self.readlength)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tuple_round_trip() {
        let h = Hit { template_entry: 3, file_pos: 1024, seq_pos: -2, length: 10, readlength: 100 };
        assert_eq!(Hit::from_tuple(h.as_tuple()), h);
    }
}
