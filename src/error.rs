//! Error kinds for the scan engine (spec §7).
//!
//! Mirrors the teacher's hand-written enum + manual `Display`/`Error`
//! style (see `OpenFastqError` and `ThreadedWriteError` in the example
//! pack) rather than pulling in `thiserror`/`anyhow`.

use std::fmt;

/// The single error type returned by detection, reading, and scanning.
#[derive(Debug)]
pub enum ScanError {
    /// A record violates the FASTQ grammar at the given byte offset.
    MalformedRecord { offset: u64, reason: &'static str },
    /// Quality bytes are outside every known vendor encoding's range.
    UnknownEncoding,
    /// Multiple vendor encodings are compatible but disagree on offset.
    AmbiguousEncoding,
    /// The input file is empty or has no complete records.
    EmptyInput,
    /// EOF was hit in the middle of a record.
    Truncated,
    /// The scan was stopped cooperatively; partial results are valid.
    Cancelled,
    /// An OS-level read failure.
    Io(std::io::Error),
    /// Two templates share an identifier but disagree on base sequence.
    TemplateConflict(String),
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::MalformedRecord { offset, reason } => {
                write!(f, "malformed FASTQ record at byte offset {offset}: {reason}")
            }
            ScanError::UnknownEncoding => {
                write!(f, "quality bytes are incompatible with any known PHRED encoding")
            }
            ScanError::AmbiguousEncoding => {
                write!(f, "quality bytes are compatible with multiple PHRED encodings with different offsets")
            }
            ScanError::EmptyInput => write!(f, "input file is empty or contains no complete records"),
            ScanError::Truncated => write!(f, "end of file reached in the middle of a record"),
            ScanError::Cancelled => write!(f, "scan was cancelled; returning partial results"),
            ScanError::Io(e) => write!(f, "{e}"),
            ScanError::TemplateConflict(id) => {
                write!(f, "template \"{id}\" was declared twice with differing base sequences")
            }
        }
    }
}

impl std::error::Error for ScanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScanError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ScanError {
    #[inline]
    fn from(value: std::io::Error) -> Self {
        ScanError::Io(value)
    }
}

/// Maps an error to the process exit codes enumerated in spec §6.
///
/// The core does not call `std::process::exit` itself (the CLI is out of
/// scope); this trait exists so an external driver can consume a
/// [`ScanError`] without re-deriving the mapping.
pub trait ExitCode {
    fn exit_code(&self) -> i32;
}

impl ExitCode for ScanError {
    fn exit_code(&self) -> i32 {
        match self {
            ScanError::MalformedRecord { .. }
            | ScanError::UnknownEncoding
            | ScanError::AmbiguousEncoding
            | ScanError::EmptyInput
            | ScanError::Truncated
            | ScanError::TemplateConflict(_) => 2,
            ScanError::Cancelled => 0,
            ScanError::Io(_) => 2,
        }
    }
}

/// Whether a [`ScanError`] is the sole recoverable kind (spec §7).
#[inline]
#[must_use]
pub fn is_recoverable(err: &ScanError) -> bool {
    matches!(err, ScanError::Cancelled)
}

pub type ScanResult<T> = Result<T, ScanError>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn only_cancelled_is_recoverable() {
        assert!(is_recoverable(&ScanError::Cancelled));
        assert!(!is_recoverable(&ScanError::EmptyInput));
        assert!(!is_recoverable(&ScanError::Truncated));
    }

    #[test]
    fn exit_codes_match_spec() {
        assert_eq!(ScanError::EmptyInput.exit_code(), 2);
        assert_eq!(ScanError::Cancelled.exit_code(), 0);
    }
}
