//! The persisted-scan "info" header (spec §6 "Persisted scan (\"info\"
//! header)"), grounded on `examples/original_source/kvarq/analyse.py`'s
//! `Analyser.encode()` `info` dict.
//!
//! The core only defines this field list and populates it at the end of a
//! scan; JSON (de)serialization and file persistence are the enclosing
//! layer's job (spec §1 Out-of-scope).

use crate::config::EngineConfig;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

/// Name and version of one active test-suite consumer, recorded in the
/// info header purely as a pass-through (the test-suite layer itself is
/// out of scope, spec §1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestsuiteVersion {
    pub name: String,
    pub version: String,
}

/// Meta-information about one scan, populated by the scan driver at
/// completion (spec §6).
#[derive(Debug, Clone)]
pub struct ScanInfo {
    pub config: EngineConfig,
    /// One entry for an unpaired input, two for a paired input (spec §6
    /// "Paired input convention").
    pub files: Vec<PathBuf>,
    pub file_sizes: Vec<u64>,
    pub readlength: usize,
    pub records_approx: u64,
    pub scan_time: Duration,
    pub timestamp: SystemTime,
    pub engine_version: &'static str,
    /// Wildcard flank spacing used to build the templates that produced
    /// this scan's coverages.
    pub spacing: usize,
    pub testsuites: Vec<TestsuiteVersion>,
}

impl ScanInfo {
    #[must_use]
    pub fn engine_version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn engine_version_is_nonempty() {
        assert!(!ScanInfo::engine_version().is_empty());
    }
}
