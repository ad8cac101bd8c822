//! Engine-wide scanning configuration (spec §3 `EngineConfig`, §6).

/// Parameters governing one scan.
///
/// Unlike the teacher's per-subcommand `clap`-derived `Args` structs (the
/// argument-parsing CLI is explicitly out of scope here, spec §1), this is
/// a plain value type constructed directly by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Number of worker threads used to scan an uncompressed input.
    pub nthreads: usize,
    /// Maximum run of *consecutive* mismatching positions tolerated inside
    /// a hit's aligned span.
    pub maxerrors: usize,
    /// Minimum length of the quality-trimmed run a read must have before
    /// matching is attempted.
    pub minreadlength: usize,
    /// Minimum number of aligned positions a hit must cover.
    pub minoverlap: usize,
    /// ASCII byte cutoff: quality bytes `>= amin` are accepted.
    pub amin: u8,
    /// ASCII byte representing `Q=0` for the detected encoding.
    pub azero: u8,
}

impl EngineConfig {
    /// Validates the invariants from spec §3: `minoverlap <= minreadlength`
    /// and `amin >= azero`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.minoverlap <= self.minreadlength && self.amin >= self.azero
    }
}

impl Default for EngineConfig {
    /// Defaults `nthreads` to the logical core count the way the teacher's
    /// `num_procs` subcommand does (`num_cpus::get()`), and otherwise picks
    /// the values implied by spec §3's invariants.
    fn default() -> Self {
        EngineConfig {
            nthreads: num_cpus::get().max(1),
            maxerrors: 2,
            minreadlength: 20,
            minoverlap: 20,
            amin: b'#',
            azero: b'!',
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().is_valid());
    }

    #[test]
    fn invalid_when_overlap_exceeds_readlength() {
        let mut cfg = EngineConfig::default();
        cfg.minoverlap = cfg.minreadlength + 1;
        assert!(!cfg.is_valid());
    }
}
