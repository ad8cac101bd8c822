//! Aggregate scan statistics and cancellation flags (spec §3 `ScanStats`,
//! §5 concurrency model, §9 "cooperative cancellation via a Ctrl-C
//! counter").
//!
//! Small numeric fields (records parsed, per-template hit/base-hit counts,
//! bytes consumed) use atomic fetch-add, per spec §5's explicit preference;
//! the per-readlength histogram is shard-and-merge instead, since a shared
//! keyed map would thrash under concurrent writers from every worker. Each
//! worker accumulates its own [`WorkerTally`] and folds it into the shared
//! [`ScanStats`] once, after the parallel phase — the same single-thread
//! merge point the scan driver already uses for coverage application
//! (`scan.rs`).

use foldhash::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// Per-worker counters, private to one worker for the duration of a scan and
/// folded into [`ScanStats`] on completion.
#[derive(Debug, Default, Clone)]
pub struct WorkerTally {
    pub records_parsed: u64,
    pub readlength_histogram: HashMap<usize, u64>,
}

impl WorkerTally {
    pub fn record(&mut self, readlength: usize) {
        self.records_parsed += 1;
        *self.readlength_histogram.entry(readlength).or_insert(0) += 1;
    }
}

/// Shared scan counters, built once per scan and updated concurrently by
/// every worker; `nworkers` bytes-consumed slots avoid false sharing between
/// workers that would result from a single shared counter (spec §5).
pub struct ScanStats {
    file_size: u64,
    bytes_consumed: Vec<AtomicU64>,
    records_parsed: AtomicU64,
    template_hits: Vec<AtomicU64>,
    template_base_hits: Vec<AtomicU64>,
    sigints: AtomicU32,
    stop: AtomicBool,
    abort: AtomicBool,
}

impl ScanStats {
    #[must_use]
    pub fn new(file_size: u64, nworkers: usize, ntemplates: usize) -> ScanStats {
        ScanStats {
            file_size,
            bytes_consumed: (0..nworkers.max(1)).map(|_| AtomicU64::new(0)).collect(),
            records_parsed: AtomicU64::new(0),
            template_hits: (0..ntemplates).map(|_| AtomicU64::new(0)).collect(),
            template_base_hits: (0..ntemplates).map(|_| AtomicU64::new(0)).collect(),
            sigints: AtomicU32::new(0),
            stop: AtomicBool::new(false),
            abort: AtomicBool::new(false),
        }
    }

    /// Adds `delta` newly consumed bytes to `worker`'s running total. Using
    /// a delta (rather than an absolute store) lets a paired-input scan
    /// reuse the same worker slots across its two sequential file phases
    /// without losing the first phase's contribution (`scan.rs`).
    pub(crate) fn add_bytes_consumed(&self, worker: usize, delta: u64) {
        self.bytes_consumed[worker].fetch_add(delta, Ordering::Relaxed);
    }

    pub(crate) fn add_hit(&self, template: usize, base_hits: u64) {
        self.template_hits[template].fetch_add(1, Ordering::Relaxed);
        self.template_base_hits[template].fetch_add(base_hits, Ordering::Relaxed);
    }

    /// Folds one worker's tally into the shared totals. Called once per
    /// worker after the parallel phase joins (spec §5: per-field atomics
    /// or shard-and-merge, never concurrent writes to a shared map).
    pub(crate) fn merge_tally(&self, tally: &WorkerTally, histogram: &mut HashMap<usize, u64>) {
        self.records_parsed.fetch_add(tally.records_parsed, Ordering::Relaxed);
        for (&len, &count) in &tally.readlength_histogram {
            *histogram.entry(len).or_insert(0) += count;
        }
    }

    /// Monotonic progress fraction in `[0, 1]`: bytes consumed past every
    /// worker's own range start, divided by total file size (spec §4.6).
    #[must_use]
    pub fn progress(&self) -> f64 {
        if self.file_size == 0 {
            return 1.0;
        }
        let consumed: u64 = self.bytes_consumed.iter().map(|b| b.load(Ordering::Relaxed)).sum();
        (consumed as f64 / self.file_size as f64).min(1.0)
    }

    #[must_use]
    pub fn records_parsed(&self) -> u64 {
        self.records_parsed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn template_hit_count(&self, template: usize) -> u64 {
        self.template_hits[template].load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn template_base_hit_count(&self, template: usize) -> u64 {
        self.template_base_hits[template].load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn sigints(&self) -> u32 {
        self.sigints.load(Ordering::Relaxed)
    }

    /// Registers one interrupt (e.g. one Ctrl-C) and returns the new count.
    ///
    /// The "escalate to `abort()` on a second interrupt within 2 seconds"
    /// policy is an operator-facing (CLI) concern and is deliberately not
    /// implemented here (spec §9) — a typical caller polls [`Self::stats`]
    /// once a second, calls this on every interrupt signal it receives, and
    /// calls [`Self::abort`] itself once its own timing window expires.
    pub fn record_interrupt(&self) -> u32 {
        self.sigints.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Cooperative stop: workers finish their in-flight record and drain.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Operator abort: semantics identical to [`Self::stop`], offered as a
    /// distinct entry point so a caller's escalation policy can tell which
    /// one fired.
    pub fn abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
        self.stop.store(true, Ordering::Relaxed);
    }

    #[inline]
    #[must_use]
    pub(crate) fn is_cancelled(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    #[inline]
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }
}
