//! The scan driver (spec §4.6): orchestrates one scan from a file path and
//! a template set through to a finalized hit list, coverages and
//! statistics.
//!
//! Grounded on the teacher's `processes/standalone/aligner/mod.rs`
//! (rayon-driven parallel scan over a record stream, dispatched through a
//! sized thread pool) for the uncompressed byte-range worker pool, and on
//! `processes/standalone/aligner/writers.rs`'s `AlignmentWriterThreaded`
//! (single-purpose thread talking over an `mpsc` channel) for the gzip
//! path's single-reader/bounded-queue design (spec §4.6 step 4, §5).

use crate::base::Base;
use crate::config::EngineConfig;
use crate::coverage::{apply_hit, CoverageBuffers};
use crate::detect::{self, DetectionResult};
use crate::error::ScanError;
use crate::hit::Hit;
use crate::info::ScanInfo;
use crate::io::{find_paired_companion, is_gz, open_maybe_gz};
use crate::matcher::{base_hit_count, match_read, quality_trim};
use crate::reader::{seek_and_resync, RecordReader};
use crate::record::{effective_quality, Record};
use crate::stats::{ScanStats, WorkerTally};
use crate::template::{Template, TemplateIndex};

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use std::collections::{BTreeSet, HashMap as StdHashMap};
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::sync::LazyLock;
use std::thread;
use std::time::Instant;

static WARN_HIT_RECORD_NOT_FOUND: LazyLock<()> = LazyLock::new(|| {
    eprintln!("WARNING: a recorded hit's originating record could not be reread from its source file; skipping it during coverage application");
});

/// How many records the gzip path's single reader thread may queue ahead
/// of the slowest matcher worker before blocking (spec §5 "memory budget:
/// O(|file| / chunk) for in-flight records, never the whole file").
const GZIP_QUEUE_CAPACITY: usize = 256;

/// One worker's output, merged (not shared) after the parallel phase (spec
/// §5: "workers do not share mutable coverage; hit application ... is
/// performed after the parallel phase, by a single thread").
struct WorkerOutput {
    hits: Vec<Hit>,
    tally: WorkerTally,
    source: PathBuf,
}

/// A template set paired with a flank-spacing figure for [`ScanInfo`], and
/// an engine value carrying the scan-wide configuration (spec §9: "an
/// explicit `Engine` value carrying its `EngineConfig`... This removes the
/// global singleton and makes concurrent engines possible").
#[derive(Debug, Clone, Copy)]
pub struct Engine {
    config: EngineConfig,
    include_reverse: bool,
}

impl Engine {
    #[must_use]
    pub fn new(config: EngineConfig) -> Engine {
        Engine { config, include_reverse: true }
    }

    #[must_use]
    pub fn with_reverse(config: EngineConfig, include_reverse: bool) -> Engine {
        Engine { config, include_reverse }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Starts a scan of `path` against `templates`, returning a
    /// [`ScanHandle`] as soon as the template index is built and the
    /// quality encoding detected — the bulk of the work (I/O and
    /// matching) runs on a background thread, so the caller can poll
    /// `handle.stats()` and call `handle.stop()`/`handle.abort()` while it
    /// runs (spec §4.6, §9 "the caller's monitoring loop").
    pub fn findseqs(&self, path: impl AsRef<Path>, templates: Vec<Template>) -> Result<ScanHandle, ScanError> {
        let path = path.as_ref().to_path_buf();
        let primary_size = std::fs::metadata(&path)?.len();
        if primary_size == 0 {
            return Err(ScanError::EmptyInput);
        }

        let detection = detect::detect(&path, None)?;
        let mut config = self.config;
        config.azero = detection.azero;
        if !config.is_valid() {
            return Err(ScanError::MalformedRecord {
                offset: 0,
                reason: "engine config violates minoverlap<=minreadlength or amin>=azero",
            });
        }

        let spacing = templates.iter().map(|t| t.left.max(t.right)).max().unwrap_or(0);
        let ntemplates = templates.len();
        let index = Arc::new(TemplateIndex::build(templates.clone(), config.minoverlap, self.include_reverse)?);
        let forward_templates = Arc::new(templates);

        let companion = find_paired_companion(&path);
        let (files, file_sizes, records_approx, readlength) = match &companion {
            Some(companion_path) => {
                let companion_detection = detect::detect(companion_path, Some(detection.dq))?;
                let companion_size = std::fs::metadata(companion_path)?.len();
                (
                    vec![path.clone(), companion_path.clone()],
                    vec![primary_size, companion_size],
                    detection.records_approx + companion_detection.records_approx,
                    detection.readlength,
                )
            }
            None => (vec![path.clone()], vec![primary_size], detection.records_approx, detection.readlength),
        };

        let nworkers = worker_budget(config.nthreads, companion.is_some());
        let stats = Arc::new(ScanStats::new(file_sizes.iter().sum(), nworkers, ntemplates));

        let stats_for_thread = Arc::clone(&stats);
        let index_for_thread = Arc::clone(&index);
        let templates_for_thread = Arc::clone(&forward_templates);
        let config_for_thread = config;
        let started = Instant::now();

        let join = thread::spawn(move || -> Result<ScanOutcome, ScanError> {
            let mut outputs = Vec::new();
            match &companion {
                None => {
                    outputs.extend(dispatch_scan(&path, &config_for_thread, &index_for_thread, &stats_for_thread, 0, nworkers)?);
                }
                Some(companion_path) => {
                    // Paired files are scanned as two sequential phases over
                    // the same worker-id range (spec §6 "scanned as one
                    // logical stream"); `ScanStats::add_bytes_consumed`'s
                    // delta accounting (not absolute store) lets both
                    // phases share bytes-consumed slots without one
                    // overwriting the other's contribution.
                    outputs.extend(dispatch_scan(&path, &config_for_thread, &index_for_thread, &stats_for_thread, 0, nworkers)?);
                    outputs.extend(dispatch_scan(companion_path, &config_for_thread, &index_for_thread, &stats_for_thread, 0, nworkers)?);
                }
            }

            let mut histogram = foldhash::HashMap::default();
            for output in &outputs {
                stats_for_thread.merge_tally(&output.tally, &mut histogram);
            }

            let coverages = apply_hits(&outputs, &index_for_thread, &config_for_thread, &templates_for_thread)?;
            let hits: Vec<Hit> = outputs.into_iter().flat_map(|o| o.hits).collect();

            let info = ScanInfo {
                config: config_for_thread,
                files,
                file_sizes,
                readlength,
                records_approx,
                scan_time: started.elapsed(),
                timestamp: std::time::SystemTime::now(),
                engine_version: ScanInfo::engine_version(),
                spacing,
                testsuites: Vec::new(),
            };

            Ok(ScanOutcome { hits, coverages, info, cancelled: stats_for_thread.is_cancelled() })
        });

        Ok(ScanHandle { stats, join })
    }
}

/// How many workers to dedicate to a scan. A paired scan still runs its
/// two files as sequential phases (see [`Engine::findseqs`]), so the full
/// thread budget is available to each phase in turn.
fn worker_budget(nthreads: usize, _paired: bool) -> usize {
    nthreads.max(1)
}

/// A live handle to an in-progress or completed scan (spec §4.6, §9:
/// exposes exactly what an external monitoring loop needs — progress,
/// `stop()`, `abort()` — without implementing the operator-facing
/// two-signal escalation policy itself).
pub struct ScanHandle {
    stats: Arc<ScanStats>,
    join: thread::JoinHandle<Result<ScanOutcome, ScanError>>,
}

impl ScanHandle {
    #[inline]
    #[must_use]
    pub fn stats(&self) -> &Arc<ScanStats> {
        &self.stats
    }

    /// Cooperative stop (spec §4.6): workers finish their in-flight record
    /// and drain.
    pub fn stop(&self) {
        self.stats.stop();
    }

    /// Operator abort, semantically identical to [`Self::stop`] (spec
    /// §4.6).
    pub fn abort(&self) {
        self.stats.abort();
    }

    /// Blocks until the scan completes, returning its outcome. A panic on
    /// the background thread is reported as an IO error rather than
    /// propagated, since this crate otherwise never panics outside tests.
    pub fn join(self) -> Result<ScanOutcome, ScanError> {
        match self.join.join() {
            Ok(result) => result,
            Err(_) => Err(ScanError::Io(std::io::Error::other("scan worker thread panicked"))),
        }
    }
}

/// The result of a completed (possibly cancelled) scan (spec §6 "Engine
/// outputs", §4.6 "Failure semantics").
pub struct ScanOutcome {
    pub hits: Vec<Hit>,
    /// Indexed the same as the templates passed to `findseqs` (`0..K`).
    pub coverages: Vec<CoverageBuffers>,
    pub info: ScanInfo,
    /// Set when `stop()`/`abort()` was called during the scan; `hits` and
    /// `coverages` still reflect everything processed before the signal
    /// was observed (spec §4.6 "partial results valid").
    pub cancelled: bool,
}

/// Dispatches one physical file to either the uncompressed byte-range
/// worker pool or the gzip single-reader pipeline (spec §4.6 step 4).
fn dispatch_scan(
    path: &Path, config: &EngineConfig, index: &TemplateIndex, stats: &Arc<ScanStats>, worker_offset: usize, nworkers: usize,
) -> Result<Vec<WorkerOutput>, ScanError> {
    if is_gz(path) {
        run_gzip_scan(path, config, index, stats, worker_offset, nworkers)
    } else {
        run_uncompressed_scan(path, config, index, stats, worker_offset, nworkers)
    }
}

/// Splits `[0, file_size)` into `n` contiguous byte ranges (spec §4.6 step
/// 4).
fn partition(file_size: u64, n: usize) -> Vec<Range<u64>> {
    let n = n.max(1) as u64;
    (0..n)
        .map(|i| {
            let start = file_size * i / n;
            let end = file_size * (i + 1) / n;
            start..end
        })
        .collect()
}

/// Runs the uncompressed-file worker pool: one rayon task per byte range,
/// each with its own file handle seeked and resynced to a record boundary
/// (spec §4.6 step 4, §5 "one [file handle] per worker, each with an
/// independent seek position").
fn run_uncompressed_scan(
    path: &Path, config: &EngineConfig, index: &TemplateIndex, stats: &Arc<ScanStats>, worker_offset: usize, nworkers: usize,
) -> Result<Vec<WorkerOutput>, ScanError> {
    let file_size = std::fs::metadata(path)?.len();
    let ranges = partition(file_size, nworkers);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(nworkers)
        .build()
        .map_err(|_| ScanError::Io(std::io::Error::other("failed to build scan worker pool")))?;

    let results: Vec<Result<WorkerOutput, ScanError>> = pool.install(|| {
        ranges
            .into_par_iter()
            .enumerate()
            .map(|(i, range)| run_uncompressed_worker(path, range, config, index, stats, worker_offset + i))
            .collect()
    });

    let mut outputs = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(output) => outputs.push(output),
            Err(e) => {
                stats.stop();
                return Err(e);
            }
        }
    }
    Ok(outputs)
}

fn run_uncompressed_worker(
    path: &Path, range: Range<u64>, config: &EngineConfig, index: &TemplateIndex, stats: &Arc<ScanStats>, worker_id: usize,
) -> Result<WorkerOutput, ScanError> {
    let mut file = File::open(path)?;
    let resynced = if range.start == 0 { 0 } else { seek_and_resync(&mut file, range.start)? };
    file.seek(SeekFrom::Start(resynced))?;
    let mut reader = RecordReader::with_start_offset(BufReader::new(file), resynced);

    let mut tally = WorkerTally::default();
    let mut hits = Vec::new();
    let mut last_reported = resynced;

    loop {
        if stats.is_cancelled() {
            break;
        }
        let record_start = reader.current_offset();
        if record_start >= range.end {
            break;
        }
        let Some(record) = reader.read_record()? else { break };

        tally.record(record.len());
        for hit in match_read(&record, config, index) {
            let entry = index.entry(hit.template_entry);
            stats.add_hit(entry.source, base_hit_count(&hit, entry) as u64);
            hits.push(hit);
        }

        let now = reader.current_offset();
        stats.add_bytes_consumed(worker_id, now - last_reported);
        last_reported = now;
    }

    Ok(WorkerOutput { hits, tally, source: path.to_path_buf() })
}

/// Runs the gzip path: a single sequential reader thread decodes records
/// into a bounded queue, consumed by `nworkers` matcher workers (spec
/// §4.6 step 4: "gzip input, use a single reader with a bounded record
/// queue feeding nthreads matcher workers").
fn run_gzip_scan(
    path: &Path, config: &EngineConfig, index: &TemplateIndex, stats: &Arc<ScanStats>, worker_offset: usize, nworkers: usize,
) -> Result<Vec<WorkerOutput>, ScanError> {
    let (tx, rx) = mpsc::sync_channel::<Record>(GZIP_QUEUE_CAPACITY);
    let reader_path = path.to_path_buf();
    let reader_stats = Arc::clone(stats);

    let reader_thread = thread::spawn(move || -> Result<(), ScanError> {
        let mut reader = RecordReader::new(BufReader::new(open_maybe_gz(&reader_path)?));
        let mut last_reported = 0u64;
        loop {
            if reader_stats.is_cancelled() {
                break;
            }
            match reader.read_record()? {
                None => break,
                Some(record) => {
                    let now = reader.current_offset();
                    reader_stats.add_bytes_consumed(worker_offset, now - last_reported);
                    last_reported = now;
                    if tx.send(record).is_err() {
                        break; // every consumer has hung up
                    }
                }
            }
        }
        Ok(())
    });

    let rx = std::sync::Mutex::new(rx);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(nworkers)
        .build()
        .map_err(|_| ScanError::Io(std::io::Error::other("failed to build scan worker pool")))?;

    let source = path.to_path_buf();
    let outputs: Vec<WorkerOutput> = pool.install(|| {
        (0..nworkers)
            .into_par_iter()
            .map(|_| {
                let mut tally = WorkerTally::default();
                let mut hits = Vec::new();
                loop {
                    if stats.is_cancelled() {
                        break;
                    }
                    let received = rx.lock().expect("gzip record queue mutex poisoned").recv();
                    match received {
                        Ok(record) => {
                            tally.record(record.len());
                            for hit in match_read(&record, config, index) {
                                let entry = index.entry(hit.template_entry);
                                stats.add_hit(entry.source, base_hit_count(&hit, entry) as u64);
                                hits.push(hit);
                            }
                        }
                        Err(_) => break, // reader thread finished and hung up
                    }
                }
                WorkerOutput { hits, tally, source: source.clone() }
            })
            .collect()
    });

    match reader_thread.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            stats.stop();
            return Err(e);
        }
        Err(_) => {
            stats.stop();
            return Err(ScanError::Io(std::io::Error::other("gzip reader thread panicked")));
        }
    }

    Ok(outputs)
}

/// Rereads every record at a position in `offsets` with one sequential
/// pass over `path` (spec §3 "Records are transient — their bytes are
/// reread from the file on demand").
fn reread_records_at(path: &Path, offsets: &BTreeSet<u64>) -> Result<StdHashMap<u64, Record>, ScanError> {
    let mut out = StdHashMap::with_capacity(offsets.len());
    if offsets.is_empty() {
        return Ok(out);
    }

    let mut reader = RecordReader::new(BufReader::new(open_maybe_gz(path)?));
    let mut remaining = offsets.len();
    while remaining > 0 {
        match reader.read_record()? {
            None => break,
            Some(record) => {
                if offsets.contains(&record.file_offset) {
                    remaining -= 1;
                    out.insert(record.file_offset, record);
                }
            }
        }
    }
    Ok(out)
}

/// Applies every worker's hits to fresh per-template [`CoverageBuffers`],
/// rereading each hit's originating record from its source file (spec
/// §4.6 step 6, §5 "hit application ... performed after the parallel
/// phase, by a single thread").
fn apply_hits(
    outputs: &[WorkerOutput], index: &TemplateIndex, config: &EngineConfig, templates: &[Template],
) -> Result<Vec<CoverageBuffers>, ScanError> {
    let mut buffers: Vec<CoverageBuffers> = templates.iter().map(|t| CoverageBuffers::new(t.len())).collect();

    let mut by_path: StdHashMap<&Path, Vec<&Hit>> = StdHashMap::new();
    for output in outputs {
        by_path.entry(output.source.as_path()).or_default().extend(output.hits.iter());
    }

    for (path, hits) in by_path {
        let offsets: BTreeSet<u64> = hits.iter().map(|h| h.file_pos).collect();
        let records = reread_records_at(path, &offsets)?;

        for hit in hits {
            let Some(record) = records.get(&hit.file_pos) else {
                *WARN_HIT_RECORD_NOT_FOUND;
                continue;
            };
            let quality = effective_quality(record);
            let (trim_start, trim_len) = quality_trim(quality, config.amin);
            if trim_len == 0 {
                continue;
            }
            let window: Vec<Base> = record.bases[trim_start..trim_start + trim_len]
                .iter()
                .map(|&b| Base::from_ascii(b).expect("record bases are validated ACGTN on parse"))
                .collect();

            let entry = index.entry(hit.template_entry);
            let forward_template = &templates[entry.source];
            apply_hit(&mut buffers[entry.source], hit, entry, forward_template, &window);
        }
    }

    Ok(buffers)
}
