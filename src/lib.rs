//! `tscan-core`: a parallel, fuzzy template-matching scan engine for
//! targeted variant calling over FASTQ bacterial sequencing reads.
//!
//! The crate is organized the way a scan actually flows: [`detect`]
//! samples a file to recover its quality encoding, [`reader`] and
//! [`record`] turn bytes into validated records, [`template`] builds an
//! immutable index of reference sequences to search for, [`matcher`]
//! aligns one read against that index, [`coverage`] folds the resulting
//! [`hit::Hit`]s into per-template depth and mutation data, and [`scan`]
//! drives the whole pipeline in parallel over one (or a paired pair of)
//! input files.
//!
//! Argument parsing, persistence formats, and an interactive monitoring
//! UI are all out of scope for this crate (they belong to whatever binary
//! embeds it); what's here is the engine itself.

pub mod base;
pub mod config;
pub mod coverage;
pub mod detect;
pub mod error;
pub mod hit;
pub mod info;
pub mod io;
pub mod matcher;
pub mod reader;
pub mod record;
pub mod scan;
pub mod stats;
pub mod template;

mod whichever;

pub use base::{parse_bases, reverse_complement, Base};
pub use config::EngineConfig;
pub use coverage::{apply_hit, CoverageBuffers, CoverageView};
pub use detect::{detect, DetectionResult};
pub use error::{is_recoverable, ExitCode, ScanError, ScanResult};
pub use hit::Hit;
pub use info::{ScanInfo, TestsuiteVersion};
pub use io::{find_paired_companion, is_gz, open_maybe_gz};
pub use matcher::{base_hit_count, is_reverse, match_read};
pub use reader::{seek_and_resync, RecordReader};
pub use record::{effective_quality, parse_record_lines, validate_lengths, Record};
pub use scan::{Engine, ScanHandle, ScanOutcome};
pub use stats::{ScanStats, WorkerTally};
pub use template::{Strand, Template, TemplateEntry, TemplateIndex, TemplateKind};
