//! File opening helpers: gzip detection, and the `_1`/`_2` paired-file
//! naming convention (spec §6 "Paired input convention").
//!
//! Grounded on the teacher's `io/readers.rs` (`ReadFileZip`,
//! `GzipReaderPiped`) and `io/mod.rs` (`is_gz`, paired-file open helpers).

use crate::whichever::define_whichever;
use flate2::read::MultiGzDecoder;
use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

define_whichever! {
    /// Either a plain file or a gzip-decoded stream over one, read
    /// sequentially.
    pub enum ReadFileZip {
        File(File),
        Zipped(MultiGzDecoder<File>),
    }

    impl Read for ReadFileZip {}
}

/// Whether `path` is gzip-compressed per its `.gz` extension (spec §6).
#[inline]
#[must_use]
pub fn is_gz(path: impl AsRef<Path>) -> bool {
    path.as_ref().extension().is_some_and(|ext| ext == "gz")
}

/// Opens `path`, transparently decoding gzip if its extension says so.
pub fn open_maybe_gz(path: impl AsRef<Path>) -> std::io::Result<ReadFileZip> {
    let file = File::open(&path)?;
    if is_gz(&path) {
        Ok(ReadFileZip::Zipped(MultiGzDecoder::new(file)))
    } else {
        Ok(ReadFileZip::File(file))
    }
}

/// Given a candidate FASTQ path, finds its paired companion per spec §6: if
/// `path` matches `<stem>_1.fastq[.gz]`, and a sibling `<stem>_2.fastq[.gz]`
/// exists, returns that sibling's path.
#[must_use]
pub fn find_paired_companion(path: &Path) -> Option<PathBuf> {
    let file_name = path.file_name()?.to_str()?;

    let (stem, suffix) = if let Some(rest) = file_name.strip_suffix(".fastq.gz") {
        (rest, ".fastq.gz")
    } else if let Some(rest) = file_name.strip_suffix(".fastq") {
        (rest, ".fastq")
    } else {
        return None;
    };

    let base = stem.strip_suffix("_1")?;
    let companion_name = format!("{base}_2{suffix}");
    let companion = path.with_file_name(companion_name);

    companion.is_file().then_some(companion)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn detects_gz_extension() {
        assert!(is_gz("reads.fastq.gz"));
        assert!(!is_gz("reads.fastq"));
    }

    #[test]
    fn paired_companion_requires_existing_sibling() {
        let dir = std::env::temp_dir().join(format!("tscan-paired-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let p1 = dir.join("sample_1.fastq");
        let p2 = dir.join("sample_2.fastq");
        std::fs::write(&p1, b"").unwrap();

        assert_eq!(find_paired_companion(&p1), None);

        std::fs::write(&p2, b"").unwrap();
        assert_eq!(find_paired_companion(&p1), Some(p2.clone()));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn non_paired_name_has_no_companion() {
        let path = Path::new("/data/reads.fastq");
        assert_eq!(find_paired_companion(path), None);
    }
}
