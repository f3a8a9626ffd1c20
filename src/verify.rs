//! Checking content on disk against a known piece hash list.

use std::collections::BTreeSet;
use std::fs;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{Error, FileError, FileErrorKind, PieceReadError, Result};
use crate::hashing::{
    PieceHasher, Progress, ProgressTracker, hash_piece, log_read_error, run_pieces,
};
use crate::models::Layout;
use crate::piece::PieceHashList;
use crate::stream::{PieceRange, PieceReader, VirtualFileStream};

/// A file that failed the existence/type/size check before hashing
#[derive(Debug, Error)]
#[error("{error}")]
pub struct FileCheckError {
    /// `None` when the content path itself is unusable
    pub file_index: Option<usize>,
    #[source]
    pub error: FileError,
}

/// A piece whose digest differs from the expected one
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "piece {piece_index} ({piece_size} bytes) is corrupt; files: {}",
    display_paths(.paths)
)]
pub struct ContentMismatch {
    pub piece_index: u64,
    pub piece_size: u64,
    /// Every file the piece overlaps, in stream order
    pub files: Vec<usize>,
    pub paths: Vec<PathBuf>,
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStatus {
    Passed,
    Failed,
    Cancelled,
}

/// Result of a verification run
#[derive(Debug, Default)]
pub struct VerifyReport {
    pub pieces_total: u64,
    /// Pieces read and compared
    pub pieces_checked: u64,
    /// Pieces not read because they touch a file that failed the pre-check
    pub pieces_skipped: u64,
    pub file_errors: Vec<FileCheckError>,
    pub content_errors: Vec<ContentMismatch>,
    pub read_errors: Vec<PieceReadError>,
    pub cancelled: bool,
}

impl VerifyReport {
    pub fn status(&self) -> VerifyStatus {
        if self.cancelled {
            VerifyStatus::Cancelled
        } else if self.file_errors.is_empty()
            && self.content_errors.is_empty()
            && self.read_errors.is_empty()
        {
            VerifyStatus::Passed
        } else {
            VerifyStatus::Failed
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status() == VerifyStatus::Passed
    }

    /// Indexes of every file named by a corrupt piece or a failed read
    pub fn corrupt_files(&self) -> BTreeSet<usize> {
        self.content_errors
            .iter()
            .flat_map(|e| e.files.iter().copied())
            .chain(self.read_errors.iter().flat_map(|e| e.file_indexes()))
            .collect()
    }
}

/// Outcome of checking a single piece
#[derive(Debug)]
pub enum PieceStatus {
    Match,
    Mismatch(ContentMismatch),
    Unreadable(PieceReadError),
}

/// Re-hashes content and compares it with an expected [`PieceHashList`].
///
/// Runs on the same worker pool and progress contract as [`PieceHasher`].
#[derive(Debug, Clone, Default)]
pub struct Verifier {
    hasher: PieceHasher,
}

impl From<PieceHasher> for Verifier {
    fn from(hasher: PieceHasher) -> Self {
        Self { hasher }
    }
}

impl Verifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workers(self, workers: usize) -> Self {
        self.hasher.with_workers(workers).into()
    }

    pub fn with_interval(self, interval: Duration) -> Self {
        self.hasher.with_interval(interval).into()
    }

    pub fn verify(
        &self,
        stream: &VirtualFileStream,
        expected: &PieceHashList,
    ) -> Result<VerifyReport> {
        self.verify_with_progress(stream, expected, |_| ControlFlow::Continue(()))
    }

    /// Check every file, then re-hash every piece whose files passed the check.
    pub fn verify_with_progress<F>(
        &self,
        stream: &VirtualFileStream,
        expected: &PieceHashList,
        mut progress: F,
    ) -> Result<VerifyReport>
    where
        F: FnMut(&Progress<'_>) -> ControlFlow<()>,
    {
        check_hash_count(stream, expected)?;

        let mut report = VerifyReport {
            pieces_total: stream.piece_count(),
            file_errors: check_files(stream),
            ..Default::default()
        };

        let mut skip = vec![false; stream.piece_count() as usize];
        for error in &report.file_errors {
            let pieces = match error.file_index {
                Some(index) => stream.pieces_of_file(index),
                None => 0..stream.piece_count(),
            };
            for piece in pieces {
                skip[piece as usize] = true;
            }
        }
        let indices: Vec<u64> = (0..stream.piece_count())
            .filter(|&i| !skip[i as usize])
            .collect();
        report.pieces_skipped = stream.piece_count() - indices.len() as u64;

        info!(
            pieces = indices.len(),
            skipped = report.pieces_skipped,
            file_errors = report.file_errors.len(),
            "verifying"
        );

        let mut tracker =
            ProgressTracker::new(stream, indices.len() as u64, self.hasher.interval());
        let mut content_errors = Vec::new();
        let mut read_errors = Vec::new();

        let cancelled = run_pieces(stream, &indices, self.hasher.workers(), |done| {
            match done.result {
                Ok(hash) if expected.get(done.range.index) == Some(&hash) => {}
                Ok(_) => {
                    let mismatch = mismatch(stream, &done.range);
                    warn!(piece = mismatch.piece_index, "piece hash mismatch");
                    content_errors.push(mismatch);
                }
                Err(err) => {
                    log_read_error(&err);
                    read_errors.push(err);
                }
            }
            tracker.complete(&done.range, &mut progress)
        })?;

        content_errors.sort_by_key(|e: &ContentMismatch| e.piece_index);
        read_errors.sort_by_key(|e: &PieceReadError| e.piece_index);
        report.pieces_checked = tracker.pieces_done();
        report.content_errors = content_errors;
        report.read_errors = read_errors;
        report.cancelled = cancelled;

        info!(
            checked = report.pieces_checked,
            corrupt = report.content_errors.len(),
            status = ?report.status(),
            "verification finished"
        );
        Ok(report)
    }

    /// Check a single piece synchronously on the calling thread
    pub fn verify_piece(
        &self,
        stream: &VirtualFileStream,
        expected: &PieceHashList,
        index: u64,
    ) -> Result<PieceStatus> {
        check_hash_count(stream, expected)?;
        let range = stream.piece_range(index)?;
        let status = match hash_piece(&mut PieceReader::new(stream), &range) {
            Ok(hash) if expected.get(index) == Some(&hash) => PieceStatus::Match,
            Ok(_) => PieceStatus::Mismatch(mismatch(stream, &range)),
            Err(err) => PieceStatus::Unreadable(err),
        };
        Ok(status)
    }
}

fn check_hash_count(stream: &VirtualFileStream, expected: &PieceHashList) -> Result<()> {
    if expected.len() as u64 != stream.piece_count() {
        return Err(Error::HashCountMismatch {
            expected: stream.piece_count(),
            actual: expected.len() as u64,
        });
    }
    Ok(())
}

fn mismatch(stream: &VirtualFileStream, range: &PieceRange) -> ContentMismatch {
    let files: Vec<usize> = range.file_indexes().collect();
    ContentMismatch {
        piece_index: range.index,
        piece_size: stream.piece_size(),
        paths: files.iter().map(|&i| stream.file_path(i)).collect(),
        files,
    }
}

/// Existence, type and size of every file, without reading content
fn check_files(stream: &VirtualFileStream) -> Vec<FileCheckError> {
    let root = stream.content_path();
    if stream.files().layout() == Layout::MultiFile && root.is_file() {
        debug!(path = %root.display(), "content path is a file");
        return vec![FileCheckError {
            file_index: None,
            error: FileError::new(root, FileErrorKind::NotDirectory),
        }];
    }

    let mut errors = Vec::new();
    for (index, entry) in stream.files().iter().enumerate() {
        let path = stream.file_path(index);
        let kind = match fs::metadata(&path) {
            Err(e) => Some(FileError::from_io(&path, e).kind),
            Ok(meta) if meta.is_dir() => Some(FileErrorKind::IsDirectory),
            Ok(meta) if meta.len() != entry.len => Some(FileErrorKind::SizeMismatch {
                expected: entry.len,
                actual: meta.len(),
            }),
            Ok(_) => None,
        };
        if let Some(kind) = kind {
            debug!(file = index, path = %path.display(), error = %kind, "file check failed");
            errors.push(FileCheckError {
                file_index: Some(index),
                error: FileError::new(path, kind),
            });
        }
    }
    errors
}
