use std::collections::BTreeSet;
use std::ops::ControlFlow;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use super::pool::{log_read_error, run_pieces};
use super::progress::{Progress, ProgressTracker};
use crate::config::DEFAULT_PROGRESS_INTERVAL;
use crate::error::{PieceReadError, Result};
use crate::piece::{PieceHash, PieceHashList};
use crate::stream::VirtualFileStream;

/// How a hashing run ended
#[derive(Debug)]
pub enum HashOutcome {
    /// Every piece was hashed; entry `i` is the digest of piece `i`
    Complete(PieceHashList),
    /// The progress callback stopped the run
    Cancelled { pieces_done: u64 },
    /// At least one piece could not be read
    Failed(HashFailure),
}

impl HashOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, HashOutcome::Complete(_))
    }

    pub fn into_result(self) -> std::result::Result<PieceHashList, HashError> {
        match self {
            HashOutcome::Complete(hashes) => Ok(hashes),
            HashOutcome::Cancelled { pieces_done } => Err(HashError::Cancelled { pieces_done }),
            HashOutcome::Failed(failure) => Err(HashError::Failed(failure)),
        }
    }
}

/// Every piece that could not be read, ordered by piece index
#[derive(Debug, Default, Error)]
#[error("{} piece(s) could not be read", .errors.len())]
pub struct HashFailure {
    pub errors: Vec<PieceReadError>,
}

impl HashFailure {
    /// Indexes of the files behind the failed reads
    pub fn failed_files(&self) -> BTreeSet<usize> {
        self.errors.iter().flat_map(|e| e.file_indexes()).collect()
    }

    pub fn failed_paths(&self) -> BTreeSet<&Path> {
        self.errors.iter().flat_map(|e| e.paths()).collect()
    }
}

#[derive(Debug, Error)]
pub enum HashError {
    #[error("hashing cancelled after {pieces_done} pieces")]
    Cancelled { pieces_done: u64 },

    #[error(transparent)]
    Failed(#[from] HashFailure),
}

/// Computes the piece hash list of a [`VirtualFileStream`] on a bounded
/// worker pool.
///
/// Output is identical for any worker count.
#[derive(Debug, Clone)]
pub struct PieceHasher {
    workers: usize,
    interval: Duration,
}

impl Default for PieceHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl PieceHasher {
    pub fn new() -> Self {
        Self {
            workers: num_cpus::get(),
            interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    /// Set the number of hashing threads
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Minimum time between progress reports; zero reports every piece
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn hash(&self, stream: &VirtualFileStream) -> Result<HashOutcome> {
        self.hash_with_progress(stream, |_| ControlFlow::Continue(()))
    }

    /// Hash every piece, calling `progress` from this thread as pieces finish.
    ///
    /// Returning [`ControlFlow::Break`] from the callback cancels the run.
    /// Read errors do not stop other pieces from being hashed.
    pub fn hash_with_progress<F>(
        &self,
        stream: &VirtualFileStream,
        mut progress: F,
    ) -> Result<HashOutcome>
    where
        F: FnMut(&Progress<'_>) -> ControlFlow<()>,
    {
        let total = stream.piece_count();
        let indices: Vec<u64> = (0..total).collect();
        let mut slots: Vec<Option<PieceHash>> = vec![None; indices.len()];
        let mut errors = Vec::new();
        let mut tracker = ProgressTracker::new(stream, total, self.interval);

        info!(
            pieces = total,
            piece_size = stream.piece_size(),
            bytes = stream.total_size(),
            workers = self.workers,
            "hashing"
        );

        let cancelled = run_pieces(stream, &indices, self.workers, |done| {
            match done.result {
                Ok(hash) => slots[done.range.index as usize] = Some(hash),
                Err(err) => {
                    log_read_error(&err);
                    errors.push(err);
                }
            }
            tracker.complete(&done.range, &mut progress)
        })?;

        if cancelled {
            info!(pieces_done = tracker.pieces_done(), "hashing cancelled");
            return Ok(HashOutcome::Cancelled {
                pieces_done: tracker.pieces_done(),
            });
        }
        if !errors.is_empty() {
            errors.sort_by_key(|e| e.piece_index);
            return Ok(HashOutcome::Failed(HashFailure { errors }));
        }

        // Not cancelled and no errors: every slot was filled.
        let hashes: Option<PieceHashList> = slots.into_iter().collect();
        info!(pieces = total, "hashing complete");
        Ok(hashes.map_or_else(
            || HashOutcome::Failed(HashFailure::default()),
            HashOutcome::Complete,
        ))
    }
}
