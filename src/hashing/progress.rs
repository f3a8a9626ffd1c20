use std::ops::ControlFlow;
use std::time::{Duration, Instant};

use crate::models::FileEntry;
use crate::stream::{PieceRange, VirtualFileStream};

/// Snapshot handed to progress callbacks after a piece completes
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    /// File holding the last byte of the piece that just completed
    pub file: &'a FileEntry,
    pub file_index: usize,
    pub pieces_done: u64,
    pub pieces_total: u64,
    /// Finished pieces that touch `file`
    pub file_pieces_done: u64,
    pub file_pieces_total: u64,
}

impl Progress<'_> {
    pub fn fraction(&self) -> f64 {
        if self.pieces_total == 0 {
            1.0
        } else {
            self.pieces_done as f64 / self.pieces_total as f64
        }
    }

    pub fn is_last(&self) -> bool {
        self.pieces_done == self.pieces_total
    }
}

/// Completion bookkeeping owned by the coordinating thread.
///
/// The callback runs for the first completed piece, for the last one, and
/// otherwise at most once per `interval`.
pub(crate) struct ProgressTracker<'s> {
    stream: &'s VirtualFileStream,
    interval: Duration,
    last_report: Option<Instant>,
    pieces_done: u64,
    pieces_total: u64,
    file_done: Vec<u64>,
}

impl<'s> ProgressTracker<'s> {
    pub fn new(stream: &'s VirtualFileStream, pieces_total: u64, interval: Duration) -> Self {
        Self {
            stream,
            interval,
            last_report: None,
            pieces_done: 0,
            pieces_total,
            file_done: vec![0; stream.files().len()],
        }
    }

    pub fn pieces_done(&self) -> u64 {
        self.pieces_done
    }

    pub fn complete<F>(&mut self, range: &PieceRange, callback: &mut F) -> ControlFlow<()>
    where
        F: FnMut(&Progress<'_>) -> ControlFlow<()>,
    {
        self.pieces_done += 1;
        for file_index in range.file_indexes() {
            self.file_done[file_index] += 1;
        }

        let now = Instant::now();
        let due = match self.last_report {
            None => true,
            Some(last) => now.duration_since(last) >= self.interval,
        };
        if !due && self.pieces_done < self.pieces_total {
            return ControlFlow::Continue(());
        }
        self.last_report = Some(now);

        let Some(file_index) = range.spans.last().map(|span| span.file_index) else {
            return ControlFlow::Continue(());
        };
        let Some(file) = self.stream.files().get(file_index) else {
            return ControlFlow::Continue(());
        };
        let pieces = self.stream.pieces_of_file(file_index);

        callback(&Progress {
            file,
            file_index,
            pieces_done: self.pieces_done,
            pieces_total: self.pieces_total,
            file_pieces_done: self.file_done[file_index],
            file_pieces_total: pieces.end - pieces.start,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileList;

    #[test]
    fn test_gate_reports_first_and_last() {
        let stream = VirtualFileStream::new(FileList::single("x", 64), 16, "/x").unwrap();
        let mut tracker = ProgressTracker::new(&stream, 4, Duration::from_secs(3600));
        let mut seen = Vec::new();
        let mut callback = |p: &Progress<'_>| {
            seen.push((p.pieces_done, p.file_pieces_done, p.file_pieces_total));
            ControlFlow::Continue(())
        };
        for index in 0..4 {
            let range = stream.piece_range(index).unwrap();
            assert!(tracker.complete(&range, &mut callback).is_continue());
        }
        assert_eq!(seen, vec![(1, 1, 4), (4, 4, 4)]);
    }

    #[test]
    fn test_zero_interval_reports_every_piece() {
        let stream = VirtualFileStream::new(FileList::single("x", 40), 16, "/x").unwrap();
        let mut tracker = ProgressTracker::new(&stream, 3, Duration::ZERO);
        let mut calls = 0;
        for index in 0..3 {
            let range = stream.piece_range(index).unwrap();
            let _ = tracker.complete(&range, &mut |_: &Progress<'_>| {
                calls += 1;
                ControlFlow::Continue(())
            });
        }
        assert_eq!(calls, 3);
    }
}
