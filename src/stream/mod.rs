//! The logical byte stream formed by concatenating a file list, and the
//! mapping between piece indices and per-file byte spans.

mod io;

pub use io::PieceReader;

use std::cmp::{max, min};
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::error::StreamError;
use crate::models::{FileEntry, FileList};

pub use crate::piece::piece_count;

/// Part of a piece stored in one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSpan {
    pub file_index: usize,
    /// Offset within the file
    pub offset: u64,
    pub len: u64,
}

/// Byte layout of one piece
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceRange {
    pub index: u64,
    /// Offset of the first byte within the stream
    pub offset: u64,
    pub len: u64,
    /// Spans in stream order; their lengths sum to `len`
    pub spans: Vec<ByteSpan>,
}

impl PieceRange {
    pub fn file_indexes(&self) -> impl Iterator<Item = usize> + '_ {
        self.spans.iter().map(|span| span.file_index)
    }
}

/// Sum of all file sizes; an empty list or a zero total cannot be split into pieces
pub fn total_size(files: &FileList) -> Result<u64, StreamError> {
    match files.total_len() {
        None => Err(StreamError::TooLarge),
        Some(0) => Err(StreamError::Empty),
        Some(total) => Ok(total),
    }
}

/// A file list resolved against a content path and split into pieces.
///
/// Addressing is pure arithmetic over the file sizes; only [`read_piece`]
/// touches the filesystem, with a private handle per call. The stream is
/// shared by reference between hashing workers.
///
/// [`read_piece`]: VirtualFileStream::read_piece
#[derive(Debug, Clone)]
pub struct VirtualFileStream {
    files: FileList,
    content_path: PathBuf,
    piece_size: u64,
    total_size: u64,
    piece_count: u64,
    /// Exclusive end offset of every file within the stream
    ends: Vec<u64>,
}

impl VirtualFileStream {
    pub fn new(
        files: FileList,
        piece_size: u64,
        content_path: impl Into<PathBuf>,
    ) -> Result<Self, StreamError> {
        if piece_size == 0 {
            return Err(StreamError::ZeroPieceSize);
        }
        let total_size = total_size(&files)?;

        let mut ends = Vec::with_capacity(files.len());
        let mut offset = 0u64;
        for file in &files {
            offset = offset
                .checked_add(file.len)
                .ok_or(StreamError::TooLarge)?;
            ends.push(offset);
        }

        Ok(Self {
            piece_count: piece_count(total_size, piece_size),
            files,
            content_path: content_path.into(),
            piece_size,
            total_size,
            ends,
        })
    }

    pub fn files(&self) -> &FileList {
        &self.files
    }

    pub fn content_path(&self) -> &Path {
        &self.content_path
    }

    pub fn piece_size(&self) -> u64 {
        self.piece_size
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn piece_count(&self) -> u64 {
        self.piece_count
    }

    /// Stream offset of the first byte of file `index`
    pub fn file_offset(&self, index: usize) -> Option<u64> {
        let entry = self.files.get(index)?;
        Some(self.ends[index] - entry.len)
    }

    /// Stream byte range occupied by file `index`
    pub fn byte_range_of_file(&self, index: usize) -> Option<Range<u64>> {
        let start = self.file_offset(index)?;
        Some(start..self.ends[index])
    }

    /// On-disk location of file `index`
    pub fn file_path(&self, index: usize) -> PathBuf {
        self.files.resolve(&self.content_path, index)
    }

    pub fn piece_range(&self, index: u64) -> Result<PieceRange, StreamError> {
        if index >= self.piece_count {
            return Err(StreamError::PieceOutOfBounds {
                index,
                max: self.piece_count - 1,
            });
        }
        Ok(self.range_unchecked(index))
    }

    /// Caller guarantees `index < piece_count`
    pub(crate) fn range_unchecked(&self, index: u64) -> PieceRange {
        let start = index * self.piece_size;
        let len = min(self.piece_size, self.total_size - start);
        PieceRange {
            index,
            offset: start,
            len,
            spans: self.spans_unchecked(start, start + len),
        }
    }

    /// Map `len` bytes starting at stream offset `offset` onto per-file spans.
    ///
    /// Spans follow list order and their lengths sum to `len`; zero-length
    /// files never appear.
    pub fn spans(&self, offset: u64, len: u64) -> Result<Vec<ByteSpan>, StreamError> {
        let out_of_bounds = StreamError::RangeOutOfBounds {
            offset,
            len,
            total: self.total_size,
        };
        let end = offset.checked_add(len).ok_or(out_of_bounds.clone())?;
        if end > self.total_size {
            return Err(out_of_bounds);
        }
        Ok(self.spans_unchecked(offset, end))
    }

    /// Indexes of the files overlapping `len` bytes at stream offset `offset`
    pub fn files_at_byte_range(&self, offset: u64, len: u64) -> Result<Vec<usize>, StreamError> {
        Ok(self
            .spans(offset, len)?
            .into_iter()
            .map(|span| span.file_index)
            .collect())
    }

    fn spans_unchecked(&self, start: u64, end: u64) -> Vec<ByteSpan> {
        // First file whose end lies past the range start
        let first = self.ends.partition_point(|&file_end| file_end <= start);

        let mut spans = Vec::new();
        for (file_index, entry) in self.files.iter().enumerate().skip(first) {
            let file_end = self.ends[file_index];
            let file_start = file_end - entry.len;
            if file_start >= end {
                break;
            }

            let overlap_start = max(start, file_start);
            let overlap_end = min(end, file_end);
            if overlap_end > overlap_start {
                spans.push(ByteSpan {
                    file_index,
                    offset: overlap_start - file_start,
                    len: overlap_end - overlap_start,
                });
            }
        }
        spans
    }

    /// Indexes of the files that piece `index` overlaps
    pub fn files_at_piece(&self, index: u64) -> Result<Vec<usize>, StreamError> {
        Ok(self.piece_range(index)?.file_indexes().collect())
    }

    /// Pieces that contain at least one byte of file `index`
    pub fn pieces_of_file(&self, index: usize) -> Range<u64> {
        let (Some(entry), Some(start)) = (self.files.get(index), self.file_offset(index)) else {
            return 0..0;
        };
        let first = start / self.piece_size;
        if entry.len == 0 {
            return first..first;
        }
        let last = (start + entry.len - 1) / self.piece_size;
        first..last + 1
    }

    /// File holding the byte at stream offset `pos`
    pub fn file_at_position(&self, pos: u64) -> Option<(usize, &FileEntry)> {
        if pos >= self.total_size {
            return None;
        }
        let index = self.ends.partition_point(|&file_end| file_end <= pos);
        self.files.get(index).map(|entry| (index, entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_files() -> VirtualFileStream {
        let files = FileList::multi(vec![
            FileEntry::new(["a"], 10),
            FileEntry::new(["b"], 25),
        ]);
        VirtualFileStream::new(files, 16, "/content").unwrap()
    }

    fn span(file_index: usize, offset: u64, len: u64) -> ByteSpan {
        ByteSpan {
            file_index,
            offset,
            len,
        }
    }

    #[test]
    fn test_piece_ranges_across_files() {
        let stream = two_files();
        assert_eq!(stream.total_size(), 35);
        assert_eq!(stream.piece_count(), 3);

        let p0 = stream.piece_range(0).unwrap();
        assert_eq!((p0.offset, p0.len), (0, 16));
        assert_eq!(p0.spans, vec![span(0, 0, 10), span(1, 0, 6)]);

        let p1 = stream.piece_range(1).unwrap();
        assert_eq!((p1.offset, p1.len), (16, 16));
        assert_eq!(p1.spans, vec![span(1, 6, 16)]);

        let p2 = stream.piece_range(2).unwrap();
        assert_eq!((p2.offset, p2.len), (32, 3));
        assert_eq!(p2.spans, vec![span(1, 22, 3)]);

        assert_eq!(
            stream.piece_range(3),
            Err(StreamError::PieceOutOfBounds { index: 3, max: 2 })
        );
    }

    #[test]
    fn test_zero_length_files_have_no_spans() {
        let files = FileList::multi(vec![
            FileEntry::new(["empty1"], 0),
            FileEntry::new(["data"], 20),
            FileEntry::new(["empty2"], 0),
            FileEntry::new(["tail"], 4),
        ]);
        let stream = VirtualFileStream::new(files, 16, "/c").unwrap();
        assert_eq!(stream.files_at_piece(0).unwrap(), vec![1]);
        assert_eq!(stream.files_at_piece(1).unwrap(), vec![1, 3]);
        assert!(stream.pieces_of_file(0).is_empty());
        assert!(stream.pieces_of_file(2).is_empty());
        assert_eq!(stream.pieces_of_file(1), 0..2);
        assert_eq!(stream.pieces_of_file(3), 1..2);
        assert_eq!(stream.file_at_position(0).map(|(i, _)| i), Some(1));
        assert_eq!(stream.file_at_position(20).map(|(i, _)| i), Some(3));
        assert_eq!(stream.file_at_position(24), None);
    }

    #[test]
    fn test_lookups() {
        let stream = two_files();
        assert_eq!(stream.file_offset(0), Some(0));
        assert_eq!(stream.file_offset(1), Some(10));
        assert_eq!(stream.file_offset(2), None);
        assert_eq!(stream.files_at_piece(0).unwrap(), vec![0, 1]);
        assert_eq!(stream.files_at_piece(2).unwrap(), vec![1]);
        assert_eq!(stream.pieces_of_file(0), 0..1);
        assert_eq!(stream.pieces_of_file(1), 0..3);
        assert_eq!(stream.file_at_position(9).map(|(i, _)| i), Some(0));
        assert_eq!(stream.file_at_position(10).map(|(i, _)| i), Some(1));
        assert_eq!(stream.file_path(1), Path::new("/content").join("b"));
    }

    #[test]
    fn test_spans_of_arbitrary_byte_ranges() {
        let files = FileList::multi(vec![
            FileEntry::new(["a"], 10),
            FileEntry::new(["empty"], 0),
            FileEntry::new(["b"], 25),
        ]);
        let stream = VirtualFileStream::new(files, 16, "/c").unwrap();

        // Crosses the boundary where the empty file sits
        assert_eq!(
            stream.spans(8, 5).unwrap(),
            vec![span(0, 8, 2), span(2, 0, 3)]
        );
        assert_eq!(stream.spans(12, 23).unwrap(), vec![span(2, 2, 23)]);
        assert_eq!(stream.spans(35, 0).unwrap(), vec![]);
        assert_eq!(stream.files_at_byte_range(0, 35).unwrap(), vec![0, 2]);
        assert_eq!(
            stream.spans(30, 6),
            Err(StreamError::RangeOutOfBounds {
                offset: 30,
                len: 6,
                total: 35
            })
        );
        assert!(stream.spans(u64::MAX, 2).is_err());

        let p0 = stream.piece_range(0).unwrap();
        assert_eq!(stream.spans(p0.offset, p0.len).unwrap(), p0.spans);
    }

    #[test]
    fn test_byte_range_of_file() {
        let files = FileList::multi(vec![
            FileEntry::new(["a"], 10),
            FileEntry::new(["empty"], 0),
            FileEntry::new(["b"], 25),
        ]);
        let stream = VirtualFileStream::new(files, 16, "/c").unwrap();
        assert_eq!(stream.byte_range_of_file(0), Some(0..10));
        assert_eq!(stream.byte_range_of_file(1), Some(10..10));
        assert_eq!(stream.byte_range_of_file(2), Some(10..35));
        assert_eq!(stream.byte_range_of_file(3), None);
    }

    #[test]
    fn test_rejects_overflowing_total() {
        let files = FileList::multi(vec![
            FileEntry::new(["a"], u64::MAX / 2 + 1),
            FileEntry::new(["b"], u64::MAX / 2 + 1),
        ]);
        assert_eq!(
            VirtualFileStream::new(files, 16, "/c").unwrap_err(),
            StreamError::TooLarge
        );
    }

    #[test]
    fn test_exact_multiple_has_full_last_piece() {
        let files = FileList::single("x", 32);
        let stream = VirtualFileStream::new(files, 16, "/x").unwrap();
        assert_eq!(stream.piece_count(), 2);
        assert_eq!(stream.piece_range(1).unwrap().len, 16);
    }

    #[test]
    fn test_rejects_empty_input() {
        assert_eq!(
            VirtualFileStream::new(FileList::multi(Vec::new()), 16, "/c").unwrap_err(),
            StreamError::Empty
        );
        assert_eq!(
            VirtualFileStream::new(FileList::single("x", 0), 16, "/c").unwrap_err(),
            StreamError::Empty
        );
        assert_eq!(
            VirtualFileStream::new(FileList::single("x", 5), 0, "/c").unwrap_err(),
            StreamError::ZeroPieceSize
        );
    }
}
