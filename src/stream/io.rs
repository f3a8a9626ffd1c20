use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use super::{ByteSpan, PieceRange, VirtualFileStream};
use crate::error::{FileError, FileErrorKind, PieceReadError, SpanReadError};

/// Reads pieces of one stream, keeping the most recently used file open.
///
/// A file is opened and size-checked once for all consecutive spans that
/// fall inside it. Each hashing worker owns its own reader.
pub struct PieceReader<'s> {
    stream: &'s VirtualFileStream,
    open: Option<(usize, File)>,
}

impl<'s> PieceReader<'s> {
    pub fn new(stream: &'s VirtualFileStream) -> Self {
        Self { stream, open: None }
    }

    /// Read the bytes of one piece, potentially spanning multiple files.
    ///
    /// Every span is attempted even after one fails, so the error lists each
    /// unreadable file of the piece.
    pub fn read(&mut self, range: &PieceRange) -> Result<Vec<u8>, PieceReadError> {
        let mut buffer = vec![0u8; range.len as usize];
        let mut filled = 0usize;
        let mut failed = Vec::new();

        for span in &range.spans {
            let end = filled + span.len as usize;
            if let Err(error) = self.read_span(span, &mut buffer[filled..end]) {
                failed.push(SpanReadError {
                    file_index: span.file_index,
                    error,
                });
            }
            filled = end;
        }

        if failed.is_empty() {
            Ok(buffer)
        } else {
            Err(PieceReadError {
                piece_index: range.index,
                files: failed,
            })
        }
    }

    fn read_span(&mut self, span: &ByteSpan, buf: &mut [u8]) -> Result<(), FileError> {
        let path = self.stream.file_path(span.file_index);
        let file = match &mut self.open {
            Some((index, file)) if *index == span.file_index => file,
            slot => {
                let expected_len = self
                    .stream
                    .files()
                    .get(span.file_index)
                    .map_or(0, |f| f.len);
                let file = open_checked(&path, expected_len)?;
                &mut slot.insert((span.file_index, file)).1
            }
        };

        file.seek(SeekFrom::Start(span.offset))
            .map_err(|e| FileError::from_io(&path, e))?;
        file.read_exact(buf).map_err(|e| FileError::from_io(&path, e))
    }
}

impl VirtualFileStream {
    /// Read one piece with a fresh [`PieceReader`].
    ///
    /// Every file is checked against its expected size before reading, so a
    /// truncated or grown file fails instead of yielding shifted data.
    pub fn read_piece(&self, range: &PieceRange) -> Result<Vec<u8>, PieceReadError> {
        PieceReader::new(self).read(range)
    }
}

fn open_checked(path: &Path, expected_len: u64) -> Result<File, FileError> {
    let metadata = fs::metadata(path).map_err(|e| FileError::from_io(path, e))?;
    if metadata.is_dir() {
        return Err(FileError::new(path, FileErrorKind::IsDirectory));
    }
    if metadata.len() != expected_len {
        return Err(FileError::new(
            path,
            FileErrorKind::SizeMismatch {
                expected: expected_len,
                actual: metadata.len(),
            },
        ));
    }
    File::open(path).map_err(|e| FileError::from_io(path, e))
}
