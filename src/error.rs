//! Error types shared by the codec, the stream and the hashing pipeline.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Malformed bencode. Positions are byte offsets into the decoded buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unexpected end of input at byte {0}")]
    UnexpectedEof(usize),

    #[error("invalid integer at byte {at}: {reason}")]
    InvalidInteger { at: usize, reason: &'static str },

    #[error("invalid byte string length at byte {at}: {reason}")]
    InvalidLength { at: usize, reason: &'static str },

    #[error("unexpected byte {byte:#04x} at byte {at}")]
    UnexpectedByte { byte: u8, at: usize },

    #[error("dictionary key at byte {0} is not a byte string")]
    NonStringKey(usize),

    #[error("dictionary key at byte {0} is not in ascending order")]
    UnsortedKey(usize),

    #[error("duplicate dictionary key at byte {0}")]
    DuplicateKey(usize),

    #[error("{0} trailing bytes after value")]
    TrailingData(usize),

    #[error("nesting deeper than {0} levels")]
    TooDeep(usize),
}

/// What is wrong with one file on disk
#[derive(Debug, Error)]
pub enum FileErrorKind {
    #[error("no such file")]
    NotFound,

    #[error("is a directory, expected a file")]
    IsDirectory,

    #[error("is a file, expected a directory")]
    NotDirectory,

    #[error("size is {actual} bytes, expected {expected}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A problem with a specific file of a file list
#[derive(Debug, Error)]
#[error("{}: {kind}", .path.display())]
pub struct FileError {
    pub path: PathBuf,
    #[source]
    pub kind: FileErrorKind,
}

impl FileError {
    pub fn new(path: impl Into<PathBuf>, kind: FileErrorKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Classify an I/O error raised while opening or reading `path`
    pub fn from_io(path: impl Into<PathBuf>, err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => FileErrorKind::NotFound,
            io::ErrorKind::IsADirectory => FileErrorKind::IsDirectory,
            io::ErrorKind::NotADirectory => FileErrorKind::NotFound,
            _ => FileErrorKind::Io(err),
        };
        Self::new(path, kind)
    }
}

/// One file of a piece that could not be read
#[derive(Debug, Error)]
#[error("file #{file_index}: {error}")]
pub struct SpanReadError {
    pub file_index: usize,
    #[source]
    pub error: FileError,
}

/// Failure while assembling the bytes of one piece.
///
/// Every span of the piece is attempted, so `files` names each file that
/// failed, in stream order.
#[derive(Debug, Error)]
#[error("failed to read piece {piece_index}: {}", display_spans(.files))]
pub struct PieceReadError {
    pub piece_index: u64,
    pub files: Vec<SpanReadError>,
}

impl PieceReadError {
    pub fn file_indexes(&self) -> impl Iterator<Item = usize> + '_ {
        self.files.iter().map(|f| f.file_index)
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> + '_ {
        self.files.iter().map(|f| f.error.path.as_path())
    }
}

fn display_spans(files: &[SpanReadError]) -> String {
    files
        .iter()
        .map(|f| f.error.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Addressing errors of the virtual file stream
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("nothing to hash: file list is empty or has zero total size")]
    Empty,

    #[error("piece size must be greater than zero")]
    ZeroPieceSize,

    #[error("piece index {index} is out of bounds (0 - {max})")]
    PieceOutOfBounds { index: u64, max: u64 },

    #[error("byte range {offset}+{len} is outside the stream (size {total})")]
    RangeOutOfBounds { offset: u64, len: u64, total: u64 },

    #[error("total size of the file list overflows 64 bits")]
    TooLarge,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PieceSizeError {
    #[error("piece size {0} is not a power of two")]
    NotPowerOfTwo(u64),

    #[error("piece size {size} must be between {min} and {max}")]
    OutOfRange { size: u64, min: u64, max: u64 },

    #[error("piece length exponent {exp} must be between {min} and {max}")]
    ExponentOutOfRange { exp: u32, min: u32, max: u32 },
}

/// Structurally valid bencode that is not valid metainfo
#[derive(Debug, Error)]
pub enum MetainfoError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("missing {0}")]
    Missing(&'static str),

    #[error("{field} must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },

    #[error(transparent)]
    PieceSize(#[from] PieceSizeError),
}

/// Top-level error of the library
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Metainfo(#[from] MetainfoError),

    #[error(transparent)]
    PieceSize(#[from] PieceSizeError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("failed to start hashing workers")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("expected {expected} piece hashes, got {actual}")]
    HashCountMismatch { expected: u64, actual: u64 },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
