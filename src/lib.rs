//! # piecework
//!
//! A library for creating and verifying BitTorrent v1 metainfo files.
//!
//! It provides a strict bencode codec, the mapping of a file list onto a
//! logical byte stream split into pieces, parallel SHA-1 piece hashing with
//! progress and cancellation, and verification of content on disk.
//!
//! ## Example
//!
//! ```no_run
//! use piecework::{FileEntry, FileList, PieceHasher, VirtualFileStream};
//!
//! let files = FileList::multi(vec![
//!     FileEntry::new(["a.bin"], 10),
//!     FileEntry::new(["b.bin"], 25),
//! ]);
//! let stream = VirtualFileStream::new(files, 16 * 1024, "content").unwrap();
//! let outcome = PieceHasher::new().hash(&stream).unwrap();
//! assert!(outcome.is_complete());
//! ```

pub mod bencode;
pub mod builder;
pub mod cli;
pub mod config;
pub mod error;
pub mod hashing;
pub mod models;
pub mod piece;
pub mod scanner;
pub mod stream;
pub mod verify;

// Re-export main types for convenience
pub use builder::TorrentBuilder;
pub use error::{Error, Result};
pub use hashing::{HashOutcome, PieceHasher, Progress};
pub use models::{FileEntry, FileList, Torrent, TorrentOptions};
pub use piece::{PieceHash, PieceHashList};
pub use stream::VirtualFileStream;
pub use verify::{Verifier, VerifyReport, VerifyStatus};
