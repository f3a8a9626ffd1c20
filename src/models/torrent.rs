use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::file::{FileEntry, FileList, Layout};
use crate::bencode::{self, Value};
use crate::config::{DIGEST_LEN, MAX_TORRENT_FILE_SIZE};
use crate::error::{MetainfoError, StreamError};
use crate::piece::{PieceHashList, piece_count, validate_piece_size};
use crate::stream::VirtualFileStream;

type Dict = BTreeMap<Vec<u8>, Value>;
type Result<T> = std::result::Result<T, MetainfoError>;

/// Info dictionary for the torrent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Info {
    pub name: String,
    pub piece_length: u64,
    pub pieces: PieceHashList,
    /// For single-file torrents the only entry is named after `name`
    pub files: FileList,
    /// Keys without a typed field (`private`, `source`, ...), kept verbatim
    pub extra: Dict,
}

/// Torrent metainfo structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Torrent {
    pub info: Info,
    /// Top-level keys other than `info` (`announce`, `comment`, ...), kept verbatim
    pub extra: Dict,
}

/// Configuration options for building a torrent
#[derive(Debug, Clone, Default)]
pub struct TorrentOptions {
    /// Piece length exponent (2^N bytes)
    pub piece_length: Option<u32>,
    pub private: bool,
    pub comment: Option<String>,
    pub announce: Vec<String>,
    pub no_date: bool,
    /// Fixed creation date instead of the current time
    pub creation_date: Option<i64>,
    pub name: Option<String>,
}

impl Info {
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Dict(mut dict) = value else {
            return Err(MetainfoError::WrongType {
                field: "info",
                expected: "a dictionary",
            });
        };

        let name = path_segment(take(&mut dict, b"name", "info.name")?, "info.name")?;
        let piece_length = length(
            take(&mut dict, b"piece length", "info.piece length")?,
            "info.piece length",
        )?;
        let piece_length = validate_piece_size(piece_length)?;

        let pieces = match take(&mut dict, b"pieces", "info.pieces")? {
            Value::Bytes(bytes) => PieceHashList::from_bytes(&bytes)?,
            _ => {
                return Err(MetainfoError::WrongType {
                    field: "info.pieces",
                    expected: "a byte string",
                });
            }
        };
        if pieces.is_empty() {
            return Err(MetainfoError::Invalid {
                field: "info.pieces",
                reason: "no piece hashes".to_string(),
            });
        }

        let files = match (
            dict.remove(b"length".as_slice()),
            dict.remove(b"files".as_slice()),
        ) {
            (Some(len), None) => FileList::single(name.clone(), length(len, "info.length")?),
            (None, Some(files)) => FileList::multi(file_entries(files)?),
            (Some(_), Some(_)) => {
                return Err(MetainfoError::Invalid {
                    field: "info",
                    reason: "both 'length' and 'files' are present".to_string(),
                });
            }
            (None, None) => return Err(MetainfoError::Missing("info.length or info.files")),
        };

        let total_size = files.total_len().ok_or_else(|| MetainfoError::Invalid {
            field: "info.files",
            reason: "total size overflows 64 bits".to_string(),
        })?;
        let expected = piece_count(total_size, piece_length);
        if expected != pieces.len() as u64 {
            return Err(MetainfoError::Invalid {
                field: "info.pieces",
                reason: format!(
                    "{} hashes for {} bytes of content ({} pieces)",
                    pieces.len(),
                    total_size,
                    expected
                ),
            });
        }

        Ok(Self {
            name,
            piece_length,
            pieces,
            files,
            extra: dict,
        })
    }

    pub fn to_value(&self) -> Value {
        let mut dict = self.extra.clone();
        dict.insert(b"name".to_vec(), self.name.as_str().into());
        dict.insert(b"piece length".to_vec(), integer(self.piece_length));
        dict.insert(b"pieces".to_vec(), Value::Bytes(self.pieces.to_bytes()));

        match self.files.layout() {
            Layout::SingleFile => {
                dict.insert(b"length".to_vec(), integer(self.total_size()));
            }
            Layout::MultiFile => {
                let files = self
                    .files
                    .iter()
                    .map(|file| {
                        let mut entry = Value::dict();
                        entry.insert("length", integer(file.len));
                        entry.insert(
                            "path",
                            file.path
                                .iter()
                                .map(|s| Value::from(s.as_str()))
                                .collect::<Vec<_>>(),
                        );
                        entry
                    })
                    .collect::<Vec<_>>();
                dict.insert(b"files".to_vec(), Value::List(files));
            }
        }
        Value::Dict(dict)
    }

    /// Total content size; saturates for a hand-built file list whose sizes overflow
    pub fn total_size(&self) -> u64 {
        self.files.total_len().unwrap_or(u64::MAX)
    }

    pub fn is_private(&self) -> bool {
        self.extra
            .get(b"private".as_slice())
            .and_then(Value::as_integer)
            == Some(1)
    }
}

impl Torrent {
    pub fn new(info: Info) -> Self {
        Self {
            info,
            extra: Dict::new(),
        }
    }

    /// Decode and validate an encoded metainfo file
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::from_value(bencode::decode(data)?)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Dict(mut dict) = value else {
            return Err(MetainfoError::WrongType {
                field: "metainfo",
                expected: "a dictionary",
            });
        };
        let info = Info::from_value(take(&mut dict, b"info", "info")?)?;
        Ok(Self { info, extra: dict })
    }

    /// Read a `.torrent` file, refusing anything larger than 10 MB before decoding
    pub fn read(path: &Path) -> crate::Result<Self> {
        let size = fs::metadata(path)?.len();
        if size > MAX_TORRENT_FILE_SIZE {
            return Err(MetainfoError::Invalid {
                field: "metainfo",
                reason: format!(
                    "file is {} bytes, the limit is {}",
                    size, MAX_TORRENT_FILE_SIZE
                ),
            }
            .into());
        }
        let data = fs::read(path)?;
        Ok(Self::from_bytes(&data)?)
    }

    pub fn to_value(&self) -> Value {
        let mut dict = self.extra.clone();
        dict.insert(b"info".to_vec(), self.info.to_value());
        Value::Dict(dict)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        bencode::encode(&self.to_value())
    }

    /// SHA-1 of the encoded info dictionary
    pub fn info_hash(&self) -> [u8; DIGEST_LEN] {
        Sha1::digest(bencode::encode(&self.info.to_value())).into()
    }

    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash())
    }

    /// Byte stream of this torrent's content stored at `content_path`
    pub fn stream(
        &self,
        content_path: impl Into<PathBuf>,
    ) -> std::result::Result<VirtualFileStream, StreamError> {
        VirtualFileStream::new(self.info.files.clone(), self.info.piece_length, content_path)
    }

    pub fn announce(&self) -> Option<&str> {
        self.extra_str(b"announce")
    }

    pub fn comment(&self) -> Option<&str> {
        self.extra_str(b"comment")
    }

    pub fn created_by(&self) -> Option<&str> {
        self.extra_str(b"created by")
    }

    pub fn creation_date(&self) -> Option<i64> {
        self.extra
            .get(b"creation date".as_slice())
            .and_then(Value::as_integer)
    }

    fn extra_str(&self, key: &[u8]) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }
}

/// SHA-1 of the raw `info` dictionary bytes inside an encoded metainfo file
pub fn info_hash(data: &[u8]) -> Result<[u8; DIGEST_LEN]> {
    let range =
        bencode::locate(data, &[b"info".as_slice()])?.ok_or(MetainfoError::Missing("info"))?;
    Ok(Sha1::digest(&data[range]).into())
}

/// Concatenated piece digests of an encoded metainfo file, without decoding it
pub fn raw_pieces(data: &[u8]) -> Result<&[u8]> {
    let range = bencode::locate(data, &[b"info".as_slice(), b"pieces"])?
        .ok_or(MetainfoError::Missing("info.pieces"))?;
    let raw = &data[range];
    let colon = raw
        .iter()
        .position(|&b| b == b':')
        .filter(|_| raw.first().is_some_and(u8::is_ascii_digit))
        .ok_or(MetainfoError::WrongType {
            field: "info.pieces",
            expected: "a byte string",
        })?;
    Ok(&raw[colon + 1..])
}

/// Bencode integers are signed; sizes read from metainfo or from disk fit
fn integer(n: u64) -> Value {
    Value::Integer(i64::try_from(n).unwrap_or(i64::MAX))
}

fn take(dict: &mut Dict, key: &[u8], field: &'static str) -> Result<Value> {
    dict.remove(key).ok_or(MetainfoError::Missing(field))
}

fn length(value: Value, field: &'static str) -> Result<u64> {
    match value {
        Value::Integer(n) => u64::try_from(n).map_err(|_| MetainfoError::Invalid {
            field,
            reason: format!("{} is negative", n),
        }),
        _ => Err(MetainfoError::WrongType {
            field,
            expected: "an integer",
        }),
    }
}

/// A single path component: non-empty UTF-8 that cannot escape the content directory
fn path_segment(value: Value, field: &'static str) -> Result<String> {
    let segment = match value {
        Value::Bytes(bytes) => String::from_utf8(bytes).ok(),
        _ => None,
    }
    .ok_or(MetainfoError::WrongType {
        field,
        expected: "a UTF-8 string",
    })?;

    if segment.is_empty() || segment == "." || segment == ".." || segment.contains(['/', '\\']) {
        return Err(MetainfoError::Invalid {
            field,
            reason: format!("{:?} is not a valid path component", segment),
        });
    }
    Ok(segment)
}

fn file_entries(value: Value) -> Result<Vec<FileEntry>> {
    let Value::List(items) = value else {
        return Err(MetainfoError::WrongType {
            field: "info.files",
            expected: "a list",
        });
    };
    if items.is_empty() {
        return Err(MetainfoError::Invalid {
            field: "info.files",
            reason: "no files".to_string(),
        });
    }

    items
        .into_iter()
        .map(|item| {
            let Value::Dict(mut entry) = item else {
                return Err(MetainfoError::WrongType {
                    field: "info.files",
                    expected: "a list of dictionaries",
                });
            };
            let len = length(
                take(&mut entry, b"length", "info.files.length")?,
                "info.files.length",
            )?;
            let segments = match take(&mut entry, b"path", "info.files.path")? {
                Value::List(segments) if !segments.is_empty() => segments,
                _ => {
                    return Err(MetainfoError::WrongType {
                        field: "info.files.path",
                        expected: "a non-empty list of strings",
                    });
                }
            };
            let path = segments
                .into_iter()
                .map(|s| path_segment(s, "info.files.path"))
                .collect::<Result<Vec<_>>>()?;
            Ok(FileEntry { path, len })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::piece::PieceHash;

    fn sample_info(files: FileList, piece_length: u64) -> Info {
        let count = piece_count(files.total_len().unwrap(), piece_length);
        Info {
            name: "sample".to_string(),
            piece_length,
            pieces: (0..count).map(|i| PieceHash([i as u8; 20])).collect(),
            files,
            extra: Dict::new(),
        }
    }

    #[test]
    fn test_roundtrip_multi_file() {
        let files = FileList::multi(vec![
            FileEntry::new(["a.txt"], 40_000),
            FileEntry::new(["sub", "b.bin"], 1),
        ]);
        let mut torrent = Torrent::new(sample_info(files, 1 << 14));
        torrent.extra.insert(b"announce".to_vec(), "http://t/a".into());
        torrent.info.extra.insert(b"private".to_vec(), 1i64.into());

        let bytes = torrent.to_bytes();
        let parsed = Torrent::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, torrent);
        assert_eq!(parsed.announce(), Some("http://t/a"));
        assert!(parsed.info.is_private());
        assert_eq!(info_hash(&bytes).unwrap(), torrent.info_hash());
        assert_eq!(raw_pieces(&bytes).unwrap(), torrent.info.pieces.to_bytes());
    }

    #[test]
    fn test_single_file_layout() {
        let torrent = Torrent::new(sample_info(FileList::single("sample", 100), 1 << 14));
        let value = torrent.to_value();
        let info = value.get(b"info").unwrap();
        assert_eq!(info.get(b"length").and_then(Value::as_integer), Some(100));
        assert!(info.get(b"files").is_none());
        assert_eq!(torrent.info.total_size(), 100);
    }

    #[test]
    fn test_unknown_keys_preserved_in_info_hash() {
        let pieces = [7u8; 20];
        let mut data = b"d4:infod6:lengthi5e4:name1:x12:piece lengthi16384e6:pieces20:".to_vec();
        data.extend_from_slice(&pieces);
        data.extend_from_slice(b"6:source3:ABCee");

        let torrent = Torrent::from_bytes(&data).unwrap();
        assert_eq!(
            torrent.info.extra.get(b"source".as_slice()),
            Some(&Value::string("ABC"))
        );
        assert_eq!(torrent.to_bytes(), data);
        assert_eq!(torrent.info_hash(), info_hash(&data).unwrap());
    }

    #[test]
    fn test_rejects_invalid_metainfo() {
        let cases: [&[u8]; 6] = [
            b"le",
            b"d8:announce1:xe",
            b"d4:info3:abce",
            b"d4:infod6:lengthi5e4:name1:x12:piece lengthi16384e6:pieces3:abcee",
            b"d4:infod6:lengthi5e4:name1:x12:piece lengthi1000e6:pieces0:ee",
            b"d4:infod4:name1:x12:piece lengthi16384e6:pieces0:ee",
        ];
        for data in cases {
            assert!(
                Torrent::from_bytes(data).is_err(),
                "accepted {:?}",
                String::from_utf8_lossy(data)
            );
        }
    }

    #[test]
    fn test_rejects_bad_paths_and_counts() {
        let files = FileList::multi(vec![FileEntry::new([".."], 5)]);
        let bytes = Torrent::new(sample_info(files, 1 << 14)).to_bytes();
        assert!(matches!(
            Torrent::from_bytes(&bytes),
            Err(MetainfoError::Invalid {
                field: "info.files.path",
                ..
            })
        ));

        let mut info = sample_info(FileList::single("sample", 5), 1 << 14);
        info.pieces = PieceHashList::new(vec![PieceHash([0; 20]); 2]);
        let bytes = Torrent::new(info).to_bytes();
        assert!(matches!(
            Torrent::from_bytes(&bytes),
            Err(MetainfoError::Invalid {
                field: "info.pieces",
                ..
            })
        ));
    }

    #[test]
    fn test_read_refuses_large_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.torrent");
        let file = fs::File::create(&path).unwrap();
        file.set_len(MAX_TORRENT_FILE_SIZE + 1).unwrap();
        assert!(matches!(
            Torrent::read(&path),
            Err(crate::Error::Metainfo(MetainfoError::Invalid {
                field: "metainfo",
                ..
            }))
        ));
    }
}
