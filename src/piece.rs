use sha1::{Digest, Sha1};
use std::fmt;

use crate::config::{
    DIGEST_LEN, PIECE_EXP_MAX, PIECE_EXP_MIN, PIECE_LENGTH_THRESHOLDS, PIECE_SIZE_MAX,
    PIECE_SIZE_MIN,
};
use crate::error::{MetainfoError, PieceSizeError};

/// Calculate optimal piece length based on total size
pub fn calculate_piece_length(total_size: u64) -> u32 {
    // Find the appropriate piece length based on total size
    for (max_size, power) in PIECE_LENGTH_THRESHOLDS.iter() {
        if total_size <= *max_size {
            return *power;
        }
    }

    // For very large torrents (>12.8GB), use 8 MB pieces (2^23)
    23
}

/// Calculate the number of pieces for a given total size and piece length
pub fn piece_count(total_size: u64, piece_length: u64) -> u64 {
    total_size.div_ceil(piece_length)
}

/// Check that `size` is a power of two within the accepted bounds
pub fn validate_piece_size(size: u64) -> Result<u64, PieceSizeError> {
    if !size.is_power_of_two() {
        return Err(PieceSizeError::NotPowerOfTwo(size));
    }
    if !(PIECE_SIZE_MIN..=PIECE_SIZE_MAX).contains(&size) {
        return Err(PieceSizeError::OutOfRange {
            size,
            min: PIECE_SIZE_MIN,
            max: PIECE_SIZE_MAX,
        });
    }
    Ok(size)
}

/// Piece size for a `2^exp` exponent as given on the command line
pub fn piece_size_from_exponent(exp: u32) -> Result<u64, PieceSizeError> {
    if !(PIECE_EXP_MIN..=PIECE_EXP_MAX).contains(&exp) {
        return Err(PieceSizeError::ExponentOutOfRange {
            exp,
            min: PIECE_EXP_MIN,
            max: PIECE_EXP_MAX,
        });
    }
    Ok(1u64 << exp)
}

/// Validated piece size plus the piece count it yields for a total size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceSpec {
    piece_size: u64,
    piece_count: u64,
}

impl PieceSpec {
    pub fn new(piece_size: u64, total_size: u64) -> Result<Self, PieceSizeError> {
        let piece_size = validate_piece_size(piece_size)?;
        Ok(Self {
            piece_size,
            piece_count: piece_count(total_size, piece_size),
        })
    }

    /// Pick the piece size automatically from the total size
    pub fn for_total_size(total_size: u64) -> Self {
        let exp = calculate_piece_length(total_size).clamp(PIECE_EXP_MIN, PIECE_EXP_MAX);
        let piece_size = 1u64 << exp;
        Self {
            piece_size,
            piece_count: piece_count(total_size, piece_size),
        }
    }

    pub fn piece_size(&self) -> u64 {
        self.piece_size
    }

    pub fn piece_count(&self) -> u64 {
        self.piece_count
    }

    pub fn exponent(&self) -> u32 {
        self.piece_size.trailing_zeros()
    }
}

/// SHA-1 digest of one piece
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PieceHash(pub [u8; DIGEST_LEN]);

impl PieceHash {
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }
}

impl fmt::Display for PieceHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for PieceHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PieceHash({})", self)
    }
}

impl From<[u8; DIGEST_LEN]> for PieceHash {
    fn from(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }
}

/// Piece hashes in piece-index order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PieceHashList(Vec<PieceHash>);

impl PieceHashList {
    pub fn new(hashes: Vec<PieceHash>) -> Self {
        Self(hashes)
    }

    /// Split the concatenated `pieces` string of a metainfo file
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MetainfoError> {
        if bytes.len() % DIGEST_LEN != 0 {
            return Err(MetainfoError::Invalid {
                field: "info.pieces",
                reason: format!("length {} is not divisible by {}", bytes.len(), DIGEST_LEN),
            });
        }
        let hashes = bytes
            .chunks_exact(DIGEST_LEN)
            .map(|chunk| {
                let mut digest = [0u8; DIGEST_LEN];
                digest.copy_from_slice(chunk);
                PieceHash(digest)
            })
            .collect();
        Ok(Self(hashes))
    }

    /// Concatenation of all digests, as stored in `info.pieces`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.0.len() * DIGEST_LEN);
        for hash in &self.0 {
            bytes.extend_from_slice(&hash.0);
        }
        bytes
    }

    pub fn get(&self, index: u64) -> Option<&PieceHash> {
        usize::try_from(index).ok().and_then(|i| self.0.get(i))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PieceHash> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[PieceHash] {
        &self.0
    }
}

impl From<Vec<PieceHash>> for PieceHashList {
    fn from(hashes: Vec<PieceHash>) -> Self {
        Self(hashes)
    }
}

impl FromIterator<PieceHash> for PieceHashList {
    fn from_iter<I: IntoIterator<Item = PieceHash>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MB;

    #[test]
    fn test_calculate_piece_length() {
        // Test boundaries
        assert_eq!(calculate_piece_length(0), 15);
        assert_eq!(calculate_piece_length(50 * MB), 15);
        assert_eq!(calculate_piece_length(50 * MB + 1), 16);

        assert_eq!(calculate_piece_length(100 * MB), 16);
        assert_eq!(calculate_piece_length(100 * MB + 1), 17);

        assert_eq!(calculate_piece_length(12800 * MB), 23);
        assert_eq!(calculate_piece_length(12800 * MB + 1), 23);
        assert_eq!(calculate_piece_length(20000 * MB), 23);
    }

    #[test]
    fn test_piece_count() {
        assert_eq!(piece_count(0, 1024), 0);
        assert_eq!(piece_count(100, 100), 1);
        assert_eq!(piece_count(101, 100), 2);
        assert_eq!(piece_count(35, 16), 3);
        assert_eq!(piece_count(2049, 1024), 3);
    }

    #[test]
    fn test_validate_piece_size() {
        assert_eq!(validate_piece_size(16 * 1024), Ok(16 * 1024));
        assert_eq!(validate_piece_size(64 * MB), Ok(64 * MB));
        assert_eq!(
            validate_piece_size(3 * 16 * 1024),
            Err(PieceSizeError::NotPowerOfTwo(3 * 16 * 1024))
        );
        assert!(matches!(
            validate_piece_size(8 * 1024),
            Err(PieceSizeError::OutOfRange { .. })
        ));
        assert!(matches!(
            validate_piece_size(128 * MB),
            Err(PieceSizeError::OutOfRange { .. })
        ));
        assert!(validate_piece_size(0).is_err());
    }

    #[test]
    fn test_piece_spec() {
        let spec = PieceSpec::new(1 << 15, 100_000).unwrap();
        assert_eq!(spec.piece_count(), 4);
        assert_eq!(spec.exponent(), 15);

        let auto = PieceSpec::for_total_size(60 * MB);
        assert_eq!(auto.piece_size(), 1 << 16);
        assert!(piece_size_from_exponent(13).is_err());
        assert_eq!(piece_size_from_exponent(18), Ok(262144));
    }

    #[test]
    fn test_hash_list_bytes() {
        let a = PieceHash::digest(b"a");
        let b = PieceHash::digest(b"b");
        let list = PieceHashList::new(vec![a, b]);
        let bytes = list.to_bytes();
        assert_eq!(bytes.len(), 40);
        assert_eq!(&bytes[..20], a.as_bytes());
        assert_eq!(PieceHashList::from_bytes(&bytes).unwrap(), list);
        assert!(PieceHashList::from_bytes(&bytes[..39]).is_err());
        assert_eq!(
            a.to_string(),
            "86f7e437faa5a7fce15d1ddcb9eaeaea377667b8"
        );
    }
}
