use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Length of a SHA-1 piece digest
pub const DIGEST_LEN: usize = 20;

/// Kibibyte constant for piece size bounds
pub const KIB: u64 = 1024;

/// Megabyte constant for piece length calculations
pub const MB: u64 = 1_048_576;

/// Smallest piece size accepted in metainfo (16 KiB)
pub const PIECE_SIZE_MIN: u64 = 16 * KIB;

/// Largest piece size accepted in metainfo (64 MiB)
pub const PIECE_SIZE_MAX: u64 = 64 * MB;

/// Exponent bounds matching `PIECE_SIZE_MIN` and `PIECE_SIZE_MAX`
pub const PIECE_EXP_MIN: u32 = 14;
pub const PIECE_EXP_MAX: u32 = 26;

/// Piece length thresholds for automatic calculation
/// Maps total size to piece length power (2^N)
pub const PIECE_LENGTH_THRESHOLDS: [(u64, u32); 9] = [
    (50 * MB, 15),    // <=50MB   -> 2^15 (32 KB)
    (100 * MB, 16),   // <=100MB  -> 2^16 (64 KB)
    (200 * MB, 17),   // <=200MB  -> 2^17 (128 KB)
    (400 * MB, 18),   // <=400MB  -> 2^18 (256 KB)
    (800 * MB, 19),   // <=800MB  -> 2^19 (512 KB)
    (1600 * MB, 20),  // <=1.6GB  -> 2^20 (1 MB)
    (3200 * MB, 21),  // <=3.2GB  -> 2^21 (2 MB)
    (6400 * MB, 22),  // <=6.4GB  -> 2^22 (4 MB)
    (12800 * MB, 23), // <=12.8GB -> 2^23 (8 MB)
];

/// Default minimum time between two progress reports
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Torrent files larger than this are refused before decoding (10 MB)
pub const MAX_TORRENT_FILE_SIZE: u64 = 10_000_000;

/// Completion queue slots per hashing worker
pub const QUEUE_DEPTH_PER_WORKER: usize = 4;

/// Optional user settings read from `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Number of hashing workers (defaults to number of CPU cores)
    pub threads: Option<usize>,
    /// Minimum milliseconds between progress updates
    pub progress_interval_ms: Option<u64>,
    /// Default piece length exponent for `create`
    pub piece_length: Option<u32>,
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid settings in {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl Settings {
    /// Location of the settings file in the platform config directory
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "piecework")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load settings from the default location; a missing file yields defaults
    pub fn load() -> Result<Self, SettingsError> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(SettingsError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        toml::from_str(&text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn progress_interval(&self) -> Duration {
        self.progress_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_PROGRESS_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_settings() {
        let settings: Settings =
            toml::from_str("threads = 3\nprogress_interval_ms = 250\npiece_length = 18\n").unwrap();
        assert_eq!(settings.threads, Some(3));
        assert_eq!(settings.progress_interval(), Duration::from_millis(250));
        assert_eq!(settings.piece_length, Some(18));
    }

    #[test]
    fn test_missing_settings_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.progress_interval(), DEFAULT_PROGRESS_INTERVAL);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "threads = 2\ncolour = true\n").unwrap();
        assert!(matches!(
            Settings::load_from(&path),
            Err(SettingsError::Parse { .. })
        ));
    }
}
