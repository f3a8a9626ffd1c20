use anyhow::{Result, bail};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::bencode::Value;
use crate::config::DEFAULT_PROGRESS_INTERVAL;
use crate::hashing::{HashOutcome, PieceHasher};
use crate::models::{FileList, Info, Layout, Torrent, TorrentOptions};
use crate::piece::{PieceHashList, PieceSpec, piece_size_from_exponent};
use crate::scanner::scan_files;
use crate::stream::VirtualFileStream;

/// Everything `build` decides before hashing
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub name: String,
    pub content_path: PathBuf,
    pub files: FileList,
    pub piece_spec: PieceSpec,
    pub total_size: u64,
}

/// Builder for creating torrent files
pub struct TorrentBuilder {
    source: PathBuf,
    output_file: Option<PathBuf>,
    options: TorrentOptions,
    show_progress: bool,
    num_threads: usize,
    progress_interval: Duration,
}

impl TorrentBuilder {
    /// Create a new TorrentBuilder
    pub fn new(source: PathBuf, options: TorrentOptions) -> Self {
        Self {
            source,
            output_file: None,
            options,
            show_progress: false,
            num_threads: num_cpus::get(),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    /// Set the output file path for exclusion from scanning
    pub fn with_output_file(mut self, output: PathBuf) -> Self {
        self.output_file = Some(output);
        self
    }

    /// Enable progress bar
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.show_progress = progress;
        self
    }

    /// Set the number of threads for hashing
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Use the requested exponent, or pick a piece size from the total size
    fn piece_spec(&self, total_size: u64) -> Result<PieceSpec> {
        match self.options.piece_length {
            Some(power) => {
                let size = piece_size_from_exponent(power)?;
                Ok(PieceSpec::new(size, total_size)?)
            }
            None => Ok(PieceSpec::for_total_size(total_size)),
        }
    }

    /// Scan files and settle the name and piece size without hashing
    pub fn plan(&self) -> Result<BuildPlan> {
        let scan = scan_files(&self.source, self.output_file.as_deref())?;
        let Some(total_size) = scan.files.total_len() else {
            bail!("Total size of {} does not fit in 64 bits", scan.content_path.display());
        };
        if total_size == 0 {
            bail!("Nothing to hash: all files in {} are empty", scan.content_path.display());
        }

        let name = self.options.name.clone().unwrap_or(scan.name);
        let files = match scan.files.layout() {
            Layout::SingleFile => FileList::single(name.clone(), total_size),
            Layout::MultiFile => scan.files,
        };

        Ok(BuildPlan {
            piece_spec: self.piece_spec(total_size)?,
            total_size,
            name,
            content_path: scan.content_path,
            files,
        })
    }

    /// Build the torrent metadata
    pub fn build(self) -> Result<Torrent> {
        let plan = self.plan()?;
        info!(
            name = %plan.name,
            files = plan.files.len(),
            bytes = plan.total_size,
            piece_size = plan.piece_spec.piece_size(),
            pieces = plan.piece_spec.piece_count(),
            threads = self.num_threads,
            "building torrent"
        );

        let stream = VirtualFileStream::new(
            plan.files.clone(),
            plan.piece_spec.piece_size(),
            &plan.content_path,
        )?;
        let pieces = self.hash_content(&stream)?;
        Ok(self.build_torrent(plan, pieces))
    }

    fn hash_content(&self, stream: &VirtualFileStream) -> Result<PieceHashList> {
        let pb = if self.show_progress {
            let pb = ProgressBar::new(stream.total_size());
            pb.set_draw_target(ProgressDrawTarget::stderr_with_hz(10));
            pb.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} [{elapsed_precise}] {bar:40.202/94} {bytes}/{total_bytes} ({eta}) {msg}",
                )?
                .progress_chars("█▓▒░"),
            );
            pb.set_message("Hashing...");
            Some(pb)
        } else {
            None
        };

        let hasher = PieceHasher::new()
            .with_workers(self.num_threads)
            .with_interval(self.progress_interval);
        let piece_size = stream.piece_size();
        let total_size = stream.total_size();
        let outcome = hasher.hash_with_progress(stream, |progress| {
            if let Some(pb) = &pb {
                pb.set_position((progress.pieces_done * piece_size).min(total_size));
                pb.set_message(progress.file.path.join("/"));
            }
            ControlFlow::Continue(())
        })?;

        match outcome {
            HashOutcome::Complete(pieces) => {
                if let Some(pb) = pb {
                    pb.finish_with_message("Hashing complete");
                }
                Ok(pieces)
            }
            HashOutcome::Cancelled { pieces_done } => {
                bail!("Hashing cancelled after {} pieces", pieces_done)
            }
            HashOutcome::Failed(failure) => {
                if let Some(pb) = pb {
                    pb.abandon_with_message("Hashing failed");
                }
                let first = failure
                    .errors
                    .first()
                    .map(|e| e.to_string())
                    .unwrap_or_default();
                Err(anyhow::Error::new(failure)
                    .context(format!("Failed to read source files ({})", first)))
            }
        }
    }

    fn build_torrent(&self, plan: BuildPlan, pieces: PieceHashList) -> Torrent {
        let mut info = Info {
            name: plan.name,
            piece_length: plan.piece_spec.piece_size(),
            pieces,
            files: plan.files,
            extra: BTreeMap::new(),
        };
        if self.options.private {
            info.extra.insert(b"private".to_vec(), Value::Integer(1));
        }

        let mut torrent = Torrent::new(info);
        let extra = &mut torrent.extra;

        // Each -a value is one tier; commas separate backup trackers within it
        let tiers: Vec<Vec<String>> = self
            .options
            .announce
            .iter()
            .map(|tier| {
                tier.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|tier| !tier.is_empty())
            .collect();

        if let Some(first) = tiers.first().and_then(|tier| tier.first()) {
            extra.insert(b"announce".to_vec(), first.as_str().into());
        }
        // A single tracker doesn't need announce-list
        if tiers.len() > 1 || tiers.first().is_some_and(|tier| tier.len() > 1) {
            let list = tiers
                .iter()
                .map(|tier| Value::List(tier.iter().map(|s| s.as_str().into()).collect()))
                .collect::<Vec<_>>();
            extra.insert(b"announce-list".to_vec(), Value::List(list));
        }

        if let Some(comment) = &self.options.comment {
            extra.insert(b"comment".to_vec(), comment.as_str().into());
        }
        extra.insert(
            b"created by".to_vec(),
            format!("piecework {}", env!("CARGO_PKG_VERSION")).into(),
        );

        let creation_date = if self.options.no_date {
            None
        } else if let Some(timestamp) = self.options.creation_date {
            Some(timestamp)
        } else {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .ok()
                .map(|d| d.as_secs() as i64)
        };
        if let Some(date) = creation_date {
            extra.insert(b"creation date".to_vec(), Value::Integer(date));
        }

        debug!(info_hash = %torrent.info_hash_hex(), "torrent assembled");
        torrent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_explicit_piece_length() {
        let options = TorrentOptions {
            piece_length: Some(18),
            ..Default::default()
        };
        let builder = TorrentBuilder::new(PathBuf::from("."), options);
        let spec = builder.piece_spec(1_000_000).unwrap();
        assert_eq!(spec.piece_size(), 1 << 18);
        assert_eq!(spec.piece_count(), 4);

        let options = TorrentOptions {
            piece_length: Some(30),
            ..Default::default()
        };
        let builder = TorrentBuilder::new(PathBuf::from("."), options);
        assert!(builder.piece_spec(1_000_000).is_err());
    }

    #[test]
    fn test_plan_renames_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        fs::write(&path, vec![1u8; 5000]).unwrap();

        let options = TorrentOptions {
            name: Some("renamed.bin".to_string()),
            ..Default::default()
        };
        let plan = TorrentBuilder::new(path, options).plan().unwrap();
        assert_eq!(plan.name, "renamed.bin");
        assert_eq!(plan.files, FileList::single("renamed.bin", 5000));
        assert_eq!(plan.piece_spec.piece_size(), 1 << 15);
    }

    #[test]
    fn test_announce_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        fs::write(&path, b"hello").unwrap();

        let options = TorrentOptions {
            announce: vec!["http://a/1, http://a/2".to_string(), "http://b".to_string()],
            comment: Some("hi".to_string()),
            private: true,
            no_date: true,
            ..Default::default()
        };
        let torrent = TorrentBuilder::new(path, options)
            .with_threads(1)
            .build()
            .unwrap();

        assert_eq!(torrent.announce(), Some("http://a/1"));
        let list = torrent.extra.get(b"announce-list".as_slice()).unwrap();
        assert_eq!(list.as_list().map(<[Value]>::len), Some(2));
        assert_eq!(torrent.comment(), Some("hi"));
        assert!(torrent.info.is_private());
        assert_eq!(torrent.creation_date(), None);
        assert!(torrent.created_by().unwrap().starts_with("piecework "));
    }
}
