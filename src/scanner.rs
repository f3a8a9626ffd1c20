use anyhow::{Context, Result, bail};
use jwalk::WalkDir;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::models::{FileEntry, FileList};

/// Files found under a source path
#[derive(Debug, Clone)]
pub struct Scan {
    /// Basename of the source, used as the torrent name
    pub name: String,
    /// Canonical source path; the content path of the resulting stream
    pub content_path: PathBuf,
    pub files: FileList,
}

/// Scans the source path and collects file information
pub fn scan_files(source: &Path, output_file: Option<&Path>) -> Result<Scan> {
    let source = source
        .canonicalize()
        .with_context(|| format!("Failed to resolve source path: {}", source.display()))?;
    let name = source
        .file_name()
        .context("Source path has no file name")?
        .to_string_lossy()
        .into_owned();

    if source.is_file() {
        let len = source
            .metadata()
            .context("Failed to read file metadata")?
            .len();
        debug!(path = %source.display(), len, "single file");
        return Ok(Scan {
            files: FileList::single(name.clone(), len),
            name,
            content_path: source,
        });
    }

    let output_canonical = output_file.and_then(|p| p.canonicalize().ok());
    let mut entries = Vec::new();

    // jwalk traverses in parallel; order is fixed by the sort below
    for entry in WalkDir::new(&source) {
        let entry = entry.context("Failed to read directory entry")?;
        if entry.file_type().is_dir() {
            continue;
        }
        let entry_path = entry.path();

        // Skip the output file if it's inside the source directory
        if output_canonical.as_deref() == Some(entry_path.as_path()) {
            debug!(path = %entry_path.display(), "skipping output file");
            continue;
        }

        let relative_path = entry_path
            .strip_prefix(&source)
            .context("Failed to create relative path")?;
        let len = entry
            .metadata()
            .with_context(|| format!("Failed to read metadata: {}", entry_path.display()))?
            .len();

        debug!(path = %relative_path.display(), len, "found file");
        entries.push(FileEntry {
            path: relative_path
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect(),
            len,
        });
    }

    if entries.is_empty() {
        bail!("No files found in {}", source.display());
    }

    // Sort files by path (critical for consistent info hash)
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(files = entries.len(), "scan complete");

    Ok(Scan {
        name,
        content_path: source,
        files: FileList::multi(entries),
    })
}
