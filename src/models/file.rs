use std::path::{Path, PathBuf};

/// A file in the torrent's logical byte stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path segments relative to the content directory
    pub path: Vec<String>,
    /// File size in bytes
    pub len: u64,
}

impl FileEntry {
    pub fn new<I, S>(path: I, len: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into_iter().map(Into::into).collect(),
            len,
        }
    }

    /// Relative path using the platform separator
    pub fn relative_path(&self) -> PathBuf {
        self.path.iter().collect()
    }
}

/// How file entries map onto the content path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// The content path is the file itself
    SingleFile,
    /// The content path is a directory holding every entry
    MultiFile,
}

/// Ordered description of the files that make up a torrent.
///
/// Order is significant: it is the concatenation order of the logical stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileList {
    layout: Layout,
    entries: Vec<FileEntry>,
}

impl FileList {
    /// A single file named `name`
    pub fn single(name: impl Into<String>, len: u64) -> Self {
        Self {
            layout: Layout::SingleFile,
            entries: vec![FileEntry::new([name.into()], len)],
        }
    }

    /// Files inside a content directory, in stream order
    pub fn multi(entries: Vec<FileEntry>) -> Self {
        Self {
            layout: Layout::MultiFile,
            entries,
        }
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&FileEntry> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FileEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all entry sizes, or `None` if it does not fit in a `u64`
    pub fn total_len(&self) -> Option<u64> {
        self.entries
            .iter()
            .try_fold(0u64, |total, f| total.checked_add(f.len))
    }

    /// Where entry `index` lives on disk when the content is at `content_path`
    pub fn resolve(&self, content_path: &Path, index: usize) -> PathBuf {
        match (self.layout, self.entries.get(index)) {
            (Layout::MultiFile, Some(entry)) => content_path.join(entry.relative_path()),
            _ => content_path.to_path_buf(),
        }
    }
}

impl<'a> IntoIterator for &'a FileList {
    type Item = &'a FileEntry;
    type IntoIter = std::slice::Iter<'a, FileEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_paths() {
        let single = FileList::single("movie.mkv", 100);
        assert_eq!(
            single.resolve(Path::new("/data/renamed.mkv"), 0),
            PathBuf::from("/data/renamed.mkv")
        );

        let multi = FileList::multi(vec![
            FileEntry::new(["a.txt"], 1),
            FileEntry::new(["sub", "b.txt"], 2),
        ]);
        assert_eq!(multi.total_len(), Some(3));
        assert_eq!(
            multi.resolve(Path::new("/data/album"), 1),
            Path::new("/data/album").join("sub").join("b.txt")
        );
    }
}
