mod file;
mod torrent;

pub use file::{FileEntry, FileList, Layout};
pub use torrent::{Info, Torrent, TorrentOptions, info_hash, raw_pieces};
