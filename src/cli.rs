use clap::{Args, Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

use crate::models::TorrentOptions;

#[derive(Parser, Debug)]
#[command(
    name = "piecework",
    version,
    about = "Create and verify BitTorrent metainfo files",
    author = "piecework contributors"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a torrent from a file or directory (the default command)
    Create(CreateArgs),
    /// Check content on disk against a torrent's piece hashes
    Verify(VerifyArgs),
    /// Print the contents of a torrent file
    Inspect(InspectArgs),
}

impl Command {
    pub fn verbose(&self) -> bool {
        match self {
            Command::Create(args) => args.verbose,
            Command::Verify(args) => args.verbose,
            Command::Inspect(_) => false,
        }
    }
}

const SUBCOMMANDS: [&str; 4] = ["create", "verify", "inspect", "help"];

impl Cli {
    /// Parse arguments, treating `piecework <SOURCE> ...` as `piecework create <SOURCE> ...`
    pub fn parse_args() -> Self {
        Self::parse_from(with_default_command(std::env::args_os()))
    }
}

/// Insert `create` when the first argument is neither a subcommand nor a flag
pub fn with_default_command<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut args: Vec<OsString> = args.into_iter().collect();
    let implicit = args.get(1).is_some_and(|first| {
        let first = first.to_string_lossy();
        !first.starts_with('-') && !SUBCOMMANDS.contains(&first.as_ref())
    });
    if implicit {
        args.insert(1, OsString::from("create"));
    }
    args
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// The file or directory to create a torrent from
    #[arg(value_name = "TARGET")]
    pub source: PathBuf,

    /// Announce URL(s) - can be specified multiple times for backup trackers
    #[arg(short = 'a', long = "announce", value_name = "URL")]
    pub announce: Vec<String>,

    /// Add a comment to the metainfo
    #[arg(short = 'c', long = "comment", value_name = "COMMENT")]
    pub comment: Option<String>,

    /// Don't write the creation date
    #[arg(short = 'd', long = "no-date")]
    pub no_date: bool,

    /// Overwrite output file if it exists
    #[arg(short = 'f', long = "force")]
    pub force: bool,

    /// Set the piece length to 2^N bytes (e.g., 18 for 256KB)
    #[arg(short = 'l', long = "piece-length", value_name = "N")]
    pub piece_length: Option<u32>,

    /// Set the name of the torrent (defaults to basename of target)
    #[arg(short = 'n', long = "name", value_name = "NAME")]
    pub name: Option<String>,

    /// Set the output file path (defaults to <name>.torrent)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Set the private flag
    #[arg(short = 'p', long = "private")]
    pub private: bool,

    /// Number of threads for hashing (defaults to number of CPU cores)
    #[arg(short = 't', long = "threads", value_name = "N")]
    pub threads: Option<usize>,

    /// Scan files and report the piece layout without hashing
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Print a JSON summary to stdout
    #[arg(long = "json")]
    pub json: bool,

    /// Verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl CreateArgs {
    /// Convert CLI arguments to TorrentOptions
    pub fn to_options(&self) -> TorrentOptions {
        TorrentOptions {
            piece_length: self.piece_length,
            private: self.private,
            comment: self.comment.clone(),
            announce: self.announce.clone(),
            no_date: self.no_date,
            creation_date: None,
            name: self.name.clone(),
        }
    }
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// The torrent file to verify against
    #[arg(value_name = "TORRENT")]
    pub torrent: PathBuf,

    /// Content location (defaults to ./<name>)
    #[arg(long = "path", value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// Number of threads for hashing (defaults to number of CPU cores)
    #[arg(short = 't', long = "threads", value_name = "N")]
    pub threads: Option<usize>,

    /// Verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// The torrent file to inspect
    #[arg(value_name = "TORRENT")]
    pub torrent: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn test_implicit_create() {
        let parsed = with_default_command(args(&["piecework", "file.txt", "-o", "x.torrent"]));
        assert_eq!(parsed, args(&["piecework", "create", "file.txt", "-o", "x.torrent"]));

        let cli = Cli::parse_from(parsed);
        let Command::Create(create) = cli.command else {
            panic!("expected create");
        };
        assert_eq!(create.source, PathBuf::from("file.txt"));
        assert_eq!(create.output, Some(PathBuf::from("x.torrent")));
    }

    #[test]
    fn test_explicit_commands_untouched() {
        for list in [
            &["piecework", "verify", "a.torrent"][..],
            &["piecework", "--help"],
            &["piecework"],
        ] {
            assert_eq!(with_default_command(args(list)), args(list));
        }
    }
}
