use anyhow::{Context, Result, bail};
use console::{Emoji, style};
use indicatif::HumanBytes;
use std::fs;

use piecework::cli::InspectArgs;
use piecework::config::{DIGEST_LEN, MAX_TORRENT_FILE_SIZE};
use piecework::models::{Torrent, info_hash, raw_pieces};

static INFO: Emoji<'_, '_> = Emoji("ℹ️ ", "i ");
static FILES: Emoji<'_, '_> = Emoji("📁 ", "f ");
static TRACKERS: Emoji<'_, '_> = Emoji("📡 ", "t ");

pub fn inspect_torrent(args: InspectArgs) -> Result<()> {
    let path = args.torrent;
    let size = fs::metadata(&path)
        .with_context(|| format!("Failed to read torrent file: {}", path.display()))?
        .len();
    if size > MAX_TORRENT_FILE_SIZE {
        bail!("{} is too large to be a torrent file ({} bytes)", path.display(), size);
    }
    let content = fs::read(&path)
        .with_context(|| format!("Failed to read torrent file: {}", path.display()))?;

    let torrent = Torrent::from_bytes(&content)
        .context("Failed to parse torrent file. Is it a valid bencoded file?")?;
    // Hashed from the raw bytes so keys this crate doesn't model still count
    let hash = info_hash(&content)?;
    let piece_count = raw_pieces(&content)?.len() / DIGEST_LEN;

    println!("{} {}", INFO, style("Torrent Metadata:").bold());
    println!("{:<15} {}", style("Name:").bold(), style(&torrent.info.name).cyan());

    if let Some(comment) = torrent.comment() {
        println!("{:<15} {}", style("Comment:").bold(), comment);
    }
    if let Some(created_by) = torrent.created_by() {
        println!("{:<15} {}", style("Created By:").bold(), created_by);
    }
    if let Some(date) = torrent.creation_date() {
        let datetime = chrono::DateTime::from_timestamp(date, 0)
            .map(|dt| dt.to_string())
            .unwrap_or_else(|| date.to_string());
        println!("{:<15} {}", style("Date:").bold(), datetime);
    }

    println!(
        "{:<15} {}",
        style("Total Size:").bold(),
        style(HumanBytes(torrent.info.total_size())).green()
    );
    println!(
        "{:<15} {}",
        style("Piece Size:").bold(),
        style(HumanBytes(torrent.info.piece_length)).yellow()
    );
    println!("{:<15} {}", style("Piece Count:").bold(), piece_count);
    println!(
        "{:<15} {}",
        style("Private:").bold(),
        if torrent.info.is_private() {
            style("yes").red()
        } else {
            style("no").dim()
        }
    );
    println!("{:<15} {}", style("Info Hash:").bold(), hex::encode(hash));

    let trackers: Vec<&str> = torrent
        .extra
        .get(b"announce-list".as_slice())
        .and_then(|list| list.as_list())
        .map(|tiers| {
            tiers
                .iter()
                .filter_map(|tier| tier.as_list())
                .flatten()
                .filter_map(|url| url.as_str())
                .collect()
        })
        .unwrap_or_else(|| torrent.announce().into_iter().collect());
    if !trackers.is_empty() {
        println!("\n{} {}", TRACKERS, style("Trackers:").bold());
        for tracker in trackers {
            println!("  - {}", style(tracker).underlined());
        }
    }

    println!("\n{} {}", FILES, style("Files:").bold());
    let files = &torrent.info.files;
    for file in files.iter().take(20) {
        println!(
            "  - {:<40} {}",
            file.path.join("/"),
            style(HumanBytes(file.len)).dim()
        );
    }
    if files.len() > 20 {
        println!("  ... and {} more files", style(files.len() - 20).dim());
    }

    Ok(())
}
