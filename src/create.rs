use anyhow::{Context, Result};
use console::{Emoji, style};
use indicatif::HumanBytes;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use piecework::TorrentBuilder;
use piecework::builder::BuildPlan;
use piecework::cli::CreateArgs;
use piecework::config::Settings;
use piecework::models::Torrent;

static DRY_RUN: Emoji<'_, '_> = Emoji("🏃 ", "DRY-RUN ");
static CHECK: Emoji<'_, '_> = Emoji("✅ ", "OK ");
static FILES: Emoji<'_, '_> = Emoji("📁 ", "f ");

#[derive(Serialize)]
struct Summary<'a> {
    name: &'a str,
    info_hash: String,
    total_size: u64,
    piece_length: u64,
    pieces: usize,
    files: usize,
    output: &'a Path,
}

pub fn create_torrent(args: CreateArgs, settings: &Settings) -> Result<()> {
    // Determine output file path
    let output_path = args.output.clone().unwrap_or_else(|| {
        let name = args.name.clone().unwrap_or_else(|| {
            args.source
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("output")
                .to_string()
        });
        PathBuf::from(format!("{}.torrent", name))
    });

    let mut options = args.to_options();
    options.piece_length = options.piece_length.or(settings.piece_length);

    let mut builder = TorrentBuilder::new(args.source.clone(), options)
        .with_output_file(output_path.clone())
        .with_progress(!args.json && console::Term::stderr().is_term())
        .with_progress_interval(settings.progress_interval());
    if let Some(t) = args.threads.or(settings.threads) {
        builder = builder.with_threads(t);
    }

    if args.dry_run {
        eprintln!("{} {}", DRY_RUN, style("Dry run: scanning files...").bold());
        let plan = builder.plan()?;
        print_plan(&plan, args.verbose);
        return Ok(());
    }

    let torrent = builder.build()?;
    write_torrent(&torrent, &output_path, args.force)?;

    if args.json {
        let summary = Summary {
            name: &torrent.info.name,
            info_hash: torrent.info_hash_hex(),
            total_size: torrent.info.total_size(),
            piece_length: torrent.info.piece_length,
            pieces: torrent.info.pieces.len(),
            files: torrent.info.files.len(),
            output: &output_path,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?
        );
    }
    eprintln!("Created: {}", output_path.display());

    Ok(())
}

fn write_torrent(torrent: &Torrent, output_path: &Path, force: bool) -> Result<()> {
    let data = torrent.to_bytes();

    let mut output_file = if force {
        File::create(output_path).context("Failed to create output file")?
    } else {
        File::options()
            .write(true)
            .create_new(true)
            .open(output_path)
            .with_context(|| {
                format!(
                    "Failed to create output file (use -f to overwrite): {}",
                    output_path.display()
                )
            })?
    };

    output_file
        .write_all(&data)
        .context("Failed to write torrent file")
}

fn print_plan(plan: &BuildPlan, verbose: bool) {
    let spec = plan.piece_spec;

    eprintln!();
    eprintln!("{} {}", CHECK, style("Dry Run Results:").bold().underlined());
    eprintln!("{:<15} {}", style("Name:").bold(), style(&plan.name).cyan());
    eprintln!(
        "{:<15} {}",
        style("Total Size:").bold(),
        style(HumanBytes(plan.total_size)).green()
    );
    eprintln!("{:<15} {}", style("File Count:").bold(), plan.files.len());
    eprintln!(
        "{:<15} {} (2^{})",
        style("Piece Length:").bold(),
        style(HumanBytes(spec.piece_size())).yellow(),
        spec.exponent()
    );
    eprintln!("{:<15} {}", style("Piece Count:").bold(), spec.piece_count());

    if verbose {
        eprintln!(
            "\n{} {}",
            FILES,
            style("Files that would be included:").bold()
        );
        for file in plan.files.iter().take(20) {
            eprintln!(
                "  - {:<40} {}",
                file.path.join("/"),
                style(HumanBytes(file.len)).dim()
            );
        }
        if plan.files.len() > 20 {
            eprintln!("  ... and {} more", style(plan.files.len() - 20).dim());
        }
    }
}
