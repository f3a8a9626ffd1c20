use anyhow::{Context, Result, anyhow};
use console::{Emoji, style};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::ops::ControlFlow;

use piecework::Verifier;
use piecework::cli::VerifyArgs;
use piecework::config::Settings;
use piecework::models::Torrent;
use piecework::verify::{VerifyReport, VerifyStatus};

static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "OK");
static ERROR: Emoji<'_, '_> = Emoji("❌ ", "ERR");
static WARN: Emoji<'_, '_> = Emoji("⚠️ ", "WARN");

/// Errors listed per category before the rest are summarised
const MAX_LISTED: usize = 20;

pub fn verify_torrent(args: VerifyArgs, settings: &Settings) -> Result<()> {
    let torrent = Torrent::read(&args.torrent)
        .with_context(|| format!("Failed to read torrent file: {}", args.torrent.display()))?;

    // Without --path the content is expected at ./<name>
    let content_root = match args.path {
        Some(path) => path,
        None => std::env::current_dir()?.join(&torrent.info.name),
    };

    println!("Verifying torrent: {}", style(&torrent.info.name).bold());
    println!("Content path: {}", style(content_root.display()).cyan());

    let stream = torrent.stream(&content_root)?;

    let mut verifier = Verifier::new().with_interval(settings.progress_interval());
    if let Some(t) = args.threads.or(settings.threads) {
        verifier = verifier.with_workers(t);
    }

    let pb = ProgressBar::new(stream.piece_count());
    pb.set_draw_target(ProgressDrawTarget::stderr_with_hz(10));
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} pieces {msg}",
        )?
        .progress_chars("#>- "),
    );

    let report = verifier.verify_with_progress(&stream, &torrent.info.pieces, |progress| {
        pb.set_length(progress.pieces_total);
        pb.set_position(progress.pieces_done);
        pb.set_message(progress.file.path.join("/"));
        ControlFlow::Continue(())
    })?;
    pb.finish_and_clear();

    print_report(&report);

    match report.status() {
        VerifyStatus::Passed => {
            println!(
                "\n{} {}",
                SUCCESS,
                style("Verification Successful!").green().bold()
            );
            Ok(())
        }
        VerifyStatus::Failed => {
            println!("\n{} {}", ERROR, style("Verification Failed!").red().bold());
            Err(anyhow!("Verification failed"))
        }
        VerifyStatus::Cancelled => Err(anyhow!("Verification cancelled")),
    }
}

fn print_report(report: &VerifyReport) {
    if report.file_errors.is_empty() {
        println!("{} All files found and sizes match.", SUCCESS);
    } else {
        println!("{} {} file problem(s):", WARN, report.file_errors.len());
        for error in report.file_errors.iter().take(MAX_LISTED) {
            println!("  {} {}", ERROR, error);
        }
        if report.file_errors.len() > MAX_LISTED {
            println!("  ... and {} more", report.file_errors.len() - MAX_LISTED);
        }
    }

    if !report.content_errors.is_empty() {
        println!(
            "{} {} pieces corrupt out of {}",
            WARN,
            report.content_errors.len(),
            report.pieces_total
        );
        for mismatch in report.content_errors.iter().take(MAX_LISTED) {
            println!("  {} {}", ERROR, mismatch);
        }
        if report.content_errors.len() > MAX_LISTED {
            println!("  ... and {} more", report.content_errors.len() - MAX_LISTED);
        }
    }

    for error in report.read_errors.iter().take(MAX_LISTED) {
        println!("  {} {}", ERROR, error);
    }

    println!(
        "Checked {} of {} pieces ({} skipped)",
        report.pieces_checked,
        report.pieces_total,
        report.pieces_skipped
    );
}
