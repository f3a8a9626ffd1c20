use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use piecework::cli::{Cli, Command};
use piecework::config::Settings;

mod check;
mod create;
mod inspect;

fn init_logging(verbose: bool) {
    let default = if verbose { "piecework=debug" } else { "piecework=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.command.verbose());

    let settings = Settings::load().context("Failed to load settings")?;

    match cli.command {
        Command::Create(args) => create::create_torrent(args, &settings),
        Command::Verify(args) => check::verify_torrent(args, &settings),
        Command::Inspect(args) => inspect::inspect_torrent(args),
    }
}
