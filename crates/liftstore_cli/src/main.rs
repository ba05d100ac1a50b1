//! CLI smoke entry point.
//!
//! # Responsibility
//! - Open a LIFT file through `liftstore_core` and print a short summary.
//! - With `--json`, dump every entry as JSON for quick inspection.

use clap::Parser;
use liftstore_core::{EntryRepository, LiftEntryRepository, LoggingConfig};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "liftstore_cli")]
#[command(about = "Inspect a LIFT lexicon file", version)]
struct Cli {
    /// LIFT file to open.
    path: PathBuf,

    /// Print every entry as JSON instead of a summary.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = liftstore_core::init_logging(&LoggingConfig::default()) {
        eprintln!("logging disabled: {err}");
    }

    match run(&cli.path, cli.json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("liftstore_cli: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(path: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let repo = LiftEntryRepository::load(path)?;
    let entries = repo.get_all()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        println!("liftstore_core version={}", liftstore_core::core_version());
        println!("file={}", repo.path().display());
        println!("entries={}", entries.len());
        println!("last_modified={}", repo.last_modified()?.to_rfc3339());
    }
    repo.dispose();
    Ok(())
}
