//! Scan command - generate or refresh a game's manifest.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use console::style;
use frost::config::format_size;
use frost::manifest::{DirectoryLibrary, HeedManifestStore, ManifestChange, ManifestService};

use crate::error::CliError;
use crate::runner::CliRunner;

/// Run the scan command.
pub fn run(game_id: u64, library: Option<PathBuf>, verbose: bool) -> Result<(), CliError> {
    let runner = CliRunner::new(verbose)?;
    runner.log_startup("scan");
    let config = runner.config();

    let library_root = library
        .or_else(|| config.server.library_root.clone())
        .ok_or_else(|| {
            CliError::Config(
                "No library configured. Set server.library_root or use --library.".to_string(),
            )
        })?;

    let store = HeedManifestStore::open(&config.server.manifest_db)?;
    let service = ManifestService::new(
        Arc::new(DirectoryLibrary::new(&library_root)),
        Arc::new(store),
    );

    let started = Instant::now();
    let outcome = service.refresh(game_id)?;
    let manifest = &outcome.manifest;

    println!("Game {} (manifest #{})", game_id, manifest.id);
    println!("  Files:  {}", manifest.files.len());
    println!("  Size:   {}", format_size(manifest.total_size));
    println!(
        "  Hashed: {} ({} reused) in {:.1?}",
        outcome.hashed,
        outcome.reused,
        started.elapsed()
    );
    println!();

    if outcome.is_unchanged() {
        println!("No changes.");
        return Ok(());
    }

    for change in &outcome.changes {
        let marker = match change {
            ManifestChange::Added(_) => style("+").green(),
            ManifestChange::Modified(_) => style("~").yellow(),
            ManifestChange::Removed(_) => style("-").red(),
        };
        println!("  {} {}", marker, change.rel_path());
    }

    Ok(())
}
