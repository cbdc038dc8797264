//! Progress command - inspect the chunk store of a download folder.

use std::path::Path;

use console::style;
use frost::config::format_size;
use frost::store::{ChunkStore, HeedChunkStore, CACHE_DIR};

use crate::error::CliError;

/// Run the progress command.
pub fn run(folder: &Path, json: bool) -> Result<(), CliError> {
    if !folder.join(CACHE_DIR).is_dir() {
        return Err(CliError::Config(format!(
            "{} has no transfer state ({} not found)",
            folder.display(),
            CACHE_DIR
        )));
    }

    let store = HeedChunkStore::open_in(folder)?;
    let mut files = store.progress()?;
    files.sort_by(|a, b| a.file.cmp(&b.file));

    if json {
        println!("{}", serde_json::to_string_pretty(&files)?);
        return Ok(());
    }

    let mut complete = 0;
    let mut total = 0;
    for progress in &files {
        complete += progress.complete;
        total += progress.total();

        let name = Path::new(&progress.file)
            .strip_prefix(folder)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| progress.file.clone());
        let state = if progress.is_complete() {
            style("done").green()
        } else if progress.complete == 0 {
            style("queued").dim()
        } else {
            style("partial").yellow()
        };

        println!(
            "  {:<8} {:>10} / {:<10} {}",
            state,
            format_size(progress.complete),
            format_size(progress.total()),
            name
        );
    }

    let done = files.iter().filter(|p| p.is_complete()).count();
    println!();
    println!(
        "{} of {} files complete, {} of {}",
        done,
        files.len(),
        format_size(complete),
        format_size(total)
    );

    Ok(())
}
