//! Download command - mirror one game from the library server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use frost::config::format_size;
use frost::download::{
    DownloadService, ProgressSink, StatusUpdate, TransferProgress, TransferStatus,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the download command.
pub struct DownloadArgs {
    pub game_id: u64,
    pub server: Option<String>,
    pub dest: Option<PathBuf>,
    pub verbose: bool,
}

/// Progress bar driven by transfer updates.
struct BarSink {
    bar: ProgressBar,
}

impl BarSink {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        match ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {wide_bar:.cyan/blue} {bytes}/{total_bytes} {bytes_per_sec} ETA {eta} | {msg}",
        ) {
            Ok(style) => bar.set_style(style),
            Err(e) => warn!(error = %e, "invalid progress template"),
        }
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }
}

impl ProgressSink for BarSink {
    fn report_status(&self, update: &StatusUpdate) {
        match update.status {
            TransferStatus::Error | TransferStatus::Cancelled => {}
            _ if update.message.is_empty() => self.bar.set_message(update.status.to_string()),
            _ => self.bar.set_message(update.message.clone()),
        }
    }

    fn report_progress(&self, _game_id: u64, progress: &TransferProgress) {
        self.bar.set_length(progress.total_bytes);
        self.bar.set_position(progress.complete_bytes());
        self.bar.set_message(format!(
            "{}/{} files",
            progress.files_completed, progress.total_files
        ));
    }
}

/// Run the download command.
pub fn run(args: DownloadArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(args.verbose)?;
    runner.log_startup("download");

    let mut downloader = runner.config().downloader_config();
    if let Some(server) = args.server {
        downloader.server_url = server;
    }
    let root = args.dest.unwrap_or_else(|| downloader.download_dir.clone());

    println!("Frost Download v{}", frost::VERSION);
    println!("===================");
    println!();
    println!("Server:      {}", downloader.server_url);
    println!("Destination: {}", root.join(args.game_id.to_string()).display());
    println!(
        "Chunks:      {} ({} files x {} chunks in flight)",
        format_size(downloader.chunk_size),
        downloader.max_concurrent_files,
        downloader.max_concurrent_chunks
    );
    println!();
    println!("Press Ctrl+C to stop; run again to resume");
    println!();

    let sink = Arc::new(BarSink::new());
    let sink_dyn: Arc<dyn ProgressSink> = sink.clone();
    let service = DownloadService::from_config(downloader, sink_dyn)?;
    let handle = service.download(args.game_id, &root)?;

    let transfer = Arc::clone(handle.transfer());
    let interrupt = Arc::clone(&transfer);
    ctrlc::set_handler(move || interrupt.cancel())
        .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let status = handle.wait();
    let dest = transfer.dest().display().to_string();

    match status {
        TransferStatus::Complete => {
            sink.bar.finish_with_message("complete");
            println!();
            println!("Game {} downloaded to {}", args.game_id, dest);
            Ok(())
        }
        _ => {
            sink.bar.abandon_with_message(status.to_string());
            Err(CliError::Transfer {
                game_id: args.game_id,
                status,
                message: transfer.status().message,
            })
        }
    }
}
