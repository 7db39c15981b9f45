//! Download command implementation

use super::{format_size, Session};
use droidflash_core::transfer::{
    CancelToken, ChannelProgress, TransferEvent, TransferJob, TransferManager, TransferState,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::thread;

/// Run the download command
pub fn run_download(
    session: &Session,
    url: &str,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let job = download_with_progress(session, url, output)?;
    println!(
        "Wrote {} to {}",
        format_size(job.transferred_bytes()),
        job.destination().display()
    );
    Ok(())
}

/// Download on a worker thread while rendering a progress bar
///
/// Returns the job once it reached a terminal state; a failed download is
/// an error.
pub fn download_with_progress(
    session: &Session,
    url: &str,
    destination: &Path,
) -> Result<TransferJob, Box<dyn std::error::Error>> {
    let manager = TransferManager::new(&session.config.transfer)?;
    // Never cancelled here; an interrupted process leaves only
    // `<destination>.part`, which marks the file as incomplete
    let cancel = CancelToken::new();
    let (sink, events) = ChannelProgress::channel();

    let (job, rendered) = thread::scope(|s| {
        let (manager, cancel) = (&manager, &cancel);
        // The sink moves into the worker so the channel closes when it ends
        let worker = s.spawn(move || {
            let mut sink = sink;
            manager.download(url, destination, cancel, &mut sink)
        });
        let rendered = render(events);
        (worker.join(), rendered)
    });

    let job = job.map_err(|_| "Download worker panicked")??;
    rendered?;
    Ok(job)
}

/// Render transfer events until the worker drops its sender
fn render(events: Receiver<TransferEvent>) -> Result<(), Box<dyn std::error::Error>> {
    let mut pb = ProgressBar::hidden();

    for event in events {
        match event {
            TransferEvent::Started { total_bytes } => {
                pb = match total_bytes {
                    Some(total) => {
                        let pb = ProgressBar::new(total);
                        pb.set_style(
                            ProgressStyle::default_bar()
                                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}")?
                                .progress_chars("#>-"),
                        );
                        pb
                    }
                    None => {
                        let pb = ProgressBar::new_spinner();
                        pb.set_style(
                            ProgressStyle::default_spinner()
                                .template("{spinner:.green} [{elapsed_precise}] {bytes} ({bytes_per_sec}) {msg}")?,
                        );
                        pb
                    }
                };
            }
            TransferEvent::Progress(progress) => pb.set_position(progress.transferred_bytes),
            TransferEvent::Finished { state, .. } => match state {
                TransferState::Completed => pb.finish_with_message("Download complete"),
                other => pb.abandon_with_message(format!("Download {}", other)),
            },
        }
    }

    Ok(())
}
