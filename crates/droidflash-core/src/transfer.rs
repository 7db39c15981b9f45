//! Firmware artifact downloads
//!
//! A download streams the response body into `<destination>.part` and only
//! renames it onto the destination once every byte has arrived, so the
//! destination path never holds a partial image. Failed and cancelled jobs
//! remove the `.part` file.
//!
//! Progress is pushed to a `TransferProgress` observer after every chunk
//! write. For one job the events are `Started`, then `Progress` with strictly
//! increasing byte counts, then exactly one `Finished`, which is always last.
//!
//! There is no automatic retry. Calling `download` again with the same
//! destination starts over from scratch.

use crate::catalog::FirmwareRecord;
use crate::config::TransferConfig;
use crate::error::TransferError;
use reqwest::blocking::Client;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Lifecycle of a transfer job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Created, nothing requested yet
    Pending,
    /// Receiving data
    InProgress,
    /// All data written to the destination
    Completed,
    /// Aborted by an I/O or network fault
    Failed,
    /// Aborted by the caller
    Cancelled,
}

impl TransferState {
    /// Whether the job has finished, successfully or not
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::InProgress => "in progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.pad(name)
    }
}

/// Bytes received so far for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Bytes written to disk
    pub transferred_bytes: u64,
    /// Expected size, if the server declared one
    pub total_bytes: Option<u64>,
}

impl ProgressEvent {
    /// Completed fraction in `0.0..=1.0`, when the total is known
    pub fn fraction(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(1.0),
            Some(total) => Some((self.transferred_bytes as f64 / total as f64).min(1.0)),
            None => None,
        }
    }
}

/// Notification emitted while a job runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEvent {
    /// The transfer began; size known up front if declared
    Started {
        /// Expected size
        total_bytes: Option<u64>,
    },
    /// A chunk was written
    Progress(ProgressEvent),
    /// The job reached a terminal state; always the last event
    Finished {
        /// Terminal state
        state: TransferState,
        /// Bytes received in total
        transferred_bytes: u64,
    },
}

/// Observer for transfer events
pub trait TransferProgress {
    /// Called for every event of a job, in order
    fn on_event(&mut self, event: TransferEvent);
}

impl<F: FnMut(TransferEvent)> TransferProgress for F {
    fn on_event(&mut self, event: TransferEvent) {
        self(event)
    }
}

/// Discards all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl TransferProgress for NoProgress {
    fn on_event(&mut self, _event: TransferEvent) {}
}

/// Forwards events to another thread
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    sender: Sender<TransferEvent>,
}

impl ChannelProgress {
    /// Create a forwarding observer and the receiving end
    pub fn channel() -> (Self, Receiver<TransferEvent>) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, receiver)
    }
}

impl TransferProgress for ChannelProgress {
    fn on_event(&mut self, event: TransferEvent) {
        // A receiver that went away only means nobody is watching
        let _ = self.sender.send(event);
    }
}

/// Cooperative cancellation flag, checked between chunks
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create an unset token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One user-initiated download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferJob {
    source_url: String,
    destination: PathBuf,
    total_bytes: Option<u64>,
    transferred_bytes: u64,
    state: TransferState,
}

impl TransferJob {
    fn new(source_url: &str, destination: &Path) -> Self {
        Self {
            source_url: source_url.to_string(),
            destination: destination.to_path_buf(),
            total_bytes: None,
            transferred_bytes: 0,
            state: TransferState::Pending,
        }
    }

    /// Where the data came from
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// Where the data is stored once complete
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Declared size, if any
    pub fn total_bytes(&self) -> Option<u64> {
        self.total_bytes
    }

    /// Bytes received
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes
    }

    /// Current state
    pub fn state(&self) -> TransferState {
        self.state
    }

    /// The downloaded artifact, only for a completed job
    pub fn artifact(&self) -> Option<Artifact> {
        (self.state == TransferState::Completed).then(|| Artifact {
            path: self.destination.clone(),
            size: self.transferred_bytes,
        })
    }
}

/// A firmware image that was downloaded completely
///
/// Only obtainable from a `Completed` `TransferJob`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    path: PathBuf,
    size: u64,
}

impl Artifact {
    /// Path of the image on disk
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size recorded when the download completed
    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Path an in-flight download is written to
pub fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

/// Destination for `record` inside the user-chosen directory
///
/// The file is named after the firmware version; characters that could
/// escape the directory are replaced.
pub fn destination_for(dir: &Path, record: &FirmwareRecord) -> PathBuf {
    let mut name: String = record
        .version
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    name = name.trim_matches('.').to_string();
    if name.is_empty() {
        name = "firmware".to_string();
    }
    dir.join(format!("{}.zip", name))
}

/// Runs downloads
pub struct TransferManager {
    client: Client,
    chunk_size: usize,
}

impl TransferManager {
    /// Create a manager with its own HTTP client
    pub fn new(config: &TransferConfig) -> Result<Self, TransferError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(None)
            .build()
            .map_err(|e| TransferError::new(format!("HTTP client: {}", e), 0))?;
        Ok(Self {
            client,
            chunk_size: config.chunk_size.max(1),
        })
    }

    /// Download `url` to `destination`
    ///
    /// `http(s)://` sources are fetched with a streaming GET; `file://`
    /// sources are copied through the same pipeline. A cancelled job returns
    /// `Ok` with state `Cancelled`.
    pub fn download(
        &self,
        url: &str,
        destination: &Path,
        cancel: &CancelToken,
        progress: &mut dyn TransferProgress,
    ) -> Result<TransferJob, TransferError> {
        let mut job = TransferJob::new(url, destination);
        log::info!("Downloading {} to {}", url, destination.display());

        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => return fail(&mut job, None, format!("invalid URL: {}", e), progress),
        };

        match parsed.scheme() {
            "file" => {
                let path = match parsed.to_file_path() {
                    Ok(path) => path,
                    Err(()) => return fail(&mut job, None, "invalid file URL", progress),
                };
                let file = match File::open(&path) {
                    Ok(file) => file,
                    Err(e) => {
                        let reason = format!("cannot open {}: {}", path.display(), e);
                        return fail(&mut job, None, reason, progress);
                    }
                };
                let total = file.metadata().ok().map(|m| m.len());
                self.run(job, file, total, cancel, progress)
            }
            "http" | "https" => {
                let response = match self.client.get(parsed).send() {
                    Ok(response) => response,
                    Err(e) => return fail(&mut job, None, e.to_string(), progress),
                };
                let status = response.status();
                if !status.is_success() {
                    return fail(&mut job, None, format!("HTTP {}", status), progress);
                }
                let total = response.content_length();
                self.run(job, response, total, cancel, progress)
            }
            other => fail(
                &mut job,
                None,
                format!("unsupported URL scheme '{}'", other),
                progress,
            ),
        }
    }

    /// Stream an arbitrary reader to `destination` as a transfer job
    ///
    /// `total` is the expected size, if known; a stream that ends early is
    /// a failure.
    pub fn receive(
        &self,
        source: impl Read,
        total: Option<u64>,
        source_url: &str,
        destination: &Path,
        cancel: &CancelToken,
        progress: &mut dyn TransferProgress,
    ) -> Result<TransferJob, TransferError> {
        let job = TransferJob::new(source_url, destination);
        self.run(job, source, total, cancel, progress)
    }

    fn run(
        &self,
        mut job: TransferJob,
        mut source: impl Read,
        total: Option<u64>,
        cancel: &CancelToken,
        progress: &mut dyn TransferProgress,
    ) -> Result<TransferJob, TransferError> {
        job.total_bytes = total;
        job.state = TransferState::InProgress;
        progress.on_event(TransferEvent::Started { total_bytes: total });

        match total {
            Some(total) => log::debug!("Expecting {} bytes", total),
            None => log::debug!("Server did not declare a size"),
        }

        // Restarting replaces whatever was there before
        if let Err(e) = remove_if_exists(&job.destination) {
            let reason = format!("cannot replace {}: {}", job.destination.display(), e);
            return fail(&mut job, None, reason, progress);
        }

        let part = partial_path(&job.destination);
        let mut file = match File::create(&part) {
            Ok(file) => file,
            Err(e) => {
                let reason = format!("cannot create {}: {}", part.display(), e);
                return fail(&mut job, None, reason, progress);
            }
        };

        let mut buf = vec![0u8; self.chunk_size];
        loop {
            if cancel.is_cancelled() {
                drop(file);
                discard(&part);
                log::info!(
                    "Download of {} cancelled after {} bytes",
                    job.source_url,
                    job.transferred_bytes
                );
                return Ok(finish(job, TransferState::Cancelled, progress));
            }

            let n = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    drop(file);
                    return fail(&mut job, Some(&part), format!("read error: {}", e), progress);
                }
            };

            if let Err(e) = file.write_all(&buf[..n]) {
                drop(file);
                return fail(&mut job, Some(&part), format!("write error: {}", e), progress);
            }

            job.transferred_bytes += n as u64;
            progress.on_event(TransferEvent::Progress(ProgressEvent {
                transferred_bytes: job.transferred_bytes,
                total_bytes: job.total_bytes,
            }));
        }

        if let Err(e) = file.sync_all() {
            drop(file);
            return fail(&mut job, Some(&part), format!("write error: {}", e), progress);
        }
        drop(file);

        if let Some(expected) = job.total_bytes {
            if expected != job.transferred_bytes {
                let reason = format!(
                    "incomplete transfer: expected {} bytes, received {}",
                    expected, job.transferred_bytes
                );
                return fail(&mut job, Some(&part), reason, progress);
            }
        }

        if let Err(e) = fs::rename(&part, &job.destination) {
            let reason = format!("cannot move download into place: {}", e);
            return fail(&mut job, Some(&part), reason, progress);
        }

        log::info!(
            "Downloaded {} bytes to {}",
            job.transferred_bytes,
            job.destination.display()
        );
        Ok(finish(job, TransferState::Completed, progress))
    }
}

fn finish(
    mut job: TransferJob,
    state: TransferState,
    progress: &mut dyn TransferProgress,
) -> TransferJob {
    job.state = state;
    progress.on_event(TransferEvent::Finished {
        state,
        transferred_bytes: job.transferred_bytes,
    });
    job
}

fn fail(
    job: &mut TransferJob,
    part: Option<&Path>,
    reason: impl Into<String>,
    progress: &mut dyn TransferProgress,
) -> Result<TransferJob, TransferError> {
    if let Some(part) = part {
        discard(part);
    }
    let error = TransferError::new(reason, job.transferred_bytes);
    log::warn!("Download of {} failed: {}", job.source_url, error);

    job.state = TransferState::Failed;
    progress.on_event(TransferEvent::Finished {
        state: TransferState::Failed,
        transferred_bytes: job.transferred_bytes,
    });
    Err(error)
}

fn discard(part: &Path) {
    if let Err(e) = remove_if_exists(part) {
        log::error!("Failed to remove partial file {}: {}", part.display(), e);
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn manager(chunk_size: usize) -> TransferManager {
        TransferManager::new(&TransferConfig {
            chunk_size,
            ..TransferConfig::default()
        })
        .unwrap()
    }

    /// Yields `data`, then fails
    struct BrokenReader {
        data: Cursor<Vec<u8>>,
    }

    impl Read for BrokenReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
                n => Ok(n),
            }
        }
    }

    /// Cancels the token after the first read
    struct CancellingReader {
        data: Cursor<Vec<u8>>,
        token: CancelToken,
    }

    impl Read for CancellingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.token.cancel();
            self.data.read(buf)
        }
    }

    fn record(version: &str) -> FirmwareRecord {
        FirmwareRecord {
            version: version.into(),
            region: "XEU".into(),
            download_url: "https://example.com/fw.zip".into(),
        }
    }

    #[test]
    fn test_receive_completes_with_ordered_events() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("fw.zip");
        let data = vec![0xA5u8; 10_000];

        let mut events = Vec::new();
        let job = manager(4096)
            .receive(
                Cursor::new(data.clone()),
                Some(data.len() as u64),
                "test://",
                &dest,
                &CancelToken::new(),
                &mut |e: TransferEvent| events.push(e),
            )
            .unwrap();

        assert_eq!(job.state(), TransferState::Completed);
        assert_eq!(job.transferred_bytes(), 10_000);
        assert_eq!(fs::read(&dest).unwrap(), data);
        assert!(!partial_path(&dest).exists());

        assert_eq!(
            events.first(),
            Some(&TransferEvent::Started {
                total_bytes: Some(10_000)
            })
        );
        assert_eq!(
            events.last(),
            Some(&TransferEvent::Finished {
                state: TransferState::Completed,
                transferred_bytes: 10_000
            })
        );

        let counts: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                TransferEvent::Progress(p) => Some(p.transferred_bytes),
                _ => None,
            })
            .collect();
        assert_eq!(counts, vec![4096, 8192, 10_000]);
        assert_eq!(
            *counts.last().unwrap(),
            fs::metadata(&dest).unwrap().len()
        );

        let artifact = job.artifact().unwrap();
        assert_eq!(artifact.path(), dest.as_path());
        assert_eq!(artifact.size(), 10_000);
    }

    #[test]
    fn test_receive_unknown_size() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("fw.zip");

        let mut last = None;
        let job = manager(16)
            .receive(
                Cursor::new(vec![1u8; 40]),
                None,
                "test://",
                &dest,
                &CancelToken::new(),
                &mut |e: TransferEvent| {
                    if let TransferEvent::Progress(p) = e {
                        assert_eq!(p.total_bytes, None);
                        assert_eq!(p.fraction(), None);
                    }
                    last = Some(e);
                },
            )
            .unwrap();

        assert_eq!(job.total_bytes(), None);
        assert_eq!(job.state(), TransferState::Completed);
        assert!(matches!(
            last,
            Some(TransferEvent::Finished {
                state: TransferState::Completed,
                transferred_bytes: 40
            })
        ));
    }

    #[test]
    fn test_read_error_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("fw.zip");

        let mut events = Vec::new();
        let err = manager(8)
            .receive(
                BrokenReader {
                    data: Cursor::new(vec![7u8; 20]),
                },
                Some(100),
                "test://",
                &dest,
                &CancelToken::new(),
                &mut |e: TransferEvent| events.push(e),
            )
            .unwrap_err();

        assert_eq!(err.bytes_transferred, 20);
        assert!(err.reason.contains("read error"));
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
        assert_eq!(
            events.last(),
            Some(&TransferEvent::Finished {
                state: TransferState::Failed,
                transferred_bytes: 20
            })
        );
    }

    #[test]
    fn test_short_stream_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("fw.zip");

        let err = manager(1024)
            .receive(
                Cursor::new(vec![0u8; 500]),
                Some(1000),
                "test://",
                &dest,
                &CancelToken::new(),
                &mut NoProgress,
            )
            .unwrap_err();

        assert_eq!(err.bytes_transferred, 500);
        assert!(err.reason.contains("incomplete"));
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
    }

    #[test]
    fn test_cancel_mid_stream() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("fw.zip");
        let token = CancelToken::new();

        let mut events = Vec::new();
        let job = manager(10)
            .receive(
                CancellingReader {
                    data: Cursor::new(vec![0u8; 100]),
                    token: token.clone(),
                },
                Some(100),
                "test://",
                &dest,
                &token,
                &mut |e: TransferEvent| events.push(e),
            )
            .unwrap();

        assert_eq!(job.state(), TransferState::Cancelled);
        assert_eq!(job.transferred_bytes(), 10);
        assert!(job.artifact().is_none());
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
        assert_eq!(
            events.last(),
            Some(&TransferEvent::Finished {
                state: TransferState::Cancelled,
                transferred_bytes: 10
            })
        );
    }

    #[test]
    fn test_restart_replaces_existing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("fw.zip");
        fs::write(&dest, b"old contents that are longer").unwrap();

        manager(64)
            .receive(
                Cursor::new(b"new".to_vec()),
                Some(3),
                "test://",
                &dest,
                &CancelToken::new(),
                &mut NoProgress,
            )
            .unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"new");
    }

    #[test]
    fn test_download_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.bin");
        fs::write(&source, vec![3u8; 300]).unwrap();
        let dest = dir.path().join("out").join("fw.zip");
        fs::create_dir_all(dest.parent().unwrap()).unwrap();

        let url = Url::from_file_path(&source).unwrap();
        let job = manager(128)
            .download(url.as_str(), &dest, &CancelToken::new(), &mut NoProgress)
            .unwrap();
        assert_eq!(job.state(), TransferState::Completed);
        assert_eq!(job.total_bytes(), Some(300));
        assert_eq!(fs::read(&dest).unwrap().len(), 300);
    }

    #[test]
    fn test_download_rejects_bad_urls() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("fw.zip");
        let m = manager(128);

        let err = m
            .download("not a url", &dest, &CancelToken::new(), &mut NoProgress)
            .unwrap_err();
        assert!(err.reason.contains("invalid URL"));
        assert_eq!(err.bytes_transferred, 0);

        let err = m
            .download("ftp://example.com/fw.zip", &dest, &CancelToken::new(), &mut NoProgress)
            .unwrap_err();
        assert!(err.reason.contains("unsupported"));
        assert!(!dest.exists());
    }

    #[test]
    fn test_destination_for_sanitizes_version() {
        let dir = Path::new("/downloads");
        assert_eq!(
            destination_for(dir, &record("G991BXXU5CVLL")),
            PathBuf::from("/downloads/G991BXXU5CVLL.zip")
        );
        assert_eq!(
            destination_for(dir, &record("../../etc/passwd")),
            PathBuf::from("/downloads/_.._etc_passwd.zip")
        );
        assert_eq!(
            destination_for(dir, &record("")),
            PathBuf::from("/downloads/firmware.zip")
        );
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/tmp/fw.zip")),
            PathBuf::from("/tmp/fw.zip.part")
        );
    }

    #[test]
    fn test_progress_fraction() {
        let p = ProgressEvent {
            transferred_bytes: 50,
            total_bytes: Some(200),
        };
        assert_eq!(p.fraction(), Some(0.25));
        let empty = ProgressEvent {
            transferred_bytes: 0,
            total_bytes: Some(0),
        };
        assert_eq!(empty.fraction(), Some(1.0));
    }
}
