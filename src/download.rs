//! Resumable streaming downloads.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_DISPOSITION, RANGE};
use reqwest::{Response, StatusCode};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::helper::Aria2Downloader;
use crate::transport::HttpTransport;

/// Fallback file name when neither the caller, the response nor the URL names one.
const FALLBACK_FILENAME: &str = "download";

/// What to fetch and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    /// Destination directory; the working directory when unset.
    pub dest_dir: Option<PathBuf>,
    /// Destination file name; resolved from the response when unset.
    pub filename: Option<String>,
    /// Declared size, used for progress reporting only.
    pub expected_size: Option<u64>,
    /// Continue a partial local file with a ranged request.
    pub resume: bool,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            dest_dir: None,
            filename: None,
            expected_size: None,
            resume: true,
        }
    }

    pub fn into_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dest_dir = Some(dir.into());
        self
    }

    pub fn named(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn expecting(mut self, size: Option<u64>) -> Self {
        self.expected_size = size;
        self
    }

    pub fn resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }
}

/// Outcome of a finished download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReceipt {
    pub path: PathBuf,
    /// Size of the partial file the transfer continued from (0 for a fresh one).
    pub resumed_from: u64,
    /// Bytes written by this transfer.
    pub bytes_written: u64,
}

/// A way of getting one URL onto disk.
///
/// The walker and the orchestrator only see this trait; the HTTP streaming
/// implementation and the external helper are interchangeable.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, request: &DownloadRequest) -> Result<DownloadReceipt>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Picks the helper process when one is configured, HTTP streaming otherwise.
pub fn select_downloader(
    config: &SyncConfig,
    transport: &HttpTransport,
) -> Result<Box<dyn Downloader>> {
    if config.helper_path.is_some() {
        Ok(Box::new(Aria2Downloader::from_config(config)?))
    } else {
        Ok(Box::new(HttpDownloader::new(transport.clone(), config)))
    }
}

/// Per-file transfer bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadState {
    pub existing_size: u64,
    pub expected_size: Option<u64>,
    pub bytes_written: u64,
}

impl DownloadState {
    pub fn new(existing_size: u64, expected_size: Option<u64>) -> Self {
        Self {
            existing_size,
            expected_size,
            bytes_written: 0,
        }
    }

    /// Bytes this transfer has to deliver, when the total is known.
    pub fn remaining(&self) -> Option<u64> {
        self.expected_size
            .map(|expected| expected.saturating_sub(self.existing_size))
    }

    fn record(&mut self, n: usize) {
        self.bytes_written += n as u64;
    }
}

/// Streams response bodies straight to disk through the shared transport.
pub struct HttpDownloader {
    transport: HttpTransport,
    chunk_size: usize,
    show_progress: bool,
}

impl HttpDownloader {
    pub fn new(transport: HttpTransport, config: &SyncConfig) -> Self {
        Self {
            transport,
            chunk_size: config.chunk_size.max(1),
            show_progress: config.show_progress,
        }
    }

    async fn fetch(&self, url: &str, from: u64) -> Result<Response> {
        let mut headers = HeaderMap::new();
        if from > 0 {
            let range = HeaderValue::from_str(&format!("bytes={}-", from))
                .map_err(|e| SyncError::Config(e.to_string()))?;
            headers.insert(RANGE, range);
        }
        self.transport.get(url, &[], headers, true).await
    }

    fn progress_bar(&self, state: &DownloadState, path: &Path) -> indicatif::ProgressBar {
        if !self.show_progress {
            return indicatif::ProgressBar::hidden();
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let resuming = if state.existing_size > 0 {
            " (resuming)"
        } else {
            ""
        };

        let pb = match state.remaining() {
            Some(remaining) => {
                let pb = indicatif::ProgressBar::new(remaining);
                if let Ok(style) = indicatif::ProgressStyle::default_bar().template(
                    "{spinner:.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg} | {bytes_per_sec}, ETA {eta}",
                ) {
                    pb.set_style(style.progress_chars("█▓▒░ "));
                }
                pb
            }
            None => {
                let pb = indicatif::ProgressBar::new_spinner();
                if let Ok(style) = indicatif::ProgressStyle::default_spinner()
                    .template("{spinner:.cyan} {bytes} {msg} | {bytes_per_sec}")
                {
                    pb.set_style(style);
                }
                pb
            }
        };
        pb.set_message(format!("⬇️  {}{}", name, resuming));
        pb
    }

    async fn stream_body<W: AsyncWrite + Unpin>(
        &self,
        response: Response,
        writer: &mut W,
        state: &mut DownloadState,
        pb: &indicatif::ProgressBar,
        path: &Path,
    ) -> Result<()> {
        let url = response.url().to_string();
        let timeout = self.transport.timeout();
        let mut byte_stream = response.bytes_stream();
        let mut chunks = 0u64;

        loop {
            let next = tokio::time::timeout(timeout, byte_stream.next())
                .await
                .map_err(|_| SyncError::transport(&url, stalled(timeout)))?;
            let Some(piece) = next else { break };
            let chunk = piece.map_err(|e| SyncError::transport(&url, e))?;

            writer
                .write_all(&chunk)
                .await
                .map_err(|e| SyncError::io(path, e))?;
            state.record(chunk.len());
            pb.inc(chunk.len() as u64);

            chunks += 1;
            if chunks % 1000 == 0 {
                debug!(
                    "File {} at {} bytes",
                    path.display(),
                    state.existing_size + state.bytes_written
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, request: &DownloadRequest) -> Result<DownloadReceipt> {
        let url = request.url.as_str();
        let dest_dir = request.dest_dir.clone().unwrap_or_default();

        // Without an explicit name the first response decides it.
        let (first_response, filename) = match &request.filename {
            Some(name) => (None, name.clone()),
            None => {
                let response = self.fetch(url, 0).await?;
                let name = resolve_filename(url, response.headers());
                (Some(response), name)
            }
        };
        let path = dest_dir.join(&filename);

        let mut existing_size = 0;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => {
                return Err(SyncError::io(
                    &path,
                    io::Error::other("destination exists and is a directory"),
                ));
            }
            Ok(meta) if request.resume => existing_size = meta.len(),
            _ => {}
        }
        let mut state = DownloadState::new(existing_size, request.expected_size);

        let response = if state.existing_size > 0 {
            drop(first_response);
            info!(
                "Resuming download of {} from byte {}",
                path.display(),
                state.existing_size
            );
            match self.fetch(url, state.existing_size).await {
                Ok(response) => response,
                Err(e) if e.status() == Some(StatusCode::RANGE_NOT_SATISFIABLE) => {
                    if request.expected_size == Some(state.existing_size) {
                        info!("{} is already complete", path.display());
                        return Ok(DownloadReceipt {
                            path,
                            resumed_from: state.existing_size,
                            bytes_written: 0,
                        });
                    }
                    warn!(
                        "Range not satisfiable for {}, restarting from zero",
                        path.display()
                    );
                    state.existing_size = 0;
                    self.fetch(url, 0).await?
                }
                Err(e) => return Err(e),
            }
        } else {
            match first_response {
                Some(response) => response,
                None => self.fetch(url, 0).await?,
            }
        };

        if state.existing_size > 0 && response.status() != StatusCode::PARTIAL_CONTENT {
            warn!(
                "Server ignored the range request for {}, restarting from zero",
                url
            );
            state.existing_size = 0;
        }

        if !dest_dir.as_os_str().is_empty() {
            tokio::fs::create_dir_all(&dest_dir)
                .await
                .map_err(|e| SyncError::io(&dest_dir, e))?;
        }

        let file = if state.existing_size > 0 {
            OpenOptions::new().append(true).open(&path).await
        } else {
            OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)
                .await
        }
        .map_err(|e| SyncError::io(&path, e))?;

        match request.expected_size {
            Some(size) => info!("Retrieving {} with size {}", url, size),
            None => info!("Retrieving {}", url),
        }

        let pb = self.progress_bar(&state, &path);
        let mut writer = BufWriter::with_capacity(self.chunk_size, file);
        let streamed = self
            .stream_body(response, &mut writer, &mut state, &pb, &path)
            .await;
        // Keep whatever arrived so a later run can resume from it.
        let flushed = writer.flush().await.map_err(|e| SyncError::io(&path, e));
        pb.finish_and_clear();
        streamed?;
        flushed?;

        info!(
            "Successfully downloaded {} ({} bytes)",
            path.display(),
            state.existing_size + state.bytes_written
        );
        Ok(DownloadReceipt {
            path,
            resumed_from: state.existing_size,
            bytes_written: state.bytes_written,
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

fn stalled(timeout: Duration) -> io::Error {
    io::Error::new(
        io::ErrorKind::TimedOut,
        format!("no data received for {:?}", timeout),
    )
}

/// Picks the file name for a response: `Content-Disposition` first, then the URL.
pub fn resolve_filename(url: &str, headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_DISPOSITION)
        .and_then(|value| {
            let name = filename_from_disposition(value.as_bytes());
            if name.is_none() {
                warn!("Failed to parse Content-Disposition header of {}", url);
            }
            name
        })
        .unwrap_or_else(|| filename_from_url(url))
}

/// Extracts the `filename=` token of a `Content-Disposition` value.
///
/// The header bytes are decoded as UTF-8, which is how the service sends
/// non-ASCII names. Invalid UTF-8 or a name without a final path
/// component yields `None`.
pub fn filename_from_disposition(value: &[u8]) -> Option<String> {
    const TOKEN: &[u8] = b"filename=";
    let start = value
        .windows(TOKEN.len())
        .position(|w| w.eq_ignore_ascii_case(TOKEN))?
        + TOKEN.len();

    let rest = &value[start..];
    let raw = match rest.first() {
        Some(b'"') => {
            let inner = &rest[1..];
            let end = inner.iter().position(|&b| b == b'"').unwrap_or(inner.len());
            &inner[..end]
        }
        _ => {
            let end = rest.iter().position(|&b| b == b';').unwrap_or(rest.len());
            &rest[..end]
        }
    };

    let text = std::str::from_utf8(raw).ok()?.trim();
    let name = Path::new(text).file_name()?.to_str()?;
    (!name.is_empty()).then(|| name.to_string())
}

/// Last non-empty path segment of `url`.
pub fn filename_from_url(url: &str) -> String {
    let segment = match reqwest::Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(str::to_string),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').find(|s| !s.is_empty()))
            .map(str::to_string),
    };
    segment.unwrap_or_else(|| FALLBACK_FILENAME.to_string())
}
