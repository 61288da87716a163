//! Top-level operations: single-resource fetch and recursive sync.

use indicatif::HumanBytes;
use std::path::Path;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::download::{select_downloader, DownloadReceipt, DownloadRequest, Downloader};
use crate::error::{Result, SyncError};
use crate::metadata::{persist_snapshot, ResourceApi};
use crate::scan::Scanner;
use crate::transport::HttpTransport;
use crate::types::{DirectoryPage, ResourceType, ScanStats, SyncOptions, WalkSummary};
use crate::walker::Walker;

/// What [`Mirror::full_fetch`] found and downloaded.
#[derive(Debug, Clone)]
pub struct FullFetchReport {
    pub resource_type: ResourceType,
    pub name: Option<String>,
    /// Size announced for the single artifact, when the API gave one.
    pub declared_size: Option<u64>,
    /// Contents of a directory that was fetched as one archive.
    pub archive_contents: Option<ScanStats>,
    pub receipt: DownloadReceipt,
}

/// How a [`Mirror::sync`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Update-only run with nothing missing locally.
    UpToDate,
    /// The resource holds no files to download.
    NothingToDownload,
    /// The walk ran; `planned` is absent when the scan was skipped or failed.
    Completed {
        planned: Option<ScanStats>,
        summary: WalkSummary,
    },
}

/// Entry point tying the listing client, scanner, walker and downloader together.
///
/// # Example
///
/// ```no_run
/// use ydmirror::{Mirror, SyncConfig, SyncOptions};
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mirror = Mirror::new(SyncConfig::default())?;
/// mirror
///     .sync("https://disk.yandex.ru/d/AbCdEf", Path::new("AbCdEf"), SyncOptions::default())
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct Mirror {
    config: SyncConfig,
    api: ResourceApi,
    downloader: Box<dyn Downloader>,
}

impl Mirror {
    /// Builds the transport and picks the downloader the config asks for.
    pub fn new(config: SyncConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        let downloader = select_downloader(&config, &transport)?;
        Ok(Self::assemble(config, transport, downloader))
    }

    /// Like [`Mirror::new`] but with a caller-provided downloader.
    pub fn with_downloader(config: SyncConfig, downloader: Box<dyn Downloader>) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::assemble(config, transport, downloader))
    }

    fn assemble(
        config: SyncConfig,
        transport: HttpTransport,
        downloader: Box<dyn Downloader>,
    ) -> Self {
        let api = ResourceApi::new(transport, &config);
        Self {
            config,
            api,
            downloader,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Downloads the resource as exactly one artifact: the file itself, or a
    /// ZIP archive of a directory.
    ///
    /// Every failure is fatal. A missing download link is
    /// [`SyncError::Resource`] and leaves no output file behind.
    pub async fn full_fetch(
        &self,
        public_key: &str,
        output: &Path,
        filename: Option<&str>,
        save_metadata: bool,
    ) -> Result<FullFetchReport> {
        let page = self.api.fetch_resource(public_key).await?;

        if save_metadata {
            tokio::fs::create_dir_all(output)
                .await
                .map_err(|e| SyncError::io(output, e))?;
            persist_snapshot(output, &page).await?;
            info!("Metadata saved to {}", output.display());
        }

        let archive_contents = match page.resource_type {
            ResourceType::Directory => {
                let scanner = Scanner::new(&self.api);
                match scanner
                    .scan(public_key, "", output, SyncOptions::default())
                    .await
                {
                    Ok(stats) => {
                        info!(
                            "Total files to download: 1 (ZIP archive containing {} file(s))",
                            stats.file_count
                        );
                        info!("Total size: {}", HumanBytes(stats.total_bytes));
                        Some(stats)
                    }
                    Err(e) => {
                        warn!("Failed to scan directory for stats: {}", e);
                        info!("Total files to download: 1 (ZIP archive)");
                        None
                    }
                }
            }
            ResourceType::File => {
                info!("Total files to download: 1");
                match page.size {
                    Some(size) => info!("Total size: {}", HumanBytes(size)),
                    None => info!("Total size: unknown"),
                }
                None
            }
        };

        let link = self.api.fetch_download_link(public_key).await?;
        let href = link.href.ok_or_else(|| {
            SyncError::Resource(format!("No download URL found for {}", public_key))
        })?;
        let declared_size = link.size.or(page.size);

        let mut request = DownloadRequest::new(href)
            .into_dir(output)
            .expecting(declared_size);
        if let Some(name) = filename {
            request = request.named(name);
        }
        let receipt = self.downloader.download(&request).await?;

        Ok(FullFetchReport {
            resource_type: page.resource_type,
            name: page.name,
            declared_size,
            archive_contents,
            receipt,
        })
    }

    /// Mirrors the whole resource tree under `output`.
    ///
    /// The scanner runs first (except in metadata-only mode) to decide
    /// whether there is anything to do; its failure is only logged.
    pub async fn sync(
        &self,
        public_key: &str,
        output: &Path,
        options: SyncOptions,
    ) -> Result<SyncOutcome> {
        info!("Saving {}", public_key);
        tokio::fs::create_dir_all(output)
            .await
            .map_err(|e| SyncError::io(output, e))?;

        let mut planned = None;
        if !options.metadata_only {
            let scanner = Scanner::new(&self.api);
            match scanner.scan(public_key, "", output, options).await {
                Ok(stats) if stats.file_count > 0 => {
                    info!("Total files to download: {}", stats.file_count);
                    info!("Total size: {}", HumanBytes(stats.total_bytes));
                    planned = Some(stats);
                }
                Ok(_) if options.update_only => {
                    info!("All files are already up to date.");
                    return Ok(SyncOutcome::UpToDate);
                }
                Ok(_) => {
                    info!("No files found to download.");
                    return Ok(SyncOutcome::NothingToDownload);
                }
                Err(e) => warn!("Failed to scan directory for stats: {}", e),
            }
        }

        let walker = Walker::new(&self.api, self.downloader.as_ref());
        let summary = walker.mirror(public_key, "", output, options).await?;
        Ok(SyncOutcome::Completed { planned, summary })
    }

    /// Fetches and persists the listing of one directory without descending.
    pub async fn list(
        &self,
        public_key: &str,
        remote_path: &str,
        output: &Path,
    ) -> Result<DirectoryPage> {
        let walker = Walker::new(&self.api, self.downloader.as_ref());
        walker.listing(public_key, remote_path, output).await
    }
}
