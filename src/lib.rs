//! ydmirror - Mirror public Yandex.Disk resources to the local filesystem
//!
//! This library walks the public resources API of a shared file or folder,
//! rebuilds the remote tree on disk and downloads file bodies with resumable,
//! retry-aware HTTP transfers.
//!
//! # Features
//!
//! - **Recursive Sync**: Depth-first mirror of a public folder, listing order preserved
//! - **Metadata Snapshots**: Every listing is stored verbatim as `_metadata.json`
//! - **Resumable Downloads**: Partial files continue with a `Range` request
//! - **Automatic Retry**: 429/5xx backoff that honours `Retry-After`
//! - **Incremental Runs**: Update-only mode skips files already on disk
//! - **Pluggable Transport**: Stream through reqwest or hand files to `aria2c`
//!
//! # Example
//!
//! ```no_run
//! use ydmirror::{Mirror, SyncConfig, SyncOptions};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mirror = Mirror::new(SyncConfig::default())?;
//! let options = SyncOptions {
//!     update_only: true,
//!     metadata_only: false,
//! };
//!
//! mirror
//!     .sync("https://disk.yandex.ru/d/AbCdEf", Path::new("AbCdEf"), options)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod download;
pub mod error;
pub mod helper;
pub mod metadata;
pub mod orchestrator;
pub mod paths;
pub mod scan;
pub mod transport;
pub mod types;
pub mod walker;

pub use config::{Credentials, SyncConfig, CREDENTIALS_FILE};
pub use download::{DownloadReceipt, DownloadRequest, DownloadState, Downloader, HttpDownloader};
pub use error::{Result, SyncError};
pub use helper::Aria2Downloader;
pub use metadata::{DownloadLink, ResourceApi};
pub use orchestrator::{FullFetchReport, Mirror, SyncOutcome};
pub use scan::Scanner;
pub use transport::{HttpTransport, RetryPolicy};
pub use types::{
    DirectoryPage, RemoteEntry, ResourceType, ScanStats, SyncOptions, WalkOutcome, WalkSummary,
};
pub use walker::Walker;
