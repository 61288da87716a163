//! Recursive mirroring of a remote directory tree.

use futures_util::future::{BoxFuture, FutureExt};
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::download::{DownloadRequest, Downloader};
use crate::error::{Result, SyncError};
use crate::metadata::{persist_snapshot, ResourceApi};
use crate::paths;
use crate::types::{
    DirectoryPage, RemoteEntry, ResourceType, SyncOptions, WalkOutcome, WalkSummary,
};

/// Walks listings depth-first and mirrors them under a local root.
///
/// Every visited directory gets its listing persisted as `_metadata.json`
/// before any child is touched. Failures below the starting directory are
/// logged and counted, never propagated: a flaky subtree or file must not
/// stop its siblings.
pub struct Walker<'a> {
    api: &'a ResourceApi,
    downloader: &'a dyn Downloader,
}

impl<'a> Walker<'a> {
    pub fn new(api: &'a ResourceApi, downloader: &'a dyn Downloader) -> Self {
        Self { api, downloader }
    }

    /// Visits `remote_path`; with `recursive` the whole subtree is mirrored,
    /// otherwise only its listing is fetched, persisted and returned.
    pub async fn walk(
        &self,
        public_key: &str,
        remote_path: &str,
        local_root: &Path,
        options: SyncOptions,
        recursive: bool,
    ) -> Result<WalkOutcome> {
        if recursive {
            let summary = self
                .mirror(public_key, remote_path, local_root, options)
                .await?;
            Ok(WalkOutcome::Mirrored(summary))
        } else {
            let page = self.listing(public_key, remote_path, local_root).await?;
            Ok(WalkOutcome::Listing(page))
        }
    }

    /// Fetches and persists one listing without descending.
    pub async fn listing(
        &self,
        public_key: &str,
        remote_path: &str,
        local_root: &Path,
    ) -> Result<DirectoryPage> {
        self.visit(public_key, remote_path, local_root).await
    }

    /// Mirrors the subtree at `remote_path`.
    ///
    /// Errors fetching or persisting the starting directory are returned;
    /// everything below it is best effort.
    pub fn mirror<'s>(
        &'s self,
        public_key: &'s str,
        remote_path: &'s str,
        local_root: &'s Path,
        options: SyncOptions,
    ) -> BoxFuture<'s, Result<WalkSummary>> {
        async move {
            let page = self.visit(public_key, remote_path, local_root).await?;
            Ok(self
                .process_children(public_key, &page, local_root, options)
                .await)
        }
        .boxed()
    }

    async fn visit(
        &self,
        public_key: &str,
        remote_path: &str,
        local_root: &Path,
    ) -> Result<DirectoryPage> {
        let page = self.api.fetch_listing(public_key, remote_path).await?;

        let dir = paths::local_dir(local_root, remote_path);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| SyncError::io(&dir, e))?;
        persist_snapshot(&dir, &page).await?;

        if page.is_truncated() {
            warn!(
                "Listing of '{}' holds {} entries, only the first {} were fetched",
                remote_path,
                page.total.unwrap_or_default(),
                page.items.len() + page.skipped_entries
            );
        }
        Ok(page)
    }

    async fn process_children(
        &self,
        public_key: &str,
        page: &DirectoryPage,
        local_root: &Path,
        options: SyncOptions,
    ) -> WalkSummary {
        let mut summary = WalkSummary {
            directories: 1,
            ..WalkSummary::default()
        };

        for entry in &page.items {
            match entry.kind {
                ResourceType::Directory => {
                    match self
                        .mirror(public_key, &entry.remote_path, local_root, options)
                        .await
                    {
                        Ok(subtree) => summary += subtree,
                        Err(e) => {
                            error!(
                                "Failed to process subdirectory {}: {}",
                                entry.remote_path, e
                            );
                            summary.failures += 1;
                        }
                    }
                }
                ResourceType::File => {
                    summary += self.sync_file(entry, local_root, options).await;
                }
            }
        }
        summary
    }

    async fn sync_file(
        &self,
        entry: &RemoteEntry,
        local_root: &Path,
        options: SyncOptions,
    ) -> WalkSummary {
        let mut summary = WalkSummary::default();
        if options.metadata_only {
            return summary;
        }

        let Some((dir, file_name)) = paths::local_file(local_root, &entry.remote_path) else {
            warn!("Cannot map '{}' to a local file", entry.remote_path);
            summary.failures += 1;
            return summary;
        };

        let destination = dir.join(&file_name);
        if options.update_only && tokio::fs::try_exists(&destination).await.unwrap_or(false) {
            debug!("Already stored {}", entry.remote_path);
            summary.files_skipped += 1;
            return summary;
        }

        let Some(url) = entry.download_url.as_deref() else {
            warn!("No download link for {}", entry.remote_path);
            summary.failures += 1;
            return summary;
        };

        let request = DownloadRequest::new(url)
            .into_dir(dir)
            .named(file_name)
            .expecting(entry.size);

        match self.downloader.download(&request).await {
            Ok(_) => {
                info!("Saved {}", entry.remote_path);
                summary.files_downloaded += 1;
            }
            Err(e) => {
                error!(
                    "Failed to download file {} via {}: {}",
                    entry.remote_path,
                    self.downloader.name(),
                    e
                );
                summary.failures += 1;
            }
        }
        summary
    }
}
