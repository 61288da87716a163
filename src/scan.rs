//! Read-only pre-pass that sizes up a sync.

use futures_util::future::{BoxFuture, FutureExt};
use std::path::Path;
use tracing::{debug, error};

use crate::error::Result;
use crate::metadata::ResourceApi;
use crate::paths;
use crate::types::{ResourceType, ScanStats, SyncOptions};

/// Walks the same tree as [`crate::Walker`] but writes and downloads nothing.
pub struct Scanner<'a> {
    api: &'a ResourceApi,
}

impl<'a> Scanner<'a> {
    pub fn new(api: &'a ResourceApi) -> Self {
        Self { api }
    }

    /// Counts the files a sync with `options` would download and their
    /// declared sizes (missing sizes count as 0).
    ///
    /// Only a failure listing `remote_path` itself is returned; failing
    /// subtrees contribute nothing.
    pub fn scan<'s>(
        &'s self,
        public_key: &'s str,
        remote_path: &'s str,
        local_root: &'s Path,
        options: SyncOptions,
    ) -> BoxFuture<'s, Result<ScanStats>> {
        async move {
            let page = self.api.fetch_listing(public_key, remote_path).await?;
            let mut stats = ScanStats::default();

            for entry in &page.items {
                match entry.kind {
                    ResourceType::Directory => {
                        match self
                            .scan(public_key, &entry.remote_path, local_root, options)
                            .await
                        {
                            Ok(subtree) => stats += subtree,
                            Err(e) => {
                                error!("Failed to scan subdirectory {}: {}", entry.remote_path, e)
                            }
                        }
                    }
                    ResourceType::File => {
                        if options.metadata_only {
                            continue;
                        }
                        if entry.download_url.is_none() {
                            debug!("No download link for {}, not counted", entry.remote_path);
                            continue;
                        }
                        let Some((dir, file_name)) =
                            paths::local_file(local_root, &entry.remote_path)
                        else {
                            continue;
                        };
                        if options.update_only
                            && tokio::fs::try_exists(dir.join(file_name))
                                .await
                                .unwrap_or(false)
                        {
                            continue;
                        }
                        stats.file_count += 1;
                        stats.total_bytes += entry.size.unwrap_or(0);
                    }
                }
            }
            Ok(stats)
        }
        .boxed()
    }
}
