//! Public resources API: listings, resource metadata and download links.

use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::paths::METADATA_FILE;
use crate::transport::HttpTransport;
use crate::types::DirectoryPage;

/// Entries requested per listing page. Only the first page of a directory
/// is ever fetched.
pub const PAGE_LIMIT: u32 = 1000;

/// Response of the download-link endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadLink {
    pub href: Option<String>,
    pub size: Option<u64>,
}

/// Client for the read-only public resources endpoints.
#[derive(Clone)]
pub struct ResourceApi {
    transport: HttpTransport,
    resources_url: String,
    download_link_url: String,
}

impl ResourceApi {
    pub fn new(transport: HttpTransport, config: &SyncConfig) -> Self {
        Self {
            transport,
            resources_url: config.resources_url(),
            download_link_url: config.download_link_url(),
        }
    }

    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    /// Fetches one listing page of `remote_path` inside the public resource.
    pub async fn fetch_listing(
        &self,
        public_key: &str,
        remote_path: &str,
    ) -> Result<DirectoryPage> {
        let limit = PAGE_LIMIT.to_string();
        let query = [
            ("public_key", public_key),
            ("path", remote_path),
            ("limit", limit.as_str()),
        ];
        debug!("Listing '{}' of {}", remote_path, public_key);

        let url = &self.resources_url;
        let body = self.transport.get_bytes(url, &query).await?;
        DirectoryPage::parse(url, body)
    }

    /// Fetches metadata of the public resource itself.
    pub async fn fetch_resource(&self, public_key: &str) -> Result<DirectoryPage> {
        info!("Retrieving metadata of {}", public_key);
        let body = self
            .transport
            .get_bytes(&self.resources_url, &[("public_key", public_key)])
            .await?;
        DirectoryPage::parse(&self.resources_url, body)
    }

    /// Asks for a direct download link of the whole resource.
    ///
    /// Directories are served as a single ZIP archive. A response without
    /// `href` is a [`SyncError::Resource`] and is not retried.
    pub async fn fetch_download_link(&self, public_key: &str) -> Result<DownloadLink> {
        let body = self
            .transport
            .get_bytes(&self.download_link_url, &[("public_key", public_key)])
            .await?;

        let link: DownloadLink =
            serde_json::from_slice(&body).map_err(|e| SyncError::InvalidResponse {
                url: self.download_link_url.clone(),
                message: e.to_string(),
            })?;

        if link.href.is_none() {
            return Err(SyncError::Resource(format!(
                "No download URL found for {}. \
                 Please verify that the URL is correct and the resource is publicly accessible.",
                public_key
            )));
        }
        Ok(link)
    }
}

/// Writes the listing body verbatim as `<dir>/_metadata.json`.
pub async fn persist_snapshot(dir: &Path, page: &DirectoryPage) -> Result<()> {
    let path = dir.join(METADATA_FILE);
    tokio::fs::write(&path, &page.raw_body)
        .await
        .map_err(|e| SyncError::io(&path, e))?;
    debug!("Saved metadata of {}", dir.display());
    Ok(())
}
