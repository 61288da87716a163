#![allow(dead_code)]

use async_trait::async_trait;
use mockito::{Matcher, Mock, ServerGuard};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use ydmirror::{DownloadReceipt, DownloadRequest, Downloader, SyncConfig, SyncError};

pub const PUBLIC_KEY: &str = "https://disk.yandex.ru/d/test123";
pub const RESOURCES_PATH: &str = "/v1/disk/public/resources";
pub const DOWNLOAD_LINK_PATH: &str = "/v1/disk/public/resources/download";

/// Config pointing at the mock server, with no backoff and no progress bars.
pub fn test_config(server: &ServerGuard) -> SyncConfig {
    SyncConfig {
        api_base_url: format!("{}/v1/disk", server.url()),
        timeout: Duration::from_secs(5),
        max_retries: 0,
        backoff_factor: 0.0,
        show_progress: false,
        ..SyncConfig::default()
    }
}

fn listing(server: &mut ServerGuard, path: &str, body: &str) -> Mock {
    server
        .mock("GET", RESOURCES_PATH)
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("public_key".into(), PUBLIC_KEY.into()),
            Matcher::UrlEncoded("path".into(), path.into()),
            Matcher::UrlEncoded("limit".into(), "1000".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body)
}

/// Mocks the listing request for `path` (one page, limit 1000).
pub async fn mock_listing(server: &mut ServerGuard, path: &str, body: &str) -> Mock {
    listing(server, path, body).create_async().await
}

/// Same as [`mock_listing`] but asserting the number of hits.
pub async fn mock_listing_hits(
    server: &mut ServerGuard,
    path: &str,
    body: &str,
    hits: usize,
) -> Mock {
    listing(server, path, body)
        .expect(hits)
        .create_async()
        .await
}

/// Mocks the resource metadata request (public key only, no path).
pub async fn mock_resource(server: &mut ServerGuard, body: &str) -> Mock {
    server
        .mock("GET", RESOURCES_PATH)
        .match_query(Matcher::Regex("^public_key=[^&]*$".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await
}

/// Downloader double that records requests instead of fetching anything.
#[derive(Clone, Default)]
pub struct RecordingDownloader {
    pub requests: Arc<Mutex<Vec<DownloadRequest>>>,
    pub fail_urls: Vec<String>,
}

impl RecordingDownloader {
    pub fn failing_on(urls: &[&str]) -> Self {
        Self {
            requests: Arc::default(),
            fail_urls: urls.iter().map(|u| u.to_string()).collect(),
        }
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.url.clone())
            .collect()
    }
}

#[async_trait]
impl Downloader for RecordingDownloader {
    async fn download(&self, request: &DownloadRequest) -> ydmirror::Result<DownloadReceipt> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail_urls.contains(&request.url) {
            return Err(SyncError::Resource(format!("refusing {}", request.url)));
        }

        let dir = request.dest_dir.clone().unwrap_or_default();
        let name = request
            .filename
            .clone()
            .unwrap_or_else(|| "download".into());
        Ok(DownloadReceipt {
            path: PathBuf::from(dir).join(name),
            resumed_from: 0,
            bytes_written: request.expected_size.unwrap_or(0),
        })
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
