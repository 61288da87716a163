//! Data structures shared by the listing, scanning and mirroring stages.

use bytes::Bytes;
use serde::Deserialize;
use std::ops::AddAssign;
use tracing::{debug, warn};

use crate::error::{Result, SyncError};

/// Kind of a remote resource or listing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    File,
    Directory,
}

impl ResourceType {
    fn from_api(kind: &str) -> Option<Self> {
        match kind {
            "file" => Some(ResourceType::File),
            "dir" => Some(ResourceType::Directory),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceType::File => f.pad("file"),
            ResourceType::Directory => f.pad("directory"),
        }
    }
}

/// One usable item of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub kind: ResourceType,
    /// Slash-delimited path relative to the public resource root.
    pub remote_path: String,
    /// Direct download link, only ever set for files.
    pub download_url: Option<String>,
    /// Declared size in bytes, only ever set for files.
    pub size: Option<u64>,
}

/// One listing response for a `(resource, path)` pair.
///
/// `raw_body` keeps the exact bytes received so the metadata snapshot on
/// disk is the response itself, not a re-serialization of it.
#[derive(Debug, Clone)]
pub struct DirectoryPage {
    pub resource_type: ResourceType,
    pub name: Option<String>,
    /// Size of the resource itself (files only).
    pub size: Option<u64>,
    pub items: Vec<RemoteEntry>,
    /// Total number of children the API reports, which may exceed `items`.
    pub total: Option<u64>,
    /// Entries dropped because they lacked a path or had an unknown type.
    pub skipped_entries: usize,
    pub raw_body: Bytes,
}

#[derive(Deserialize)]
struct ApiResource {
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    size: Option<u64>,
    #[serde(rename = "_embedded")]
    embedded: Option<ApiEmbedded>,
}

#[derive(Deserialize)]
struct ApiEmbedded {
    #[serde(default)]
    items: Vec<serde_json::Value>,
    total: Option<u64>,
}

#[derive(Deserialize)]
struct ApiItem {
    path: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    file: Option<String>,
    size: Option<u64>,
}

impl DirectoryPage {
    /// Parses a listing response body.
    ///
    /// Only a body that is not a JSON object at all is an error; individual
    /// malformed items are skipped and counted in `skipped_entries`.
    pub fn parse(url: &str, raw_body: Bytes) -> Result<Self> {
        let resource: ApiResource =
            serde_json::from_slice(&raw_body).map_err(|e| SyncError::InvalidResponse {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let resource_type = resource
            .kind
            .as_deref()
            .and_then(ResourceType::from_api)
            .unwrap_or(ResourceType::File);

        let mut items = Vec::new();
        let mut skipped_entries = 0;
        let mut total = None;

        if let Some(embedded) = resource.embedded {
            total = embedded.total;
            for value in embedded.items {
                match entry_from_value(value) {
                    Some(entry) => items.push(entry),
                    None => skipped_entries += 1,
                }
            }
        }

        if skipped_entries > 0 {
            debug!("Skipped {} unusable entries in {}", skipped_entries, url);
        }

        Ok(Self {
            resource_type,
            name: resource.name,
            size: resource.size,
            items,
            total,
            skipped_entries,
            raw_body,
        })
    }

    /// Whether the API holds more children than this single page returned.
    pub fn is_truncated(&self) -> bool {
        let seen = (self.items.len() + self.skipped_entries) as u64;
        self.total.is_some_and(|total| total > seen)
    }
}

fn entry_from_value(value: serde_json::Value) -> Option<RemoteEntry> {
    let item: ApiItem = match serde_json::from_value(value) {
        Ok(item) => item,
        Err(e) => {
            warn!("Ignoring malformed listing entry: {}", e);
            return None;
        }
    };

    let remote_path = item.path?;
    let kind = item.kind.as_deref().and_then(ResourceType::from_api)?;

    Some(match kind {
        ResourceType::File => RemoteEntry {
            kind,
            remote_path,
            download_url: item.file,
            size: item.size,
        },
        ResourceType::Directory => RemoteEntry {
            kind,
            remote_path,
            download_url: None,
            size: None,
        },
    })
}

/// Switches shared by the scanner, the walker and the orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Skip files that already exist locally, whatever their content.
    pub update_only: bool,
    /// Persist listings only, never download file bodies.
    pub metadata_only: bool,
}

/// Aggregate of what a sync would download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub file_count: u64,
    pub total_bytes: u64,
}

impl AddAssign for ScanStats {
    fn add_assign(&mut self, other: Self) {
        self.file_count += other.file_count;
        self.total_bytes += other.total_bytes;
    }
}

/// What a recursive walk did, accumulated bottom-up from each subtree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkSummary {
    pub directories: u64,
    pub files_downloaded: u64,
    pub files_skipped: u64,
    pub failures: u64,
}

impl AddAssign for WalkSummary {
    fn add_assign(&mut self, other: Self) {
        self.directories += other.directories;
        self.files_downloaded += other.files_downloaded;
        self.files_skipped += other.files_skipped;
        self.failures += other.failures;
    }
}

/// Result of a directory walk.
#[derive(Debug, Clone)]
pub enum WalkOutcome {
    /// Non-recursive walk: the single page that was fetched and persisted.
    Listing(DirectoryPage),
    /// Recursive walk over the whole subtree.
    Mirrored(WalkSummary),
}
