//! Mapping of remote paths onto the local output tree, and public link helpers.

use std::path::{Path, PathBuf};

/// Name of the listing snapshot written in every visited directory.
pub const METADATA_FILE: &str = "_metadata.json";

/// Splits a remote path into local path components.
///
/// Segments are right-trimmed; empty or whitespace-only segments are dropped,
/// as are `.` and `..` so a listing can never point outside the output root.
pub fn local_components(remote_path: &str) -> Vec<String> {
    remote_path
        .split('/')
        .filter(|segment| !segment.trim().is_empty())
        .map(|segment| segment.trim_end().to_string())
        .filter(|segment| segment != "." && segment != "..")
        .collect()
}

/// Local directory for a remote directory path.
pub fn local_dir(root: &Path, remote_path: &str) -> PathBuf {
    let mut dir = root.to_path_buf();
    dir.extend(local_components(remote_path));
    dir
}

/// Local directory and file name for a remote file path.
///
/// Returns `None` when the path has no usable segment at all.
pub fn local_file(root: &Path, remote_path: &str) -> Option<(PathBuf, String)> {
    let mut components = local_components(remote_path);
    let file_name = components.pop()?;
    let mut dir = root.to_path_buf();
    dir.extend(components);
    Some((dir, file_name))
}

/// Checks that `url` looks like a public Yandex.Disk link
/// (`https://disk.yandex.{ru,com}/{d,i}/<id>`).
pub fn is_public_link(url: &str) -> bool {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return false;
    };
    if parsed.scheme() != "https" {
        return false;
    }
    let host = parsed.host_str().unwrap_or_default();
    if !matches!(host, "disk.yandex.ru" | "disk.yandex.com") {
        return false;
    }

    let mut segments = match parsed.path_segments() {
        Some(segments) => segments,
        None => return false,
    };
    let kind = segments.next().unwrap_or_default();
    let id = segments.next().unwrap_or_default();

    matches!(kind, "d" | "i")
        && !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Output directory used by `sync` when none is given: the link id after `/d/`.
pub fn default_sync_dir(url: &str) -> PathBuf {
    let id = url.rsplit_once("/d/").map_or(url, |(_, id)| id);
    PathBuf::from(sanitize_dir_name(id))
}

/// Output directory used by `full` when none is given: the last link segment.
pub fn default_full_dir(url: &str) -> PathBuf {
    let id = url.trim_end_matches('/').rsplit('/').next().unwrap_or(url);
    PathBuf::from(sanitize_dir_name(id))
}

fn sanitize_dir_name(name: &str) -> String {
    let components = local_components(name);
    if components.is_empty() {
        "download".to_string()
    } else {
        components.join("_")
    }
}
