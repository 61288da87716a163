//! Process-wide settings and the local credentials file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::{Result, SyncError};

/// Default name of the credentials file, looked up in the working directory.
pub const CREDENTIALS_FILE: &str = ".ydmirror.toml";

/// Key under `[keys]` that holds the OAuth token.
const OAUTH_KEY: &str = "yandex_oauth";

/// Configuration for talking to the public resources API.
///
/// Built once at startup and handed by reference to every stage; nothing
/// mutates it during a run.
///
/// # Example
///
/// ```
/// use ydmirror::SyncConfig;
/// use std::time::Duration;
///
/// let config = SyncConfig {
///     max_retries: 5,
///     timeout: Duration::from_secs(60),
///     ..SyncConfig::default()
/// };
/// assert!(config.resources_url().ends_with("/public/resources"));
/// ```
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the disk API (e.g. `https://cloud-api.yandex.net/v1/disk`)
    pub api_base_url: String,
    /// Per-request timeout; for streamed bodies it bounds each chunk read.
    pub timeout: Duration,
    /// Retries after the first attempt on 429/5xx and network failures.
    pub max_retries: u32,
    /// Backoff before retry `n` is `backoff_factor * 2^n` seconds.
    pub backoff_factor: f64,
    /// Upper bound for a single exponential backoff sleep.
    pub max_backoff: Duration,
    /// Write buffer size used while streaming bodies to disk.
    pub chunk_size: usize,
    pub user_agent: String,
    /// OAuth token sent as `Authorization: OAuth <token>`.
    pub oauth_token: Option<String>,
    /// External download helper (aria2c) executable, when that transport is selected.
    pub helper_path: Option<PathBuf>,
    /// Draw progress bars for downloads.
    pub show_progress: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://cloud-api.yandex.net/v1/disk".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff_factor: 1.0,
            max_backoff: Duration::from_secs(120),
            chunk_size: 32 * 1024,
            user_agent: format!("ydmirror/{}", env!("CARGO_PKG_VERSION")),
            oauth_token: None,
            helper_path: None,
            show_progress: true,
        }
    }
}

impl SyncConfig {
    /// Listing endpoint.
    pub fn resources_url(&self) -> String {
        format!("{}/public/resources", self.base())
    }

    /// Download-link endpoint.
    pub fn download_link_url(&self) -> String {
        format!("{}/public/resources/download", self.base())
    }

    fn base(&self) -> &str {
        self.api_base_url.trim_end_matches('/')
    }
}

/// Contents of the credentials file.
///
/// ```toml
/// [keys]
/// yandex_oauth = "y0_..."
/// ```
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub keys: BTreeMap<String, String>,
}

impl Credentials {
    /// Reads the credentials file. A missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(SyncError::io(path, e)),
        };

        toml::from_str(&text).map_err(|e| {
            let message = format!("invalid credentials file {}: {}", path.display(), e);
            SyncError::Config(message)
        })
    }

    /// Stores `token` as the OAuth key, keeping any other keys in the file.
    pub fn save_oauth_token(path: &Path, token: &str) -> Result<()> {
        let mut credentials = Self::load(path)?;
        credentials
            .keys
            .insert(OAUTH_KEY.to_string(), token.to_string());

        let text = toml::to_string(&credentials)
            .map_err(|e| SyncError::Config(format!("credentials: {}", e)))?;
        std::fs::write(path, text).map_err(|e| SyncError::io(path, e))?;
        info!("Configuration saved at {}", path.display());
        Ok(())
    }

    pub fn oauth_token(&self) -> Option<&str> {
        self.keys.get(OAUTH_KEY).map(String::as_str)
    }
}
