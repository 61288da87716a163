//! Download delegation to an external `aria2c` process.

use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::info;

use crate::config::SyncConfig;
use crate::download::{filename_from_url, DownloadReceipt, DownloadRequest, Downloader};
use crate::error::{Result, SyncError};

/// How long a single helper invocation may run.
const HELPER_TIMEOUT: Duration = Duration::from_secs(3600);

/// Runs `aria2c` for every file instead of streaming through reqwest.
///
/// Process failures (missing executable, non-zero exit, timeout) surface as
/// [`SyncError::Io`], the same as a failed local write.
pub struct Aria2Downloader {
    executable: PathBuf,
    timeout: Duration,
}

impl Aria2Downloader {
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let executable = config.helper_path.clone().ok_or_else(|| {
            SyncError::Config("helper transport selected but no aria2c path given".into())
        })?;
        Ok(Self::new(executable))
    }

    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            timeout: HELPER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Downloader for Aria2Downloader {
    async fn download(&self, request: &DownloadRequest) -> Result<DownloadReceipt> {
        let filename = request
            .filename
            .clone()
            .unwrap_or_else(|| filename_from_url(&request.url));
        let dir = request.dest_dir.clone().unwrap_or_default();
        let path = dir.join(&filename);

        let mut command = Command::new(&self.executable);
        command.arg("--retry-wait=10");
        if request.resume {
            command.arg("--continue=true");
        }
        if !dir.as_os_str().is_empty() {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| SyncError::io(&dir, e))?;
            command.arg("-d").arg(&dir);
        }
        command
            .arg("--out")
            .arg(&filename)
            .arg(&request.url)
            .kill_on_drop(true);

        let status = match tokio::time::timeout(self.timeout, command.status()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(SyncError::io(&self.executable, e)),
            Err(_) => {
                return Err(SyncError::io(
                    &path,
                    io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!(
                            "{} did not finish within {:?}",
                            self.executable.display(),
                            self.timeout
                        ),
                    ),
                ));
            }
        };

        if !status.success() {
            return Err(SyncError::io(
                &path,
                io::Error::other(format!(
                    "{} exited with {}",
                    self.executable.display(),
                    status
                )),
            ));
        }

        let bytes_written = tokio::fs::metadata(&path)
            .await
            .map(|meta| meta.len())
            .unwrap_or(0);
        info!("Successfully downloaded {} using aria2", path.display());

        Ok(DownloadReceipt {
            path,
            resumed_from: 0,
            bytes_written,
        })
    }

    fn name(&self) -> &'static str {
        "aria2"
    }
}
