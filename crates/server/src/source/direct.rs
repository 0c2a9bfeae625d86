use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{detect_format, staging_dir, StagedFile};
use crate::error::ImportError;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Fetches audio from a plain HTTP(S) link into a scratch file.
pub struct DirectDownloader {
    http: Client,
    timeout: Duration,
}

impl DirectDownloader {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            timeout: DOWNLOAD_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn download(&self, url: &str) -> Result<StagedFile, ImportError> {
        let mut response = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| ImportError::DownloadFailed(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ImportError::DownloadFailed(format!("http {}", response.status())));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();
        let format = detect_format(url, &content_type);

        let workdir = staging_dir("audio-import-")?;
        let path = workdir.path().join(format!("audio.{}", format.extension()));
        let mut file = tokio::fs::File::create(&path).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|err| ImportError::DownloadFailed(err.to_string()))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!("Downloaded {} bytes of {} audio from {}", written, format, url);
        Ok(StagedFile::new(workdir, path, format))
    }
}
