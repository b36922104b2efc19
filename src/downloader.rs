use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use std::path::Path;
use std::time::Duration;

use crate::error::{DownloadError, MirrorError};
use crate::file_manager::FileManager;
use crate::url_path::request_url;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (pdf-mirror-bot)";

/// Source of PDF bytes. The HTTP implementation is the only one in
/// production; tests substitute their own.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PdfFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadError>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, MirrorError> {
        let client = ClientBuilder::new()
            .use_rustls_tls()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(MirrorError::Client)?;

        Ok(Self { client })
    }
}

#[async_trait]
impl PdfFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let target = request_url(url).map_err(|e| DownloadError::InvalidUrl {
            url: url.to_string(),
            reason: format!("{:#}", e),
        })?;

        tracing::debug!(url, request = %target, "Sending request");
        let response = self
            .client
            .get(target)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| DownloadError::from_reqwest(url, e))?;

        let content = response
            .bytes()
            .await
            .map_err(|e| DownloadError::from_reqwest(url, e))?;

        tracing::debug!(url, bytes = content.len(), "Received response body");
        Ok(content.to_vec())
    }
}

/// Fetches `url` and stores the whole body at `dest`, overwriting it.
/// Parent directories are created by the file manager on write.
pub async fn download_pdf(
    fetcher: &dyn PdfFetcher,
    file_manager: &FileManager,
    url: &str,
    dest: &Path,
) -> Result<(), DownloadError> {
    let content = fetcher.fetch(url).await?;
    file_manager.save_file(dest, &content)
}
