use std::path::PathBuf;
use thiserror::Error;

/// Why a single PDF could not be mirrored.
///
/// These never abort a run; the orchestrator records the message next to the
/// URL and moves on to the next one.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("timed out fetching {url}")]
    Timeout { url: String },

    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("failed to write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return DownloadError::Timeout { url: url.to_string() };
        }
        if let Some(status) = err.status() {
            return DownloadError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            };
        }
        DownloadError::Network {
            url: url.to_string(),
            source: err,
        }
    }
}

/// Fatal errors that stop a run before or after the download loop.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Root directory does not exist: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("Root is not a directory: {}", .0.display())]
    RootNotDirectory(PathBuf),

    #[error("invalid domain pattern {domain}: {source}")]
    InvalidDomain {
        domain: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("failed to write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MirrorError {
    /// Process exit code for a run that ended in this error.
    pub fn exit_code(&self) -> u8 {
        1
    }
}
