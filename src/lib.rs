pub mod cli;
pub mod downloader;
pub mod error;
pub mod file_manager;
pub mod html_parser;
pub mod mirror;
pub mod url_path;

// Re-export main types for convenience
pub use cli::MirrorCommand;
pub use downloader::{download_pdf, HttpFetcher, PdfFetcher};
pub use error::{DownloadError, MirrorError};
pub use file_manager::FileManager;
pub use html_parser::{rewrite_links, PdfLinkExtractor};
pub use mirror::{DownloadOutcome, MirrorConfig, MirrorReport, PdfMirror};
pub use url_path::{normalized_upload_path, request_url};
