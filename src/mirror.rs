use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::downloader::{download_pdf, HttpFetcher, PdfFetcher};
use crate::error::{DownloadError, MirrorError};
use crate::file_manager::FileManager;
use crate::html_parser::{rewrite_links, PdfLinkExtractor};
use crate::url_path::normalized_upload_path;

/// Everything a run needs to know, resolved from the command line.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub root: PathBuf,
    pub timeout: Duration,
    /// Process at most this many unique URLs, 0 for all of them.
    pub limit: usize,
    pub fail_on_errors: bool,
    pub domain: String,
    pub user_agent: String,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    AlreadyPresent,
    Downloaded,
    Failed(String),
}

/// Counts for the end-of-run summary.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MirrorReport {
    /// HTML files that reference at least one PDF.
    pub html_files: usize,
    pub unique_urls: usize,
    pub processed: usize,
    pub downloaded: usize,
    pub already_present: usize,
    pub rewritten_files: usize,
    /// `(url, error message)` in processing order.
    pub failures: Vec<(String, String)>,
}

impl MirrorReport {
    /// URLs that ended up on disk, whether fetched now or by an earlier run.
    pub fn succeeded(&self) -> usize {
        self.downloaded + self.already_present
    }

    pub fn exit_code(&self, fail_on_errors: bool) -> u8 {
        if fail_on_errors && !self.failures.is_empty() {
            2
        } else {
            0
        }
    }
}

/// Result of scanning the site's HTML before anything is fetched.
#[derive(Debug, Default)]
struct SiteScan {
    html_refs: BTreeMap<PathBuf, BTreeSet<String>>,
    targets: BTreeMap<String, PathBuf>,
}

pub struct PdfMirror {
    config: MirrorConfig,
    fetcher: Box<dyn PdfFetcher>,
}

impl PdfMirror {
    pub fn new(config: MirrorConfig, fetcher: Box<dyn PdfFetcher>) -> Self {
        Self { config, fetcher }
    }

    /// Mirror backed by a real HTTP client built from the config.
    pub fn with_http(config: MirrorConfig) -> Result<Self, MirrorError> {
        let fetcher = HttpFetcher::new(&config.user_agent, config.timeout)?;
        Ok(Self::new(config, Box::new(fetcher)))
    }

    pub async fn run(&self) -> Result<MirrorReport, MirrorError> {
        let file_manager = FileManager::new(&self.config.root)?;
        let extractor = PdfLinkExtractor::new(&self.config.domain)?;
        tracing::info!(root = ?file_manager.base_dir(), domain = %self.config.domain, "Scanning site");

        let scan = self.scan_site(&file_manager, &extractor);
        let mut report = MirrorReport {
            html_files: scan.html_refs.len(),
            unique_urls: scan.targets.len(),
            ..MirrorReport::default()
        };

        println!(
            "Found {} unique PDF links across {} HTML files",
            report.unique_urls, report.html_files
        );

        let selected = self.select_urls(&scan.targets);
        report.processed = selected.len();
        if self.config.limit > 0 {
            println!(
                "Applying --limit={}; processing {} URLs",
                self.config.limit,
                selected.len()
            );
        }

        if self.config.dry_run {
            self.plan(&file_manager, &scan, &selected);
            return Ok(report);
        }

        let successful = self
            .download_all(&file_manager, &scan, &selected, &mut report)
            .await;

        report.rewritten_files = self.rewrite_pages(&file_manager, &scan, &successful)?;

        println!("Downloaded {} PDFs", report.succeeded());
        println!("Rewrote links in {} HTML files", report.rewritten_files);
        if !report.failures.is_empty() {
            eprintln!("Failed to fetch {} PDFs", report.failures.len());
        }
        tracing::info!(
            downloaded = report.downloaded,
            already_present = report.already_present,
            failed = report.failures.len(),
            "Mirror run finished"
        );

        Ok(report)
    }

    fn scan_site(&self, file_manager: &FileManager, extractor: &PdfLinkExtractor) -> SiteScan {
        let mut scan = SiteScan::default();

        for html_file in file_manager.html_files() {
            let html_content = match file_manager.read_html(&html_file) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(file = ?html_file, error = %format!("{:#}", e), "Skipping unreadable HTML file");
                    continue;
                }
            };

            let urls = extractor.extract(&html_content);
            if urls.is_empty() {
                continue;
            }
            tracing::debug!(file = ?html_file, links = urls.len(), "Found PDF links");

            for url in &urls {
                if !scan.targets.contains_key(url) {
                    let dest = file_manager.destination_for(&normalized_upload_path(url));
                    scan.targets.insert(url.clone(), dest);
                }
            }
            scan.html_refs.insert(html_file, urls);
        }

        scan
    }

    /// The sorted URL set, cut to the configured limit.
    fn select_urls<'a>(&self, targets: &'a BTreeMap<String, PathBuf>) -> Vec<&'a str> {
        let take = if self.config.limit > 0 {
            self.config.limit
        } else {
            usize::MAX
        };
        targets.keys().map(String::as_str).take(take).collect()
    }

    fn plan(&self, file_manager: &FileManager, scan: &SiteScan, selected: &[&str]) {
        for url in selected {
            let dest = &scan.targets[*url];
            if !file_manager.is_present(dest) {
                println!("WOULD FETCH {} -> {}", url, file_manager.get_relative_path(dest));
            }
        }
    }

    async fn download_all(
        &self,
        file_manager: &FileManager,
        scan: &SiteScan,
        selected: &[&str],
        report: &mut MirrorReport,
    ) -> BTreeSet<String> {
        let progress_bar = ProgressBar::new(selected.len() as u64);
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("{bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let mut successful = BTreeSet::new();
        for url in selected {
            let dest = &scan.targets[*url];
            progress_bar.set_message(url.to_string());

            match self.mirror_one(file_manager, url, dest).await {
                DownloadOutcome::Failed(reason) => {
                    progress_bar.suspend(|| eprintln!("{} {} :: {}", "FAIL".red(), url, reason));
                    report.failures.push((url.to_string(), reason));
                }
                outcome => {
                    if outcome == DownloadOutcome::Downloaded {
                        report.downloaded += 1;
                    } else {
                        report.already_present += 1;
                    }
                    progress_bar.suspend(|| {
                        println!("{} {} -> {}", "OK".green(), url, file_manager.get_relative_path(dest))
                    });
                    successful.insert(url.to_string());
                }
            }
            progress_bar.inc(1);
        }

        progress_bar.finish_and_clear();
        successful
    }

    async fn mirror_one(&self, file_manager: &FileManager, url: &str, dest: &Path) -> DownloadOutcome {
        if file_manager.is_present(dest) {
            tracing::debug!(url, "Already mirrored, skipping download");
            return DownloadOutcome::AlreadyPresent;
        }

        match download_pdf(self.fetcher.as_ref(), file_manager, url, dest).await {
            Ok(()) => DownloadOutcome::Downloaded,
            Err(e) => {
                tracing::debug!(url, error = ?e, "Download failed");
                DownloadOutcome::Failed(describe(&e))
            }
        }
    }

    /// Points links at local copies, for successful URLs only. Returns the
    /// number of files that changed.
    fn rewrite_pages(
        &self,
        file_manager: &FileManager,
        scan: &SiteScan,
        successful: &BTreeSet<String>,
    ) -> Result<usize, MirrorError> {
        let mut rewritten_files = 0;

        for (html_file, urls) in &scan.html_refs {
            let replacements: BTreeMap<String, String> = urls
                .iter()
                .filter(|url| successful.contains(*url))
                .map(|url| {
                    let link = file_manager.relative_link(html_file, &scan.targets[url]);
                    (url.clone(), link)
                })
                .collect();
            if replacements.is_empty() {
                continue;
            }

            let html_content = match file_manager.read_html(html_file) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(file = ?html_file, error = %format!("{:#}", e), "Skipping unreadable HTML file");
                    continue;
                }
            };

            if let Cow::Owned(modified_html) = rewrite_links(&html_content, &replacements) {
                if modified_html != html_content {
                    file_manager
                        .write_html(html_file, &modified_html)
                        .map_err(|source| MirrorError::Io {
                            path: html_file.clone(),
                            source,
                        })?;
                    tracing::debug!(file = ?html_file, links = replacements.len(), "Rewrote HTML file");
                    rewritten_files += 1;
                }
            }
        }

        Ok(rewritten_files)
    }
}

// Our messages already embed the direct source; append the deeper causes so
// transport details such as "connection refused" reach the FAIL line.
fn describe(err: &DownloadError) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err).and_then(|cause| cause.source());
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::MockPdfFetcher;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    const URL_A: &str = "https://www.dasoftn.in/wp-content/uploads/2020/01/a.pdf";
    const URL_B: &str = "https://www.dasoftn.in/wp-content/uploads/2020/01/b.pdf";
    const URL_C: &str = "https://www.dasoftn.in/wp-content/uploads/2020/01/c.pdf";

    fn config(root: &Path) -> MirrorConfig {
        MirrorConfig {
            root: root.to_path_buf(),
            timeout: Duration::from_secs(45),
            limit: 0,
            fail_on_errors: false,
            domain: "www.dasoftn.in".to_string(),
            user_agent: "test".to_string(),
            dry_run: false,
        }
    }

    fn site() -> TempDir {
        let temp_dir = tempdir().unwrap();
        fs::write(
            temp_dir.path().join("index.html"),
            format!(r#"<a href="{URL_A}">A</a> <a href="{URL_B}">B</a>"#),
        )
        .unwrap();
        fs::create_dir_all(temp_dir.path().join("docs")).unwrap();
        fs::write(
            temp_dir.path().join("docs/list.html"),
            format!(r#"<a href="{URL_C}">C</a> <a href="{URL_A}">A again</a>"#),
        )
        .unwrap();
        temp_dir
    }

    fn fetcher_ok(times: usize) -> MockPdfFetcher {
        let mut fetcher = MockPdfFetcher::new();
        fetcher
            .expect_fetch()
            .times(times)
            .returning(|url| Ok(format!("%PDF {url}").into_bytes()));
        fetcher
    }

    #[tokio::test]
    async fn test_run_downloads_and_rewrites() {
        let temp_dir = site();
        let mirror = PdfMirror::new(config(temp_dir.path()), Box::new(fetcher_ok(3)));

        let report = mirror.run().await.unwrap();
        assert_eq!(report.html_files, 2);
        assert_eq!(report.unique_urls, 3);
        assert_eq!(report.processed, 3);
        assert_eq!(report.downloaded, 3);
        assert_eq!(report.rewritten_files, 2);
        assert_eq!(report.exit_code(true), 0);

        let pdf = temp_dir.path().join("mirror-pdfs/wp-content/uploads/2020/01/a.pdf");
        assert_eq!(fs::read_to_string(pdf).unwrap(), format!("%PDF {URL_A}"));

        let nested = fs::read_to_string(temp_dir.path().join("docs/list.html")).unwrap();
        assert_eq!(
            nested,
            r#"<a href="../mirror-pdfs/wp-content/uploads/2020/01/c.pdf">C</a> <a href="../mirror-pdfs/wp-content/uploads/2020/01/a.pdf">A again</a>"#
        );
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let temp_dir = site();
        PdfMirror::new(config(temp_dir.path()), Box::new(fetcher_ok(3)))
            .run()
            .await
            .unwrap();
        let index_after_first = fs::read(temp_dir.path().join("index.html")).unwrap();

        let mut fetcher = MockPdfFetcher::new();
        fetcher.expect_fetch().never();
        let report = PdfMirror::new(config(temp_dir.path()), Box::new(fetcher))
            .run()
            .await
            .unwrap();

        assert_eq!(report.downloaded, 0);
        assert_eq!(report.already_present, 0, "links were already rewritten");
        assert_eq!(report.rewritten_files, 0);
        assert_eq!(fs::read(temp_dir.path().join("index.html")).unwrap(), index_after_first);
    }

    #[tokio::test]
    async fn test_present_files_are_not_fetched_again() {
        let temp_dir = site();
        let existing = temp_dir.path().join("mirror-pdfs/wp-content/uploads/2020/01/b.pdf");
        fs::create_dir_all(existing.parent().unwrap()).unwrap();
        fs::write(&existing, b"cached").unwrap();

        let mut fetcher = MockPdfFetcher::new();
        fetcher
            .expect_fetch()
            .withf(|url| url.to_string() != URL_B)
            .times(2)
            .returning(|_| Ok(b"%PDF".to_vec()));

        let report = PdfMirror::new(config(temp_dir.path()), Box::new(fetcher))
            .run()
            .await
            .unwrap();

        assert_eq!(report.downloaded, 2);
        assert_eq!(report.already_present, 1);
        assert_eq!(report.succeeded(), 3);
        assert_eq!(fs::read(existing).unwrap(), b"cached");
    }

    #[tokio::test]
    async fn test_empty_file_is_downloaded_again() {
        let temp_dir = site();
        let empty = temp_dir.path().join("mirror-pdfs/wp-content/uploads/2020/01/a.pdf");
        fs::create_dir_all(empty.parent().unwrap()).unwrap();
        fs::write(&empty, b"").unwrap();

        let report = PdfMirror::new(config(temp_dir.path()), Box::new(fetcher_ok(3)))
            .run()
            .await
            .unwrap();

        assert_eq!(report.downloaded, 3);
        assert!(fs::metadata(empty).unwrap().len() > 0);
    }

    #[tokio::test]
    async fn test_failed_url_is_left_untouched() {
        let temp_dir = site();
        let mut fetcher = MockPdfFetcher::new();
        fetcher.expect_fetch().times(3).returning(|url| {
            if url.to_string() == URL_A {
                Err(DownloadError::HttpStatus {
                    url: url.to_string(),
                    status: 404,
                })
            } else {
                Ok(b"%PDF".to_vec())
            }
        });

        let report = PdfMirror::new(config(temp_dir.path()), Box::new(fetcher))
            .run()
            .await
            .unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, URL_A);
        assert!(report.failures[0].1.contains("404"));
        assert_eq!(report.exit_code(false), 0);
        assert_eq!(report.exit_code(true), 2);

        for page in ["index.html", "docs/list.html"] {
            let html = fs::read_to_string(temp_dir.path().join(page)).unwrap();
            assert!(html.contains(URL_A), "{page} lost the failed URL");
        }
        let index = fs::read_to_string(temp_dir.path().join("index.html")).unwrap();
        assert!(!index.contains(URL_B));
        assert!(!temp_dir.path().join("mirror-pdfs/wp-content/uploads/2020/01/a.pdf").exists());
    }

    #[tokio::test]
    async fn test_limit_takes_first_sorted_urls() {
        let temp_dir = site();
        let mut fetcher = MockPdfFetcher::new();
        fetcher
            .expect_fetch()
            .withf(|url| url.to_string() == URL_A || url.to_string() == URL_B)
            .times(2)
            .returning(|_| Ok(b"%PDF".to_vec()));

        let mut config = config(temp_dir.path());
        config.limit = 2;
        let report = PdfMirror::new(config, Box::new(fetcher)).run().await.unwrap();

        assert_eq!(report.unique_urls, 3);
        assert_eq!(report.processed, 2);

        let nested = fs::read_to_string(temp_dir.path().join("docs/list.html")).unwrap();
        assert!(nested.contains(URL_C), "URLs past the limit are not rewritten");
        assert!(!nested.contains(URL_A));
    }

    #[tokio::test]
    async fn test_limit_larger_than_url_count() {
        let temp_dir = site();
        let mut config = config(temp_dir.path());
        config.limit = 10;

        let report = PdfMirror::new(config, Box::new(fetcher_ok(3))).run().await.unwrap();
        assert_eq!(report.processed, 3);
    }

    #[tokio::test]
    async fn test_dry_run_changes_nothing() {
        let temp_dir = site();
        let mut fetcher = MockPdfFetcher::new();
        fetcher.expect_fetch().never();

        let mut config = config(temp_dir.path());
        config.dry_run = true;
        let before = fs::read(temp_dir.path().join("index.html")).unwrap();

        let report = PdfMirror::new(config, Box::new(fetcher)).run().await.unwrap();
        assert_eq!(report.processed, 3);
        assert_eq!(report.rewritten_files, 0);
        assert_eq!(fs::read(temp_dir.path().join("index.html")).unwrap(), before);
        assert!(!temp_dir.path().join("mirror-pdfs").exists());
    }

    #[tokio::test]
    async fn test_missing_root_is_fatal() {
        let temp_dir = tempdir().unwrap();
        let mut fetcher = MockPdfFetcher::new();
        fetcher.expect_fetch().never();

        let mirror = PdfMirror::new(config(&temp_dir.path().join("nope")), Box::new(fetcher));
        let err = mirror.run().await.unwrap_err();
        assert!(matches!(err, MirrorError::RootNotFound(_)));
        assert_eq!(err.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_rewrite_keeps_latin1_bytes_outside_links() {
        let temp_dir = tempdir().unwrap();
        let page = temp_dir.path().join("menu.html");
        let mut original = b"<p>Caf\xe9 \xab carte \xbb</p><a href=\"".to_vec();
        original.extend_from_slice(URL_A.as_bytes());
        original.extend_from_slice(b"\">\xe9t\xe9</a>");
        fs::write(&page, &original).unwrap();

        let report = PdfMirror::new(config(temp_dir.path()), Box::new(fetcher_ok(1)))
            .run()
            .await
            .unwrap();
        assert_eq!(report.rewritten_files, 1);

        let expected = b"<p>Caf\xe9 \xab carte \xbb</p><a href=\"mirror-pdfs/wp-content/uploads/2020/01/a.pdf\">\xe9t\xe9</a>";
        assert_eq!(fs::read(&page).unwrap(), expected.to_vec());
    }

    #[tokio::test]
    async fn test_root_that_is_a_file_is_fatal() {
        let temp_dir = site();
        let mut fetcher = MockPdfFetcher::new();
        fetcher.expect_fetch().never();

        let mirror = PdfMirror::new(config(&temp_dir.path().join("index.html")), Box::new(fetcher));
        let err = mirror.run().await.unwrap_err();
        assert!(matches!(err, MirrorError::RootNotDirectory(_)), "{:?}", err);
        assert_eq!(err.exit_code(), 1);
        assert!(!temp_dir.path().join("mirror-pdfs").exists());
    }

    #[tokio::test]
    async fn test_site_without_links() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("index.html"), "<p>no pdfs here</p>").unwrap();
        let mut fetcher = MockPdfFetcher::new();
        fetcher.expect_fetch().never();

        let report = PdfMirror::new(config(temp_dir.path()), Box::new(fetcher))
            .run()
            .await
            .unwrap();
        assert_eq!(report, MirrorReport::default());
    }

    #[test]
    fn test_describe_includes_sources() {
        let err = DownloadError::Io {
            path: PathBuf::from("/tmp/x.pdf"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(describe(&err), "failed to write \"/tmp/x.pdf\": denied");
    }
}
