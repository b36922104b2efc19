use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::downloader::DEFAULT_USER_AGENT;
use crate::html_parser::DEFAULT_DOMAIN;
use crate::mirror::MirrorConfig;

#[derive(Parser, Debug)]
#[command(
    name = "pdf-mirror",
    about = "Mirror PDF uploads linked from a crawled website",
    version,
    long_about = "Scans the HTML files of a locally mirrored site for absolute links to PDF uploads, downloads each PDF into <root>/mirror-pdfs and rewrites the links to point at the local copies."
)]
pub struct MirrorCommand {
    /// Path to the mirrored site root
    #[arg(long, default_value = "cloned-site/www.dasoftn.in")]
    pub root: PathBuf,

    /// Download timeout in seconds per file
    #[arg(long, default_value = "45", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// Optional cap for number of PDFs to download (0 = all)
    #[arg(long, default_value = "0")]
    pub limit: usize,

    /// Exit with code 2 if any PDF download fails
    #[arg(long)]
    pub fail_on_errors: bool,

    /// Host whose /wp-content/uploads/ PDFs are mirrored
    #[arg(long, default_value = DEFAULT_DOMAIN)]
    pub domain: String,

    /// User agent string to use for requests
    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// List what would be fetched without downloading or rewriting anything
    #[arg(long)]
    pub dry_run: bool,

    /// Increase diagnostic output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only report errors in diagnostic output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl MirrorCommand {
    pub fn to_config(&self) -> MirrorConfig {
        MirrorConfig {
            root: self.root.clone(),
            timeout: Duration::from_secs(self.timeout),
            limit: self.limit,
            fail_on_errors: self.fail_on_errors,
            domain: self.domain.clone(),
            user_agent: self.user_agent.clone(),
            dry_run: self.dry_run,
        }
    }

    /// Default tracing filter when `RUST_LOG` is not set.
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "debug",
                _ => "trace",
            }
        }
    }
}
