use regex::bytes::{NoExpand, Regex};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::MirrorError;

pub const DEFAULT_DOMAIN: &str = "www.dasoftn.in";

/// Finds absolute links to PDF uploads of one WordPress site.
#[derive(Clone, Debug)]
pub struct PdfLinkExtractor {
    pattern: Regex,
}

impl PdfLinkExtractor {
    pub fn new(domain: &str) -> Result<Self, MirrorError> {
        let pattern = format!(
            r#"(?i)https?://{}/wp-content/uploads/[^"'\s<>]+?\.pdf"#,
            regex::escape(domain)
        );
        let pattern = Regex::new(&pattern).map_err(|source| MirrorError::InvalidDomain {
            domain: domain.to_string(),
            source,
        })?;

        Ok(Self { pattern })
    }

    /// Distinct PDF URLs in `html_content`, exactly as written in the page.
    ///
    /// The page is scanned as raw bytes. A URL never spans invalid UTF-8, so
    /// every match converts to a `String` without loss.
    pub fn extract(&self, html_content: impl AsRef<[u8]>) -> BTreeSet<String> {
        self.pattern
            .find_iter(html_content.as_ref())
            .filter_map(|m| std::str::from_utf8(m.as_bytes()).ok())
            .map(str::to_string)
            .collect()
    }
}

/// Replaces every literal occurrence of each URL with its local link.
///
/// URLs are applied in sorted order. This is plain substring replacement, so
/// a URL that is a prefix of a longer unmatched string is replaced there too.
/// Bytes outside the URLs are left exactly as they were, whatever the page
/// encoding.
pub fn rewrite_links<'a>(html_content: &'a [u8], replacements: &BTreeMap<String, String>) -> Cow<'a, [u8]> {
    let mut modified_html = Cow::Borrowed(html_content);

    for (url, local_link) in replacements {
        // an escaped literal always compiles
        let Ok(pattern) = Regex::new(&regex::escape(url)) else {
            continue;
        };
        if pattern.is_match(&modified_html) {
            modified_html = Cow::Owned(
                pattern
                    .replace_all(&modified_html, NoExpand(local_link.as_bytes()))
                    .into_owned(),
            );
        }
    }

    modified_html
}
