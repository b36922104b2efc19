use anyhow::{Context, Result};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::path::PathBuf;
use url::Url;

// Characters left alone when re-encoding a path for the wire.
const PATH_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'%')
    .remove(b'.')
    .remove(b'_')
    .remove(b'-')
    .remove(b'~')
    .remove(b'(')
    .remove(b')')
    .remove(b'[')
    .remove(b']');

const QUERY_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'=')
    .remove(b'&')
    .remove(b'%')
    .remove(b'.')
    .remove(b'_')
    .remove(b'-')
    .remove(b'~');

/// A URL string cut into the pieces we care about, without any normalization.
///
/// `Url::parse` would resolve dot segments and rewrite backslashes, which must
/// not leak into destination naming, so the split is done on the raw text.
#[derive(Debug, PartialEq)]
struct UrlParts<'a> {
    /// `scheme://host[:port]`, empty for scheme-less input.
    origin: &'a str,
    path: &'a str,
    query: &'a str,
    fragment: &'a str,
}

fn split_url(url: &str) -> UrlParts<'_> {
    let (rest, fragment) = url.split_once('#').unwrap_or((url, ""));
    let (rest, query) = rest.split_once('?').unwrap_or((rest, ""));

    let (origin, path) = match rest.find("://") {
        Some(idx) => {
            let after_scheme = idx + 3;
            let path_start = rest[after_scheme..]
                .find('/')
                .map(|p| after_scheme + p)
                .unwrap_or(rest.len());
            rest.split_at(path_start)
        }
        None => ("", rest),
    };

    UrlParts { origin, path, query, fragment }
}

fn decode(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

/// Builds the URL actually sent over the wire.
///
/// Path and query are decoded and re-encoded so that hand-written links with
/// raw spaces or odd escapes still produce a valid request. Scheme, host and
/// fragment are kept as written.
pub fn request_url(pdf_url: &str) -> Result<Url> {
    let parts = split_url(pdf_url);

    let mut encoded = String::with_capacity(pdf_url.len());
    encoded.push_str(parts.origin);
    encoded.extend(utf8_percent_encode(&decode(parts.path), PATH_SAFE));
    if !parts.query.is_empty() {
        encoded.push('?');
        encoded.extend(utf8_percent_encode(&decode(parts.query), QUERY_SAFE));
    }
    if !parts.fragment.is_empty() {
        encoded.push('#');
        encoded.push_str(parts.fragment);
    }

    Url::parse(&encoded).with_context(|| format!("Failed to parse request URL: {}", encoded))
}

/// Maps a PDF URL onto a relative path below the mirror directory.
///
/// Each `/`-separated segment of the raw path is decoded on its own, so an
/// encoded `%2F` stays inside its segment instead of adding a directory.
pub fn normalized_upload_path(pdf_url: &str) -> PathBuf {
    split_url(pdf_url)
        .path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .filter_map(|segment| sanitize_segment(decode(segment)))
        .collect()
}

fn sanitize_segment(segment: String) -> Option<String> {
    match segment.as_str() {
        "" | "." => None,
        // never climb out of the mirror directory
        ".." => Some("%2E%2E".to_string()),
        _ if segment.contains(['/', '\\']) => {
            Some(segment.replace('/', "%2F").replace('\\', "%5C"))
        }
        _ => Some(segment),
    }
}
