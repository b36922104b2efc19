use anyhow::{Context, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{DownloadError, MirrorError};

pub const MIRROR_DIR: &str = "mirror-pdfs";

/// The mirrored site on disk: HTML pages plus the `mirror-pdfs` tree.
#[derive(Clone, Debug)]
pub struct FileManager {
    base_dir: PathBuf,
}

impl FileManager {
    /// Opens an existing site root. The root is canonicalized so that
    /// relative links are computed between absolute paths.
    pub fn new(base_dir: &Path) -> Result<Self, MirrorError> {
        let base_dir = fs::canonicalize(base_dir)
            .map_err(|_| MirrorError::RootNotFound(absolute(base_dir)))?;
        if !base_dir.is_dir() {
            return Err(MirrorError::RootNotDirectory(base_dir));
        }

        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// All `*.html` files below the root, sorted.
    pub fn html_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.base_dir)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable directory entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| path.extension().map_or(false, |ext| ext == "html"))
            .collect();

        files.sort();
        files
    }

    pub fn destination_for(&self, upload_path: &Path) -> PathBuf {
        self.base_dir.join(MIRROR_DIR).join(upload_path)
    }

    /// A destination counts as mirrored once it exists with a non-zero size.
    pub fn is_present(&self, dest: &Path) -> bool {
        fs::metadata(dest).map_or(false, |meta| meta.len() > 0)
    }

    /// Writes `content` to `dest`, creating parent directories and replacing
    /// whatever was there.
    pub fn save_file(&self, dest: &Path, content: &[u8]) -> Result<(), DownloadError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|source| DownloadError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        fs::write(dest, content).map_err(|source| DownloadError::Io {
            path: dest.to_path_buf(),
            source,
        })
    }

    /// Raw page bytes. Pages are not required to be UTF-8.
    pub fn read_html(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).with_context(|| format!("Failed to read HTML file: {:?}", path))
    }

    pub fn write_html(&self, path: &Path, content: &[u8]) -> std::io::Result<()> {
        fs::write(path, content)
    }

    /// `file_path` relative to the site root, with `/` separators.
    pub fn get_relative_path(&self, file_path: &Path) -> String {
        match file_path.strip_prefix(&self.base_dir) {
            Ok(relative) => to_slash(relative),
            Err(_) => to_slash(file_path),
        }
    }

    /// Link from the page `html_file` to `target`, with `/` separators.
    pub fn relative_link(&self, html_file: &Path, target: &Path) -> String {
        let from_dir = html_file.parent().unwrap_or(&self.base_dir);
        match pathdiff::diff_paths(target, from_dir) {
            Some(relative) => to_slash(&relative),
            None => to_slash(target),
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn to_slash(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            Component::CurDir => None,
            Component::RootDir | Component::Prefix(_) => Some(String::new()),
        })
        .collect();

    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}
