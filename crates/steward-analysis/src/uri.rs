//! `file://` URI conversions.

use lsp_types::Uri;
use std::path::{Path, PathBuf};

/// Convert a URI to a file path.
#[cfg(not(windows))]
pub fn uri_to_path(uri: &Uri) -> Option<PathBuf> {
    uri.as_str()
        .strip_prefix("file://")
        .map(|p| PathBuf::from(p.replace("%20", " ")))
}

/// Convert a URI to a file path (Windows version).
#[cfg(windows)]
pub fn uri_to_path(uri: &Uri) -> Option<PathBuf> {
    uri.as_str()
        .strip_prefix("file://")
        // Handle Windows paths like file:///C:/...
        .map(|p| p.strip_prefix('/').unwrap_or(p))
        .map(|p| PathBuf::from(p.replace("%20", " ")))
}

/// Convert a file path to a `file://` URI.
pub fn path_to_uri(path: &Path) -> Option<Uri> {
    let path = path.to_string_lossy().replace('\\', "/");
    let uri = if path.starts_with('/') {
        format!("file://{path}")
    } else {
        format!("file:///{path}")
    };
    uri.replace(' ', "%20").parse().ok()
}

/// The extension of the path a URI points to, if any.
pub fn uri_extension(uri: &Uri) -> Option<String> {
    let path = uri.as_str().rsplit('/').next()?;
    let (_, ext) = path.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}
