//! Workspace file discovery.

use crate::error::{AnalysisError, AnalysisResult};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Build and dependency directories never descended into.
const SKIPPED_DIRS: &[&str] = &["target", "node_modules", "bin", "obj"];

/// Maximum directory depth below the root.
const MAX_DEPTH: usize = 16;

/// Read every file below `root` whose extension is in `extensions`, in
/// file-name order.
///
/// Unreadable entries below the root are skipped; only a missing or
/// unreadable root is an error.
pub(crate) fn load(root: &Path, extensions: &[String]) -> AnalysisResult<Vec<(PathBuf, String)>> {
    fs::read_dir(root).map_err(|source| AnalysisError::Io {
        path: root.to_path_buf(),
        source,
    })?;

    let walker = WalkDir::new(root)
        .max_depth(MAX_DEPTH)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_skipped(entry));

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() || !has_extension(entry.path(), extensions) {
            continue;
        }
        match fs::read_to_string(entry.path()) {
            Ok(text) => files.push((entry.into_path(), text)),
            Err(e) => tracing::debug!("Skipping {}: {}", entry.path().display(), e),
        }
    }

    tracing::debug!("Loaded {} files from {}", files.len(), root.display());
    Ok(files)
}

/// Hidden entries and build directories.
fn is_skipped(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || (entry.file_type().is_dir() && SKIPPED_DIRS.contains(&name.as_ref()))
}

/// Whether the path has one of the extensions (case-insensitive).
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_filters_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/nested")).unwrap();
        fs::create_dir_all(root.join("target")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::create_dir_all(root.join("web/node_modules/pkg")).unwrap();
        fs::create_dir_all(root.join("app/obj")).unwrap();

        fs::write(root.join("src/lib.rs"), "fn lib() {}").unwrap();
        fs::write(root.join("src/nested/deep.RS"), "fn deep() {}").unwrap();
        fs::write(root.join("src/notes.bin"), "ignored").unwrap();
        fs::write(root.join("target/gen.rs"), "ignored").unwrap();
        fs::write(root.join(".git/hook.rs"), "ignored").unwrap();
        fs::write(root.join("web/node_modules/pkg/index.rs"), "ignored").unwrap();
        fs::write(root.join("app/obj/generated.rs"), "ignored").unwrap();
        fs::write(root.join("app/main.rs"), "fn main() {}").unwrap();

        let files = load(root, &["rs".to_string()]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|(p, _)| p.strip_prefix(root).unwrap().to_path_buf())
            .collect();

        assert_eq!(
            names,
            vec![
                PathBuf::from("app/main.rs"),
                PathBuf::from("src/lib.rs"),
                PathBuf::from("src/nested/deep.RS"),
            ]
        );
        assert_eq!(files[1].1, "fn lib() {}");
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load(&dir.path().join("missing"), &["rs".to_string()]);
        assert!(matches!(result, Err(AnalysisError::Io { .. })));
    }
}

