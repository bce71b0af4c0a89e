//! Locating produced server files.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;

/// Regular files directly inside `dir` whose file name matches `pattern`,
/// sorted by name. An unreadable directory yields nothing.
pub fn locate_all(dir: &Path, pattern: &Regex) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("Cannot list {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut found: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|name| pattern.is_match(name))
                .unwrap_or(false)
        })
        .collect();
    found.sort();
    found
}

/// First match of [`locate_all`].
pub fn locate(dir: &Path, pattern: &Regex) -> Option<PathBuf> {
    locate_all(dir, pattern).into_iter().next()
}
