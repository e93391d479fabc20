//! File utility functions

use std::path::{Path, PathBuf};

/// Expand a path string to an absolute path.
///
/// - `~` and `~/path` expand to the home directory
/// - relative paths (including bare names) are joined onto the current directory
/// - absolute paths are returned unchanged
///
/// ```text
/// expand_path("~/.viewgen")   // -> /home/user/.viewgen
/// expand_path("./spans.jsonl") // -> /current/dir/./spans.jsonl
/// expand_path("/etc/viewgen") // -> /etc/viewgen
/// ```
pub fn expand_path(path: &str) -> PathBuf {
    let path = path.trim();

    if path.is_empty() {
        return std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    }

    let expanded = if path == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from(path))
    } else if let Some(rest) = path.strip_prefix("~/") {
        match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(path),
        }
    } else {
        PathBuf::from(path)
    };

    if expanded.is_relative() {
        std::env::current_dir()
            .map(|cwd| cwd.join(&expanded))
            .unwrap_or(expanded)
    } else {
        expanded
    }
}

/// True if `name` can be used as a single file name inside a directory
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}

/// `<dir>/<stem>.jsonl`, or `None` if `stem` is not a plain file name
pub fn jsonl_path(dir: &Path, stem: &str) -> Option<PathBuf> {
    is_plain_file_name(stem).then(|| dir.join(format!("{stem}.jsonl")))
}
