//! Scanner module for expanding user input into media files.
//!
//! Plain file arguments are taken as they are; directory arguments are walked
//! recursively and filtered down to recognised audio/video containers.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Media file extensions accepted by the file picker (case-insensitive matching).
pub const MEDIA_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "flv", "wmv", "webm", "ts", "mpg", "mp3", "wav", "flac", "aac",
    "ogg", "opus", "m4a", "wma", "ac3", "dts", "truehd",
];

/// Checks if a file has a media extension (case-insensitive).
pub fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| MEDIA_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Scans one directory for media files, skipping hidden subdirectories.
///
/// Results are sorted so repeated scans give the same batch order.
pub fn scan_directory(root: &Path) -> Vec<PathBuf> {
    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        // Allow the root itself even if it starts with '.'
        !(entry.file_type().is_dir()
            && entry.depth() > 0
            && entry
                .file_name()
                .to_str()
                .map(|name| name.starts_with('.'))
                .unwrap_or(false))
    });

    let mut files: Vec<PathBuf> = walker
        .filter_map(|e| e.ok())
        .filter(|entry| entry.file_type().is_file() && is_media_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

/// Expand command line inputs into a deduplicated file list.
///
/// Files are kept in argument order whatever their extension; directories
/// contribute their media files. Missing paths are dropped.
pub fn expand_inputs(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for input in inputs {
        let found = if input.is_dir() {
            scan_directory(input)
        } else if input.is_file() {
            vec![input.clone()]
        } else {
            tracing::warn!(path = %input.display(), "Input does not exist, ignoring");
            continue;
        };

        for file in found {
            if seen.insert(file.clone()) {
                files.push(file);
            }
        }
    }

    files
}
