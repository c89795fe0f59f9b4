// FILE: src/engine/mod.rs
pub mod extractor;
pub mod search_index;
pub mod searcher;
pub mod synchronizer;

use std::path::{Path, PathBuf};

/// Extensions (lower-case, without the dot) that the catalog indexes.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "oga", "m4a", "mp4", "wav", "wma"];

/// Case-insensitive membership test against [`SUPPORTED_EXTENSIONS`].
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Every supported audio file under `root`, recursively. Unreadable entries are skipped.
pub fn walk_audio_files(root: &Path) -> impl Iterator<Item = PathBuf> {
    walkdir::WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(e) => {
                tracing::debug!("[Walk] Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|e| e.file_type().is_file() && is_supported(e.path()))
        .map(|e| e.into_path())
}
