//! MetadataExtractor: reads embedded tags and fills the gaps from the path.
//!
//! Tag parsing is allowed to fail; every missing field falls back to a
//! filesystem-derived value, so `artist`, `album` and `title` are never empty.
//! Only a failure to stat the file itself (it vanished) is reported.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use lofty::file::{AudioFile, TaggedFileExt};
use lofty::tag::ItemKey;

use crate::error::Result;
use crate::storage::TrackRecord;

const UNKNOWN: &str = "Unknown";

/// Directory names too generic to stand in for an album title.
const ROOT_LIKE_NAMES: &[&str] = &["", ".", "..", "Music", "music"];

/// Raw tag values as found in the file; empty or blank values are already dropped.
#[derive(Debug, Default, Clone)]
pub struct RawTags {
    pub artist: Option<String>,
    pub albumartist: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
    pub year: Option<String>,
    pub genre: Option<String>,
    pub duration: Option<f64>,
}

pub struct MetadataExtractor {
    music_root: PathBuf,
}

impl MetadataExtractor {
    pub fn new(music_root: &Path) -> Self {
        Self { music_root: music_root.to_path_buf() }
    }

    /// Build the canonical record for `path`.
    /// Errors only when the file cannot be stat'ed (e.g. removed mid-event).
    pub fn extract(&self, path: &Path) -> Result<TrackRecord> {
        let metadata = fs::metadata(path)?;
        let mtime = metadata.modified().ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64());

        let tags = match read_tags(path) {
            Ok(tags) => tags,
            Err(e) => {
                tracing::debug!("[Extractor] No usable tags in {}: {}", path.display(), e);
                RawTags::default()
            }
        };

        Ok(self.build_record(path, tags, mtime))
    }

    /// Apply the fallback rules to already-read tags.
    pub fn build_record(&self, path: &Path, tags: RawTags, mtime: Option<f64>) -> TrackRecord {
        TrackRecord {
            path: path.to_string_lossy().to_string(),
            filename: path.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            artist: self.artist_for(path, &tags),
            album: album_for(path, &tags),
            title: title_for(path, &tags),
            year: tags.year.as_deref().and_then(parse_year),
            albumartist: tags.albumartist,
            genre: tags.genre,
            duration: tags.duration,
            mtime,
        }
    }

    fn artist_for(&self, path: &Path, tags: &RawTags) -> String {
        if let Some(artist) = tags.artist.as_ref().or(tags.albumartist.as_ref()) {
            return artist.trim().to_string();
        }

        // Grandparent directory, but only when it is still below the music root
        let relative = path.strip_prefix(&self.music_root).unwrap_or(path);
        let ancestors_below_root = relative.parent()
            .map(|p| p.components().count())
            .unwrap_or(0);
        if ancestors_below_root >= 2 {
            if let Some(name) = path.parent().and_then(Path::parent).and_then(dir_name) {
                if !name.trim().is_empty() {
                    return name.trim().to_string();
                }
            }
        }
        UNKNOWN.to_string()
    }
}

fn album_for(path: &Path, tags: &RawTags) -> String {
    if let Some(album) = &tags.album {
        return album.trim().to_string();
    }

    let parent = path.parent();
    let mut album = parent.and_then(dir_name).unwrap_or_default();
    if ROOT_LIKE_NAMES.contains(&album.as_str()) {
        if let Some(grandparent) = parent.and_then(Path::parent).and_then(dir_name) {
            album = grandparent;
        }
    }

    let album = album.trim();
    if album.is_empty() { UNKNOWN.to_string() } else { album.to_string() }
}

fn title_for(path: &Path, tags: &RawTags) -> String {
    if let Some(title) = &tags.title {
        return title.trim().to_string();
    }
    path.file_stem()
        .map(|s| s.to_string_lossy().trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn dir_name(dir: &Path) -> Option<String> {
    dir.file_name().map(|n| n.to_string_lossy().to_string())
}

/// Parse a tag year such as `"1997"`, `"1997-05-21"` or `"1997.0"`.
/// Anything that does not reduce to an integer yields `None`.
pub fn parse_year(raw: &str) -> Option<i64> {
    let head = raw.trim().split('-').next()?;
    let head = head.split('.').next()?;
    head.trim().parse::<i64>().ok()
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Read embedded tags and audio properties.
pub fn read_tags(path: &Path) -> std::result::Result<RawTags, lofty::error::LoftyError> {
    let tagged = lofty::read_from_path(path)?;

    let duration = tagged.properties().duration().as_secs_f64();
    let mut tags = RawTags {
        duration: (duration > 0.0).then_some(duration),
        ..RawTags::default()
    };

    if let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) {
        tags.artist = non_blank(tag.get_string(&ItemKey::TrackArtist));
        tags.albumartist = non_blank(tag.get_string(&ItemKey::AlbumArtist));
        tags.album = non_blank(tag.get_string(&ItemKey::AlbumTitle));
        tags.title = non_blank(tag.get_string(&ItemKey::TrackTitle));
        tags.genre = non_blank(tag.get_string(&ItemKey::Genre));
        tags.year = non_blank(tag.get_string(&ItemKey::RecordingDate))
            .or_else(|| non_blank(tag.get_string(&ItemKey::OriginalReleaseDate)));
    }

    Ok(tags)
}
