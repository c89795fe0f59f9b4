// FILE: src/engine/searcher.rs
use std::collections::HashMap;
use std::time::Instant;

use serde::Serialize;

use crate::engine::search_index::IndexHit;
use crate::state::Catalog;
use crate::storage::TrackRecord;

const TOP_ARTISTS: usize = 20;
const TOP_ALBUMS: usize = 30;
const TOP_TRACKS: usize = 200;
const SAMPLE_TITLES: usize = 3;

/// One ranked search result, hydrated from the PrimaryStore when possible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub path: String,
    pub artist: String,
    pub album: String,
    pub title: String,
}

impl From<TrackRecord> for SearchHit {
    fn from(record: TrackRecord) -> Self {
        Self {
            path: record.path,
            artist: record.artist,
            album: record.album,
            title: record.title,
        }
    }
}

impl From<IndexHit> for SearchHit {
    /// Index fields are stored lower-cased; this is the best we can show.
    fn from(hit: IndexHit) -> Self {
        Self {
            artist: title_case(&hit.artist),
            album: title_case(&hit.album),
            title: title_case(&hit.title),
            path: hit.path,
        }
    }
}

impl std::fmt::Display for SearchHit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} — {} — {}", self.artist, self.album, self.title)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtistGroup {
    pub name: String,
    pub track_count: usize,
    pub sample_tracks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlbumGroup {
    pub artist: String,
    pub name: String,
    pub track_count: usize,
    pub sample_tracks: Vec<String>,
}

/// Result hits grouped for display.
#[derive(Debug, Clone, Serialize)]
pub struct SearchSummary {
    pub query: String,
    pub artists: Vec<ArtistGroup>,
    pub albums: Vec<AlbumGroup>,
    pub tracks: Vec<SearchHit>,
    pub total_tracks: usize,
    /// Seconds spent searching and grouping.
    pub elapsed: f64,
}

pub struct Searcher;

impl Searcher {
    /// Ranked fuzzy search. Never fails: backend errors are logged and
    /// surface as an empty result.
    pub fn search(catalog: &Catalog, query: &str, limit: usize) -> Vec<SearchHit> {
        if query.trim().is_empty() {
            return Vec::new();
        }
        let limit = limit.min(catalog.settings().search.max_limit);

        let hits = match catalog.index().query(query, limit) {
            Ok(hits) => hits,
            Err(e) => {
                tracing::error!("[Searcher] Index query failed for '{}': {}", query, e);
                return Vec::new();
            }
        };

        let results = Self::hydrate(catalog, hits);
        tracing::debug!("[Searcher] '{}' -> {} results", query, results.len());
        results
    }

    /// Search with the configured maximum limit and group the hits.
    pub fn summarize(catalog: &Catalog, query: &str) -> SearchSummary {
        let start = Instant::now();
        let hits = Self::search(catalog, query, catalog.settings().search.max_limit);
        let (artists, albums) = aggregate(&hits);
        let total_tracks = hits.len();

        let mut tracks = hits;
        tracks.truncate(TOP_TRACKS);

        SearchSummary {
            query: query.to_string(),
            artists,
            albums,
            tracks,
            total_tracks,
            elapsed: start.elapsed().as_secs_f64(),
        }
    }

    /// Swap each index hit for its PrimaryStore record, keeping index order.
    fn hydrate(catalog: &Catalog, hits: Vec<IndexHit>) -> Vec<SearchHit> {
        let records = catalog.store().read(|repo| {
            hits.iter()
                .map(|hit| repo.get_by_path(&hit.path))
                .collect::<crate::error::Result<Vec<_>>>()
        });

        match records {
            Ok(records) => hits
                .into_iter()
                .zip(records)
                .map(|(hit, record)| match record {
                    Some(record) => SearchHit::from(record),
                    None => SearchHit::from(hit),
                })
                .collect(),
            Err(e) => {
                tracing::warn!("[Searcher] Store lookup failed, using index fields: {}", e);
                hits.into_iter().map(SearchHit::from).collect()
            }
        }
    }
}

/// Group hits by artist and by (artist, album), most tracks first.
///
/// Ties keep first-appearance order, so better-ranked groups win.
pub fn aggregate(hits: &[SearchHit]) -> (Vec<ArtistGroup>, Vec<AlbumGroup>) {
    let mut artists: Vec<ArtistGroup> = Vec::new();
    let mut artist_slots: HashMap<&str, usize> = HashMap::new();
    let mut albums: Vec<AlbumGroup> = Vec::new();
    let mut album_slots: HashMap<(&str, &str), usize> = HashMap::new();

    for hit in hits {
        let slot = *artist_slots.entry(hit.artist.as_str()).or_insert_with(|| {
            artists.push(ArtistGroup {
                name: hit.artist.clone(),
                track_count: 0,
                sample_tracks: Vec::new(),
            });
            artists.len() - 1
        });
        let group = &mut artists[slot];
        group.track_count += 1;
        if group.sample_tracks.len() < SAMPLE_TITLES {
            group.sample_tracks.push(hit.title.clone());
        }

        let slot = *album_slots
            .entry((hit.artist.as_str(), hit.album.as_str()))
            .or_insert_with(|| {
                albums.push(AlbumGroup {
                    artist: hit.artist.clone(),
                    name: hit.album.clone(),
                    track_count: 0,
                    sample_tracks: Vec::new(),
                });
                albums.len() - 1
            });
        let group = &mut albums[slot];
        group.track_count += 1;
        if group.sample_tracks.len() < SAMPLE_TITLES {
            group.sample_tracks.push(hit.title.clone());
        }
    }

    artists.sort_by(|a, b| b.track_count.cmp(&a.track_count));
    artists.truncate(TOP_ARTISTS);
    albums.sort_by(|a, b| b.track_count.cmp(&a.track_count));
    albums.truncate(TOP_ALBUMS);
    (artists, albums)
}

/// Upper-case the first letter of every run of letters, lower-case the rest.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_word = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}
