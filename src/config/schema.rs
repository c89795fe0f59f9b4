use serde::Deserialize;
use std::path::PathBuf;

/// Top-level settings loaded from `config.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub library: LibrarySettings,
    pub sync: SyncSettings,
    pub watch: WatchSettings,
    pub search: SearchSettings,
    pub index: IndexSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LibrarySettings {
    /// Directory tree that gets indexed.
    pub music_root: PathBuf,
    /// Holds `music.db` and `music_index/`. Must not live inside `music_root`.
    pub data_dir: PathBuf,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        let music_root = dirs::audio_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join("Music")))
            .unwrap_or_else(|| PathBuf::from("Music"));
        let data_dir = dirs::data_dir()
            .map(|d| d.join("tunedex"))
            .unwrap_or_else(|| PathBuf::from(".tunedex"));
        Self { music_root, data_dir }
    }
}

impl LibrarySettings {
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("music.db")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("music_index")
    }
}

/// What the host does when the startup staleness sample finds drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StalePolicy {
    Ignore,
    Resync,
    Rebuild,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Records per commit during a full rebuild.
    pub commit_batch: usize,
    /// Rows sampled by the staleness heuristic.
    pub stale_sample: usize,
    pub on_stale: StalePolicy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            commit_batch: 2000,
            stale_sample: 200,
            on_stale: StalePolicy::Rebuild,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    /// Quiet period (milliseconds) before queued changes are applied.
    pub debounce_ms: u64,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self { debounce_ms: 500 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub default_limit: usize,
    /// Hard cap on hits per query; aggregation asks for this many.
    pub max_limit: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_limit: 200,
            max_limit: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// Memory arena handed to the tantivy writer.
    pub writer_heap_bytes: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            writer_heap_bytes: 50_000_000,
        }
    }
}
