// FILE: src/storage/mod.rs
//! PrimaryStore: the canonical, durable table of track records keyed by path.

pub mod connection;
pub mod repository;

use std::path::Path;
use std::sync::Mutex;
use rusqlite::Connection;
use serde::Serialize;
use crate::error::{Result, TunedexError};

pub use repository::TrackRepository;

/// Canonical metadata for one audio file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackRecord {
    pub path: String,
    pub filename: String,
    pub artist: String,
    pub album: String,
    pub title: String,
    pub albumartist: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i64>,
    /// Seconds.
    pub duration: Option<f64>,
    /// File modification time (seconds since the epoch) captured at extraction.
    pub mtime: Option<f64>,
}

impl std::fmt::Display for TrackRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} — {} — {}", self.artist, self.album, self.title)
    }
}

/// SQLite-backed PrimaryStore.
///
/// Writes go through a dedicated connection and are always wrapped in a
/// transaction. Reads use a second connection so they never queue behind a
/// long rebuild; WAL mode gives them the last committed state.
pub struct TrackStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl TrackStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let writer = connection::open_connection(db_path)?;
        connection::ensure_schema(&writer)?;
        let reader = connection::open_connection(db_path)?;
        tracing::info!("[Store] Opened {}", db_path.display());

        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        })
    }

    /// Run `f` inside one write transaction; commits only if `f` succeeds.
    pub fn write<T, F>(&self, f: F) -> Result<T>
    where F: FnOnce(&TrackRepository<'_>) -> Result<T>
    {
        let mut conn = self.writer.lock().map_err(|_| TunedexError::poisoned())?;
        let tx = conn.transaction()?;
        let out = f(&TrackRepository::new(&tx))?;
        tx.commit()?;
        Ok(out)
    }

    pub fn read<T, F>(&self, f: F) -> Result<T>
    where F: FnOnce(&TrackRepository<'_>) -> Result<T>
    {
        let conn = self.reader.lock().map_err(|_| TunedexError::poisoned())?;
        f(&TrackRepository::new(&conn))
    }

    pub fn lookup(&self, path: &str) -> Result<Option<TrackRecord>> {
        self.read(|repo| repo.get_by_path(path))
    }

    pub fn count(&self) -> Result<u64> {
        self.read(|repo| repo.count())
    }
}
