// FILE: src/storage/repository.rs
use std::collections::HashSet;
use rusqlite::{Connection, Row, params};
use crate::error::Result;
use crate::storage::TrackRecord;

const SELECT_COLUMNS: &str =
    "path, filename, artist, album, title, albumartist, genre, year, duration, mtime";

/// Row-level operations on the `tracks` table.
///
/// Borrows either a plain connection (reads) or a transaction (writes);
/// commit boundaries belong to the caller.
pub struct TrackRepository<'a> {
    conn: &'a Connection,
}

impl<'a> TrackRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert or replace the row keyed by `record.path`.
    pub fn upsert(&self, record: &TrackRecord) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT OR REPLACE INTO tracks
             (path, filename, artist, album, title, albumartist, genre, year, duration, mtime)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
        )?;
        stmt.execute(params![
            record.path,
            record.filename,
            record.artist,
            record.album,
            record.title,
            record.albumartist,
            record.genre,
            record.year,
            record.duration,
            record.mtime,
        ])?;
        Ok(())
    }

    pub fn delete(&self, path: &str) -> Result<bool> {
        let rows = self.conn.execute("DELETE FROM tracks WHERE path = ?1", params![path])?;
        Ok(rows > 0)
    }

    /// Delete every listed path; returns how many rows actually went away.
    pub fn delete_many<'p, I>(&self, paths: I) -> Result<usize>
    where I: IntoIterator<Item = &'p str>
    {
        let mut stmt = self.conn.prepare_cached("DELETE FROM tracks WHERE path = ?1")?;
        let mut removed = 0;
        for path in paths {
            removed += stmt.execute(params![path])?;
        }
        Ok(removed)
    }

    pub fn delete_all(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM tracks", [])?)
    }

    pub fn get_by_path(&self, path: &str) -> Result<Option<TrackRecord>> {
        let mut stmt = self.conn.prepare_cached(
            &format!("SELECT {} FROM tracks WHERE path = ?1", SELECT_COLUMNS)
        )?;
        match stmt.query_row(params![path], row_to_record) {
            Ok(r) => Ok(Some(r)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn count(&self) -> Result<u64> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM tracks", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Stream every stored path through `callback`.
    pub fn scan_paths<F>(&self, mut callback: F) -> Result<()>
    where F: FnMut(String) -> Result<()>
    {
        let mut stmt = self.conn.prepare("SELECT path FROM tracks")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        for row in rows {
            callback(row?)?;
        }
        Ok(())
    }

    pub fn all_paths(&self) -> Result<HashSet<String>> {
        let mut paths = HashSet::new();
        self.scan_paths(|p| {
            paths.insert(p);
            Ok(())
        })?;
        Ok(paths)
    }

    /// Stored paths beginning with `prefix`. Pass a trailing separator to
    /// select everything below a directory.
    pub fn paths_under(&self, prefix: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT path FROM tracks WHERE substr(path, 1, length(?1)) = ?1"
        )?;
        let rows = stmt.query_map(params![prefix], |row| row.get::<_, String>(0))?;
        let mut paths = Vec::new();
        for r in rows { paths.push(r?); }
        Ok(paths)
    }

    /// Up to `limit` random `(path, mtime)` pairs for the staleness heuristic.
    pub fn sample_mtimes(&self, limit: usize) -> Result<Vec<(String, Option<f64>)>> {
        let mut stmt = self.conn.prepare("SELECT path, mtime FROM tracks ORDER BY RANDOM() LIMIT ?1")?;
        let rows = stmt.query_map(params![limit as i64], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut sample = Vec::new();
        for r in rows { sample.push(r?); }
        Ok(sample)
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<TrackRecord> {
    Ok(TrackRecord {
        path: row.get(0)?,
        filename: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        artist: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        album: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        title: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        albumartist: row.get(5)?,
        genre: row.get(6)?,
        year: row.get(7)?,
        duration: row.get(8)?,
        mtime: row.get(9)?,
    })
}
