//! Database connection management
//!
//! Opens the SQLite file backing the PrimaryStore, applies pragmas, and
//! bootstraps or heals the `tracks` schema. Schema healing is additive and
//! idempotent: it runs on every open and never drops data.

use std::path::Path;
use std::time::Duration;
use rusqlite::Connection;
use crate::error::{Result, TunedexError};

/// Columns that older databases may be missing, with their SQL types.
const OPTIONAL_COLUMNS: &[(&str, &str)] = &[
    ("albumartist", "TEXT"),
    ("genre", "TEXT"),
    ("year", "INTEGER"),
    ("duration", "REAL"),
    ("mtime", "REAL"),
];

/// Open (creating if needed) the database at `db_path`.
pub fn open_connection(db_path: &Path) -> Result<Connection> {
    let db_dir = db_path.parent()
        .ok_or_else(|| TunedexError::InvalidSettings(format!("Invalid database path: {}", db_path.display())))?;
    std::fs::create_dir_all(db_dir)?;

    let conn = Connection::open(db_path)?;

    // WAL lets the read connection see committed rows while a rebuild is writing
    conn.pragma_update_and_check(None, "journal_mode", WAL, |_| Ok(()))?;
    conn.pragma_update(None, "synchronous", NORMAL)?;
    conn.busy_timeout(Duration::from_secs(10))?;

    Ok(conn)
}

/// Create the `tracks` table and its indexes if absent, then add any missing optional column.
pub fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(r#"
        CREATE TABLE IF NOT EXISTS tracks (
            path        TEXT PRIMARY KEY,
            filename    TEXT,
            artist      TEXT,
            album       TEXT,
            title       TEXT,
            albumartist TEXT,
            genre       TEXT,
            year        INTEGER,
            duration    REAL,
            mtime       REAL
        );
    "#)?;

    migrate_columns(conn);

    conn.execute_batch(r#"
        CREATE INDEX IF NOT EXISTS idx_artist ON tracks(artist COLLATE NOCASE);
        CREATE INDEX IF NOT EXISTS idx_album  ON tracks(album  COLLATE NOCASE);
        CREATE INDEX IF NOT EXISTS idx_title  ON tracks(title  COLLATE NOCASE);
    "#)?;

    Ok(())
}

/// Add optional columns missing from an older `tracks` table.
/// Failures are logged and skipped; a column that cannot be added only degrades that field.
fn migrate_columns(conn: &Connection) {
    let existing = match existing_columns(conn) {
        Ok(cols) => cols,
        Err(e) => {
            tracing::warn!("[Store] Could not inspect tracks schema: {}", e);
            Vec::new()
        }
    };

    for (name, sql_type) in OPTIONAL_COLUMNS {
        if existing.iter().any(|c| c == name) {
            continue;
        }
        match conn.execute(&format!("ALTER TABLE tracks ADD COLUMN {} {}", name, sql_type), []) {
            Ok(_) => tracing::info!("[Store] Migrated schema: added column '{}'", name),
            Err(e) if e.to_string().contains("duplicate column") => {}
            Err(e) => tracing::warn!("[Store] Failed to add column '{}': {}", name, e),
        }
    }
}

fn existing_columns(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("PRAGMA table_info(tracks)")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut cols = Vec::new();
    for r in rows { cols.push(r?); }
    Ok(cols)
}

// SQL pragma constants
const WAL: &str = "WAL";
const NORMAL: &str = "NORMAL";
