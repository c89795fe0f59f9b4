//! Error types for tunedex

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TunedexError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Index error: {0}")]
    Index(#[from] tantivy::TantivyError),

    #[error("Index directory error: {0}")]
    IndexDirectory(#[from] tantivy::directory::error::OpenDirectoryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Music root not found: {}", .0.display())]
    MusicRootMissing(PathBuf),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("State error: {0}")]
    State(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TunedexError>;

impl TunedexError {
    /// Shorthand for the error raised when a mutex was poisoned by a panicking holder.
    pub(crate) fn poisoned() -> Self {
        TunedexError::State("Poisoned lock".into())
    }
}
