use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use super::schema::Settings;
use crate::error::{Result, TunedexError};

/// tantivy refuses smaller writer arenas.
const MIN_WRITER_HEAP: usize = 15_000_000;

impl Settings {
    /// Load settings from the resolved config file (if any) and the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(resolve_config_path().as_deref())
    }

    /// Load settings from an explicit, optional config file plus the environment.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(::config::File::from(path).required(false));
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix("TUNEDEX")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync.commit_batch == 0 {
            return Err(TunedexError::InvalidSettings("sync.commit_batch must be >= 1".into()));
        }
        if self.search.default_limit == 0 {
            return Err(TunedexError::InvalidSettings("search.default_limit must be >= 1".into()));
        }
        if self.search.max_limit == 0 {
            return Err(TunedexError::InvalidSettings("search.max_limit must be >= 1".into()));
        }
        if self.search.default_limit > self.search.max_limit {
            return Err(TunedexError::InvalidSettings(
                "search.default_limit must not exceed search.max_limit".into(),
            ));
        }
        if self.index.writer_heap_bytes < MIN_WRITER_HEAP {
            return Err(TunedexError::InvalidSettings(format!(
                "index.writer_heap_bytes must be >= {}",
                MIN_WRITER_HEAP
            )));
        }
        if resolve_path(&self.library.data_dir).starts_with(resolve_path(&self.library.music_root)) {
            return Err(TunedexError::InvalidSettings(
                "library.data_dir must not live inside library.music_root".into(),
            ));
        }
        Ok(())
    }
}

/// Make `path` absolute and resolve symlinks in the part of it that exists.
///
/// The remainder (directories not created yet) is appended as written.
fn resolve_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(resolved) = fs::canonicalize(existing) {
            return missing.iter().rev().fold(resolved, |acc, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute,
        }
    }
}

/// Resolve the config path from `TUNEDEX_CONFIG_PATH` or the platform default.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Some(p) = env::var_os("TUNEDEX_CONFIG_PATH") {
        return Some(PathBuf::from(p));
    }
    default_config_path()
}

/// `$XDG_CONFIG_HOME/tunedex/config.toml` on Linux, the platform equivalent elsewhere.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tunedex").join("config.toml"))
}
