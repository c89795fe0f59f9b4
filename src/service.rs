// FILE: src/service.rs
use std::sync::{Arc, Mutex};

use crate::config::Settings;
use crate::engine::searcher::{SearchHit, SearchSummary, Searcher};
use crate::engine::synchronizer::{SyncReport, Synchronizer};
use crate::error::{Result, TunedexError};
use crate::librarian::Librarian;
use crate::state::{Catalog, SharedCatalog, SyncPhase};
use crate::storage::TrackRecord;

/// Entry point for hosts: owns the catalog and the watcher.
pub struct Tunedex {
    catalog: SharedCatalog,
    librarian: Mutex<Librarian>,
}

impl Tunedex {
    /// Open the catalog and build it if there is nothing usable on disk.
    pub fn open(settings: Settings) -> Result<Self> {
        let catalog = Catalog::open(settings)?;
        Synchronizer::startup(&catalog)?;
        Ok(Self {
            librarian: Mutex::new(Librarian::new(Arc::clone(&catalog))),
            catalog,
        })
    }

    pub fn catalog(&self) -> &SharedCatalog {
        &self.catalog
    }

    pub fn phase(&self) -> SyncPhase {
        self.catalog.phase()
    }

    /// Search with the configured default limit.
    pub fn search(&self, query: &str) -> Vec<SearchHit> {
        self.search_with_limit(query, self.catalog.settings().search.default_limit)
    }

    pub fn search_with_limit(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        Searcher::search(&self.catalog, query, limit)
    }

    pub fn summarize(&self, query: &str) -> SearchSummary {
        Searcher::summarize(&self.catalog, query)
    }

    pub fn lookup(&self, path: &str) -> Result<Option<TrackRecord>> {
        self.catalog.store().lookup(path)
    }

    pub fn track_count(&self) -> Result<u64> {
        self.catalog.track_count()
    }

    pub fn rebuild(&self) -> Result<usize> {
        Synchronizer::rebuild(&self.catalog)
    }

    pub fn resync(&self) -> Result<SyncReport> {
        Synchronizer::resync(&self.catalog)
    }

    /// Staleness check over `sync.stale_sample` random records.
    pub fn is_stale(&self) -> Result<bool> {
        Synchronizer::is_stale(&self.catalog, self.catalog.settings().sync.stale_sample)
    }

    pub fn start_watching(&self) -> Result<()> {
        self.librarian.lock().map_err(|_| TunedexError::poisoned())?.start()
    }

    pub fn stop_watching(&self) -> Result<()> {
        self.librarian.lock().map_err(|_| TunedexError::poisoned())?.stop()
    }

    pub fn is_watching(&self) -> bool {
        self.librarian.lock().map(|l| l.is_running()).unwrap_or(false)
    }
}
