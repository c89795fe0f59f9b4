// FILE: src/state.rs

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::Settings;
use crate::engine::extractor::MetadataExtractor;
use crate::engine::search_index::SearchIndex;
use crate::error::{Result, TunedexError};
use crate::storage::{TrackRepository, TrackStore};

/// Lifecycle of the catalog contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SyncPhase {
    /// No usable index yet; a rebuild is required.
    Empty = 0,
    /// A full rebuild is running.
    Building = 1,
    /// Both stores are populated and kept current incrementally.
    Ready = 2,
}

impl SyncPhase {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => SyncPhase::Building,
            2 => SyncPhase::Ready,
            _ => SyncPhase::Empty,
        }
    }
}

/// Owns the PrimaryStore, the SearchIndex and the single mutation lock
/// covering both.
///
/// Every write to either store goes through [`Catalog::mutate`]. Reads
/// (`store().lookup`, `index().query`) never take that lock.
pub struct Catalog {
    settings: Settings,
    music_root: PathBuf,
    store: TrackStore,
    index: SearchIndex,
    extractor: MetadataExtractor,
    mutation_lock: Mutex<()>,
    phase: AtomicU8,
}

pub type SharedCatalog = Arc<Catalog>;

impl Catalog {
    /// Open (or bootstrap) both stores under `settings.library.data_dir`.
    ///
    /// Fails with [`TunedexError::MusicRootMissing`] when the music root is not
    /// a directory. Does not index anything; see `Synchronizer::startup`.
    pub fn open(settings: Settings) -> Result<SharedCatalog> {
        settings.validate()?;

        let root = &settings.library.music_root;
        if !root.is_dir() {
            return Err(TunedexError::MusicRootMissing(root.clone()));
        }
        let music_root = fs::canonicalize(root)?;

        let store = TrackStore::open(&settings.library.db_path())?;
        let (index, created) = SearchIndex::open_or_create(
            &settings.library.index_dir(),
            settings.index.writer_heap_bytes,
        )?;

        let phase = if created || store.count()? == 0 {
            SyncPhase::Empty
        } else {
            SyncPhase::Ready
        };
        tracing::info!("[Catalog] Opened catalog for {} ({:?})", music_root.display(), phase);

        Ok(Arc::new(Self {
            extractor: MetadataExtractor::new(&music_root),
            settings,
            music_root,
            store,
            index,
            mutation_lock: Mutex::new(()),
            phase: AtomicU8::new(phase.as_u8()),
        }))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Canonical music root; every stored path lives below it.
    pub fn music_root(&self) -> &Path {
        &self.music_root
    }

    pub fn store(&self) -> &TrackStore {
        &self.store
    }

    pub fn index(&self) -> &SearchIndex {
        &self.index
    }

    pub fn extractor(&self) -> &MetadataExtractor {
        &self.extractor
    }

    pub fn phase(&self) -> SyncPhase {
        SyncPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub(crate) fn set_phase(&self, phase: SyncPhase) {
        self.phase.store(phase.as_u8(), Ordering::Release);
    }

    pub fn track_count(&self) -> Result<u64> {
        self.store.count()
    }

    /// Run one mutation of the store pair while holding the mutation lock.
    ///
    /// On error, index changes staged but not yet committed are discarded so
    /// the next mutation starts clean.
    pub fn mutate<T, F>(&self, f: F) -> Result<T>
    where F: FnOnce(&TrackStore, &SearchIndex) -> Result<T>
    {
        let _guard = self.mutation_lock.lock().map_err(|_| TunedexError::poisoned())?;
        match f(&self.store, &self.index) {
            Ok(value) => Ok(value),
            Err(e) => {
                if let Err(rollback_err) = self.index.rollback() {
                    tracing::error!("[Catalog] Index rollback failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    /// [`Catalog::mutate`] followed by one joint commit of both stores.
    pub fn transact<T, F>(&self, f: F) -> Result<T>
    where F: FnOnce(&TrackRepository<'_>, &SearchIndex) -> Result<T>
    {
        self.mutate(|store, index| commit_both(store, index, f))
    }
}

/// Stage changes in both stores and commit them together.
///
/// The index commits inside the SQLite transaction: if it fails, the rows are
/// rolled back with it. Callers must hold the mutation lock.
pub fn commit_both<T, F>(store: &TrackStore, index: &SearchIndex, f: F) -> Result<T>
where F: FnOnce(&TrackRepository<'_>, &SearchIndex) -> Result<T>
{
    store.write(|repo| {
        let out = f(repo, index)?;
        index.commit()?;
        Ok(out)
    })
}
