// FILE: src/engine/synchronizer.rs
//! Bulk reconciliation between the music directory and the store pair.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::{Instant, UNIX_EPOCH};

use crate::engine::search_index::SearchIndex;
use crate::engine::walk_audio_files;
use crate::error::{Result, TunedexError};
use crate::state::{commit_both, Catalog, SyncPhase};
use crate::storage::{TrackRecord, TrackStore};

/// Outcome of an incremental resync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncReport {
    pub added: usize,
    pub removed: usize,
}

pub struct Synchronizer;

impl Synchronizer {
    /// Rebuild when the catalog has nothing usable, otherwise keep what is on disk.
    pub fn startup(catalog: &Catalog) -> Result<SyncPhase> {
        if catalog.phase() == SyncPhase::Empty {
            tracing::info!("[Synchronizer] No usable index found, building from scratch");
            Self::rebuild(catalog)?;
        }
        Ok(catalog.phase())
    }

    /// Wipe both stores and re-extract every supported file under the root.
    ///
    /// Commits every `sync.commit_batch` records so progress survives a crash
    /// and searches see partial results while the build runs.
    pub fn rebuild(catalog: &Catalog) -> Result<usize> {
        let root = Self::checked_root(catalog)?;
        let batch_size = catalog.settings().sync.commit_batch.max(1);

        let result = catalog.mutate(|store, index| {
            catalog.set_phase(SyncPhase::Building);
            let start = Instant::now();
            tracing::info!("[Synchronizer] Rebuilding catalog from {}", root.display());

            commit_both(store, index, |repo, index| {
                index.delete_all()?;
                repo.delete_all()
            })?;

            let mut batch: Vec<TrackRecord> = Vec::with_capacity(batch_size);
            let mut indexed = 0usize;
            for path in walk_audio_files(root) {
                match catalog.extractor().extract(&path) {
                    Ok(record) => batch.push(record),
                    Err(e) => tracing::debug!("[Synchronizer] Skipping {}: {}", path.display(), e),
                }
                if batch.len() >= batch_size {
                    indexed += Self::flush(store, index, &mut batch)?;
                    tracing::info!("[Synchronizer] Indexed {} files...", indexed);
                }
            }
            indexed += Self::flush(store, index, &mut batch)?;

            tracing::info!(
                "[Synchronizer] Rebuild complete: {} files in {:.2}s",
                indexed,
                start.elapsed().as_secs_f64()
            );
            Ok(indexed)
        });

        match &result {
            Ok(_) => catalog.set_phase(SyncPhase::Ready),
            Err(e) => {
                tracing::error!("[Synchronizer] Rebuild failed: {}", e);
                catalog.set_phase(SyncPhase::Empty);
            }
        }
        result
    }

    /// Add files that appeared and drop files that vanished since the last sync.
    ///
    /// Paths present on both sides are left alone even if their tags changed.
    pub fn resync(catalog: &Catalog) -> Result<SyncReport> {
        let root = Self::checked_root(catalog)?;

        let report = catalog.mutate(|store, index| {
            let start = Instant::now();
            let fs_paths: HashSet<String> = walk_audio_files(root)
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
            let db_paths = store.read(|repo| repo.all_paths())?;

            let to_remove: Vec<&String> = db_paths.difference(&fs_paths).collect();
            let records: Vec<TrackRecord> = fs_paths
                .difference(&db_paths)
                .filter_map(|p| match catalog.extractor().extract(Path::new(p)) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        tracing::debug!("[Synchronizer] Skipping {}: {}", p, e);
                        None
                    }
                })
                .collect();

            commit_both(store, index, |repo, index| {
                for path in &to_remove {
                    index.delete(path)?;
                }
                repo.delete_many(to_remove.iter().map(|p| p.as_str()))?;
                for record in &records {
                    index.add_or_replace(&record.path, &record.artist, &record.album, &record.title)?;
                    repo.upsert(record)?;
                }
                Ok(())
            })?;

            let report = SyncReport { added: records.len(), removed: to_remove.len() };
            tracing::info!(
                "[Synchronizer] Resync: +{} -{} in {:.2}s",
                report.added,
                report.removed,
                start.elapsed().as_secs_f64()
            );
            Ok(report)
        })?;

        catalog.set_phase(SyncPhase::Ready);
        Ok(report)
    }

    /// Sample up to `sample_size` stored records and report whether any of
    /// them no longer matches the file on disk.
    ///
    /// A missing file, a missing stored mtime or a differing mtime all count.
    /// Detection is probabilistic: a clean sample does not prove freshness.
    pub fn is_stale(catalog: &Catalog, sample_size: usize) -> Result<bool> {
        let sample = catalog.store().read(|repo| repo.sample_mtimes(sample_size))?;
        for (path, stored) in sample {
            let current = current_mtime(Path::new(&path));
            match (stored, current) {
                (Some(stored), Some(current)) if stored == current => continue,
                _ => {
                    tracing::info!("[Synchronizer] Stale entry detected: {}", path);
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn checked_root(catalog: &Catalog) -> Result<&Path> {
        let root = catalog.music_root();
        if !root.is_dir() {
            return Err(TunedexError::MusicRootMissing(root.to_path_buf()));
        }
        Ok(root)
    }

    fn flush(store: &TrackStore, index: &SearchIndex, batch: &mut Vec<TrackRecord>) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        commit_both(store, index, |repo, index| {
            for record in batch.iter() {
                index.add_or_replace(&record.path, &record.artist, &record.album, &record.title)?;
                repo.upsert(record)?;
            }
            Ok(())
        })?;

        let flushed = batch.len();
        batch.clear();
        Ok(flushed)
    }
}

fn current_mtime(path: &Path) -> Option<f64> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
}
