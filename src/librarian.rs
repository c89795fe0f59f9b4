// FILE: src/librarian.rs
//! The Librarian watches the music root and applies single-file changes to
//! the catalog while it runs.

use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::engine::synchronizer::SyncReport;
use crate::engine::{is_supported, walk_audio_files};
use crate::error::{Result, TunedexError};
use crate::state::{Catalog, SharedCatalog};
use crate::storage::TrackRecord;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A filesystem change reduced to what the catalog cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsChange {
    /// File created or its content changed: (re-)extract and replace.
    Upsert(PathBuf),
    Remove(PathBuf),
    /// File renamed inside the watched tree.
    Move { from: PathBuf, to: PathBuf },
    /// Directory appeared (created, renamed or moved in): index every
    /// supported file below it. The OS reports only the directory itself.
    ScanTree(PathBuf),
    /// Directory left its old location: drop every track stored below it.
    RemoveTree(PathBuf),
}

impl FsChange {
    fn touches(&self, path: &Path) -> bool {
        match self {
            FsChange::Upsert(p)
            | FsChange::Remove(p)
            | FsChange::ScanTree(p)
            | FsChange::RemoveTree(p) => p == path,
            FsChange::Move { from, to } => from == path || to == path,
        }
    }
}

/// Something showed up at `path`.
fn arrived(path: &Path) -> Option<FsChange> {
    if path.is_dir() {
        Some(FsChange::ScanTree(path.to_path_buf()))
    } else if is_supported(path) {
        Some(FsChange::Upsert(path.to_path_buf()))
    } else {
        None
    }
}

/// Something left `path`; it is gone, so a name without a supported
/// extension may have been a directory.
fn departed(path: &Path) -> FsChange {
    if is_supported(path) {
        FsChange::Remove(path.to_path_buf())
    } else {
        FsChange::RemoveTree(path.to_path_buf())
    }
}

/// Turn a raw watcher event into catalog changes.
///
/// Files with unsupported extensions are dropped. Plain directory deletions
/// are dropped too: the files inside report their own removal.
pub fn classify(event: &Event) -> Vec<FsChange> {
    let paths = &event.paths;
    match &event.kind {
        EventKind::Create(CreateKind::Folder) => {
            paths.iter().cloned().map(FsChange::ScanTree).collect()
        }
        EventKind::Create(_) => paths.iter().filter_map(|p| arrived(p)).collect(),
        EventKind::Remove(RemoveKind::Folder) => Vec::new(),
        EventKind::Remove(_) => paths
            .iter()
            .filter(|p| is_supported(p))
            .cloned()
            .map(FsChange::Remove)
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() >= 2 => {
            let (from, to) = (&paths[0], &paths[1]);
            if to.is_dir() {
                return vec![FsChange::RemoveTree(from.clone()), FsChange::ScanTree(to.clone())];
            }
            match (is_supported(from), is_supported(to)) {
                (true, true) => vec![FsChange::Move { from: from.clone(), to: to.clone() }],
                (true, false) => vec![FsChange::Remove(from.clone())],
                (false, true) => vec![FsChange::Upsert(to.clone())],
                (false, false) => Vec::new(),
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.iter().map(|p| departed(p)).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.iter().filter_map(|p| arrived(p)).collect()
        }
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .iter()
            .filter_map(|p| if p.exists() { arrived(p) } else { Some(departed(p)) })
            .collect(),
        EventKind::Modify(_) => paths
            .iter()
            .filter(|p| is_supported(p) && !p.is_dir())
            .cloned()
            .map(FsChange::Upsert)
            .collect(),
        _ => Vec::new(),
    }
}

/// Ordered buffer of pending changes.
///
/// A change is dropped when the latest pending change for the same path is
/// identical; a burst of write events on one file becomes one extraction, and
/// the several events the OS emits for one rename become one change.
#[derive(Debug, Default)]
pub struct ChangeQueue {
    pending: Vec<FsChange>,
}

impl ChangeQueue {
    pub fn push(&mut self, change: FsChange) {
        let path = match &change {
            FsChange::Move { to, .. } => to,
            FsChange::Upsert(p)
            | FsChange::Remove(p)
            | FsChange::ScanTree(p)
            | FsChange::RemoveTree(p) => p,
        };
        let latest = self.pending.iter().rev().find(|c| c.touches(path));
        if latest == Some(&change) {
            return;
        }
        self.pending.push(change);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn drain(&mut self) -> Vec<FsChange> {
        std::mem::take(&mut self.pending)
    }
}

/// A change resolved against the filesystem, ready to write.
enum Mutation {
    Put(TrackRecord),
    Delete(String),
    /// Every stored path starting with this prefix.
    DeleteTree(String),
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn dir_prefix(dir: &Path) -> String {
    let mut prefix = path_key(dir);
    if !prefix.ends_with(MAIN_SEPARATOR) {
        prefix.push(MAIN_SEPARATOR);
    }
    prefix
}

pub struct Librarian {
    catalog: SharedCatalog,
    stop: Arc<AtomicBool>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl Librarian {
    pub fn new(catalog: SharedCatalog) -> Self {
        Self {
            catalog,
            stop: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.is_some()
    }

    /// Start watching the music root. Calling it while already running is a no-op.
    pub fn start(&mut self) -> Result<()> {
        if self.thread_handle.is_some() {
            tracing::debug!("[Librarian] Already watching");
            return Ok(());
        }

        let root = self.catalog.music_root().to_path_buf();
        let (tx, rx) = mpsc::channel();
        let mut watcher = RecommendedWatcher::new(tx, notify::Config::default())?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        self.stop.store(false, Ordering::Release);
        let catalog = Arc::clone(&self.catalog);
        let stop = Arc::clone(&self.stop);
        let debounce = Duration::from_millis(self.catalog.settings().watch.debounce_ms);

        let handle = thread::Builder::new()
            .name("tunedex-librarian".into())
            .spawn(move || Self::watcher_loop(watcher, rx, catalog, stop, debounce))?;
        self.thread_handle = Some(handle);

        tracing::info!("[Librarian] Watching {}", root.display());
        Ok(())
    }

    /// Signal the watcher thread and wait for it to finish. Pending changes
    /// are applied before it exits.
    pub fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.thread_handle.take() else {
            return Ok(());
        };
        self.stop.store(true, Ordering::Release);
        handle
            .join()
            .map_err(|_| TunedexError::State("Librarian thread panicked".into()))?;
        tracing::info!("[Librarian] Stopped");
        Ok(())
    }

    fn watcher_loop(
        _watcher: RecommendedWatcher,
        rx: Receiver<notify::Result<Event>>,
        catalog: SharedCatalog,
        stop: Arc<AtomicBool>,
        debounce: Duration,
    ) {
        let mut queue = ChangeQueue::default();
        let mut last_activity = Instant::now();

        loop {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(Ok(event)) => {
                    for change in classify(&event) {
                        queue.push(change);
                    }
                    last_activity = Instant::now();
                }
                Ok(Err(e)) => tracing::warn!("[Librarian] Watch error: {}", e),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::warn!("[Librarian] Watcher channel closed");
                    break;
                }
            }

            let stopping = stop.load(Ordering::Acquire);
            if !queue.is_empty() && (stopping || last_activity.elapsed() >= debounce) {
                let changes = queue.drain();
                tracing::debug!("[Librarian] Applying {} changes", changes.len());
                if let Err(e) = Self::apply_batch(&catalog, &changes) {
                    tracing::error!("[Librarian] Failed to apply {} changes: {}", changes.len(), e);
                }
            }
            if stopping {
                break;
            }
        }
    }

    /// Apply one change to both stores under the catalog mutation lock.
    pub fn apply(catalog: &Catalog, change: &FsChange) -> Result<SyncReport> {
        Self::apply_batch(catalog, std::slice::from_ref(change))
    }

    /// Apply a drained batch in order with one joint commit.
    ///
    /// Files are read before the lock is taken. Files that vanish before they
    /// can be read are skipped. A remove for a path that exists again is
    /// treated as an upsert.
    pub fn apply_batch(catalog: &Catalog, changes: &[FsChange]) -> Result<SyncReport> {
        let mut mutations = Vec::with_capacity(changes.len());
        for change in changes {
            Self::prepare(catalog, change, &mut mutations);
        }
        if mutations.is_empty() {
            return Ok(SyncReport::default());
        }

        let report = catalog.transact(|repo, index| {
            let mut report = SyncReport::default();
            for mutation in &mutations {
                match mutation {
                    Mutation::Put(record) => {
                        index.add_or_replace(&record.path, &record.artist, &record.album, &record.title)?;
                        repo.upsert(record)?;
                        report.added += 1;
                    }
                    Mutation::Delete(path) => {
                        index.delete(path)?;
                        if repo.delete(path)? {
                            report.removed += 1;
                        }
                    }
                    Mutation::DeleteTree(prefix) => {
                        let doomed = repo.paths_under(prefix)?;
                        for path in &doomed {
                            index.delete(path)?;
                        }
                        report.removed += repo.delete_many(doomed.iter().map(String::as_str))?;
                    }
                }
            }
            Ok(report)
        })?;

        if report.added > 0 || report.removed > 0 {
            tracing::info!(
                "[Librarian] Applied {} changes: +{} -{}",
                changes.len(),
                report.added,
                report.removed
            );
        }
        Ok(report)
    }

    fn prepare(catalog: &Catalog, change: &FsChange, out: &mut Vec<Mutation>) {
        match change {
            FsChange::Upsert(path) => out.extend(Self::read_record(catalog, path).map(Mutation::Put)),
            FsChange::Remove(path) if path.is_file() => {
                out.extend(Self::read_record(catalog, path).map(Mutation::Put))
            }
            FsChange::Remove(path) => out.push(Mutation::Delete(path_key(path))),
            FsChange::Move { from, to } => {
                out.push(Mutation::Delete(path_key(from)));
                out.extend(Self::read_record(catalog, to).map(Mutation::Put));
            }
            FsChange::ScanTree(dir) => {
                for path in walk_audio_files(dir) {
                    out.extend(Self::read_record(catalog, &path).map(Mutation::Put));
                }
            }
            FsChange::RemoveTree(dir) => out.push(Mutation::DeleteTree(dir_prefix(dir))),
        }
    }

    fn read_record(catalog: &Catalog, path: &Path) -> Option<TrackRecord> {
        if !path.is_file() {
            tracing::debug!("[Librarian] {} is gone, skipping", path.display());
            return None;
        }
        match catalog.extractor().extract(path) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!("[Librarian] Could not read {}: {}", path.display(), e);
                None
            }
        }
    }
}

impl Drop for Librarian {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::error!("[Librarian] {}", e);
        }
    }
}
