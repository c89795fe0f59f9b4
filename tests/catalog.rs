use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, UNIX_EPOCH};

use tempfile::{tempdir, TempDir};
use tunedex::librarian::Librarian;
use tunedex::{FsChange, Settings, SyncPhase, Tunedex, TunedexError};

struct Library {
    music: TempDir,
    data: TempDir,
}

impl Library {
    fn new() -> Self {
        Self { music: tempdir().unwrap(), data: tempdir().unwrap() }
    }

    fn settings(&self) -> Settings {
        let mut settings = Settings::default();
        settings.library.music_root = self.music.path().to_path_buf();
        settings.library.data_dir = self.data.path().to_path_buf();
        settings.index.writer_heap_bytes = 15_000_000;
        settings.sync.commit_batch = 4;
        settings.watch.debounce_ms = 100;
        settings
    }

    fn open(&self) -> Tunedex {
        Tunedex::open(self.settings()).unwrap()
    }

    /// Write an untagged placeholder; metadata comes from the path.
    fn add(&self, rel: &str) -> PathBuf {
        let path = self.music.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"placeholder audio").unwrap();
        path
    }
}

fn key(tunedex: &Tunedex, rel: &str) -> String {
    tunedex.catalog().music_root().join(rel).to_string_lossy().into_owned()
}

fn store_keys(tunedex: &Tunedex) -> HashSet<String> {
    tunedex.catalog().store().read(|repo| repo.all_paths()).unwrap()
}

fn index_keys(tunedex: &Tunedex) -> HashSet<String> {
    tunedex.catalog().index().all_paths().unwrap()
}

#[test]
fn test_rebuild_indexes_every_supported_file() {
    let lib = Library::new();
    let rels = [
        "Daft Punk/Discovery/One More Time.mp3",
        "Daft Punk/Discovery/Aerodynamic.FLAC",
        "Daft Punk/Homework/Da Funk.ogg",
        "Air/Moon Safari/La Femme d'Argent.m4a",
        "Air/Moon Safari/Sexy Boy.wav",
        "Loose/single.wma",
    ];
    for rel in rels {
        lib.add(rel);
    }
    lib.add("Air/Moon Safari/cover.jpg");
    lib.add("Air/Moon Safari/notes.txt");

    let tunedex = lib.open();
    assert_eq!(tunedex.phase(), SyncPhase::Ready);
    assert_eq!(tunedex.track_count().unwrap(), rels.len() as u64);

    let expected: HashSet<String> = rels.iter().map(|r| key(&tunedex, r)).collect();
    assert_eq!(store_keys(&tunedex), expected);
    assert_eq!(index_keys(&tunedex), expected);

    // A forced rebuild lands in the same place.
    assert_eq!(tunedex.rebuild().unwrap(), rels.len());
    assert_eq!(store_keys(&tunedex), expected);
    assert_eq!(index_keys(&tunedex), expected);
}

#[test]
fn test_resync_converges_on_add_and_remove() {
    let lib = Library::new();
    lib.add("A/One/f1.mp3");
    let g = lib.add("A/One/g.mp3");
    let tunedex = lib.open();
    let old_keys = store_keys(&tunedex);

    lib.add("B/Two/f.flac");
    fs::remove_file(g).unwrap();
    let report = tunedex.resync().unwrap();
    assert_eq!((report.added, report.removed), (1, 1));

    let mut expected = old_keys;
    expected.remove(&key(&tunedex, "A/One/g.mp3"));
    expected.insert(key(&tunedex, "B/Two/f.flac"));
    assert_eq!(store_keys(&tunedex), expected);
    assert_eq!(index_keys(&tunedex), expected);
    assert!(tunedex.search("g").iter().all(|hit| !hit.path.ends_with("g.mp3")));
}

#[test]
fn test_resync_does_not_refresh_edited_files() {
    let lib = Library::new();
    let path = lib.add("A/One/edited.mp3");
    let tunedex = lib.open();
    let before = tunedex.lookup(&key(&tunedex, "A/One/edited.mp3")).unwrap().unwrap();

    fs::write(&path, b"different bytes entirely").unwrap();
    let file = fs::File::options().write(true).open(&path).unwrap();
    file.set_modified(UNIX_EPOCH + Duration::from_secs(1_000_000)).unwrap();
    drop(file);

    let report = tunedex.resync().unwrap();
    assert_eq!((report.added, report.removed), (0, 0));
    let after = tunedex.lookup(&before.path).unwrap().unwrap();
    assert_eq!(after, before);

    // The staleness sample notices; a watcher event repairs it.
    assert!(tunedex.is_stale().unwrap());
    Librarian::apply(tunedex.catalog(), &FsChange::Upsert(PathBuf::from(&before.path))).unwrap();
    let refreshed = tunedex.lookup(&before.path).unwrap().unwrap();
    assert_eq!(refreshed.mtime, Some(1_000_000.0));
    assert!(!tunedex.is_stale().unwrap());
}

#[test]
fn test_fuzzy_query_tolerates_one_edit() {
    let lib = Library::new();
    lib.add("Daft Punk/Discovery/One More Time.mp3");
    lib.add("Air/Moon Safari/Sexy Boy.mp3");
    let tunedex = lib.open();

    let hits = tunedex.search("Daftt Punk");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].artist, "Daft Punk");
    assert_eq!(hits[0].album, "Discovery");
    assert_eq!(hits[0].title, "One More Time");

    assert_eq!(tunedex.search("moon safary").len(), 1);
}

#[test]
fn test_blank_queries_return_nothing() {
    let lib = Library::new();
    lib.add("A/B/track.mp3");
    let tunedex = lib.open();

    assert!(tunedex.search("").is_empty());
    assert!(tunedex.search("   ").is_empty());
    assert!(tunedex.search_with_limit("track", 0).is_empty());
    assert_eq!(tunedex.summarize("  ").total_tracks, 0);
}

#[test]
fn test_delete_event_removes_track_from_search() {
    let lib = Library::new();
    let path = lib.add("Daft Punk/Discovery/Aerodynamic.mp3");
    lib.add("Daft Punk/Discovery/One More Time.mp3");
    let tunedex = lib.open();
    assert_eq!(tunedex.search("Aerodynamic").len(), 1);

    fs::remove_file(&path).unwrap();
    let canonical = tunedex.catalog().music_root().join("Daft Punk/Discovery/Aerodynamic.mp3");
    Librarian::apply(tunedex.catalog(), &FsChange::Remove(canonical.clone())).unwrap();

    assert!(tunedex.search("Aerodynamic").is_empty());
    assert!(tunedex.lookup(&canonical.to_string_lossy()).unwrap().is_none());
    assert_eq!(tunedex.track_count().unwrap(), 1);
}

#[test]
fn test_untagged_file_falls_back_to_directories() {
    let lib = Library::new();
    lib.add("ArtistA/AlbumB/track.mp3");
    let tunedex = lib.open();

    let record = tunedex.lookup(&key(&tunedex, "ArtistA/AlbumB/track.mp3")).unwrap().unwrap();
    assert_eq!(record.artist, "ArtistA");
    assert_eq!(record.album, "AlbumB");
    assert_eq!(record.title, "track");
    assert_eq!(record.filename, "track.mp3");
    assert!(record.mtime.is_some());
}

#[test]
fn test_move_event_replaces_source_with_destination() {
    let lib = Library::new();
    let a = lib.add("ArtistA/AlbumB/before.mp3");
    let tunedex = lib.open();
    let old = tunedex.lookup(&key(&tunedex, "ArtistA/AlbumB/before.mp3")).unwrap().unwrap();

    let b = a.with_file_name("after.mp3");
    fs::rename(&a, &b).unwrap();
    let root = tunedex.catalog().music_root();
    let change = FsChange::Move {
        from: root.join("ArtistA/AlbumB/before.mp3"),
        to: root.join("ArtistA/AlbumB/after.mp3"),
    };
    Librarian::apply(tunedex.catalog(), &change).unwrap();

    let expected: HashSet<String> = [key(&tunedex, "ArtistA/AlbumB/after.mp3")].into_iter().collect();
    assert_eq!(store_keys(&tunedex), expected);
    assert_eq!(index_keys(&tunedex), expected);

    let new = tunedex.lookup(&key(&tunedex, "ArtistA/AlbumB/after.mp3")).unwrap().unwrap();
    assert_eq!((new.artist.as_str(), new.album.as_str()), (old.artist.as_str(), old.album.as_str()));
    assert_eq!(new.title, "after");
}

#[test]
fn test_hit_without_store_row_uses_index_fields() {
    let lib = Library::new();
    lib.add("Daft Punk/Discovery/One More Time.mp3");
    let tunedex = lib.open();
    let path = key(&tunedex, "Daft Punk/Discovery/One More Time.mp3");

    tunedex
        .catalog()
        .mutate(|store, _| store.write(|repo| repo.delete(&path)))
        .unwrap();

    let hits = tunedex.search("discovery");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].path, path);
    assert_eq!(hits[0].artist, "Daft Punk");
    assert_eq!(hits[0].title, "One More Time");
}

#[test]
fn test_summary_groups_hits() {
    let lib = Library::new();
    lib.add("Daft Punk/Discovery/One More Time.mp3");
    lib.add("Daft Punk/Discovery/Aerodynamic.mp3");
    lib.add("Daft Punk/Homework/Da Funk.mp3");
    let tunedex = lib.open();

    let summary = tunedex.summarize("daft punk");
    assert_eq!(summary.total_tracks, 3);
    assert_eq!(summary.tracks.len(), 3);
    assert_eq!(summary.artists.len(), 1);
    assert_eq!(summary.artists[0].track_count, 3);
    assert_eq!(summary.albums[0].name, "Discovery");
    assert_eq!(summary.albums[0].track_count, 2);
    assert_eq!(summary.query, "daft punk");
}

#[test]
fn test_catalog_survives_reopen() {
    let lib = Library::new();
    lib.add("A/B/persisted.mp3");
    {
        let tunedex = lib.open();
        assert_eq!(tunedex.track_count().unwrap(), 1);
    }
    lib.add("A/B/unseen.mp3");

    let tunedex = lib.open();
    assert_eq!(tunedex.phase(), SyncPhase::Ready);
    // Reopening does not resync on its own.
    assert_eq!(tunedex.track_count().unwrap(), 1);
    assert_eq!(tunedex.search("persisted").len(), 1);
}

#[test]
fn test_missing_music_root_is_reported() {
    let lib = Library::new();
    let mut settings = lib.settings();
    settings.library.music_root = lib.music.path().join("nope");
    assert!(matches!(Tunedex::open(settings), Err(TunedexError::MusicRootMissing(_))));
}

fn wait_for(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    check()
}

#[test]
fn test_watcher_picks_up_live_changes() {
    let lib = Library::new();
    lib.add("A/B/existing.mp3");
    let tunedex = lib.open();

    tunedex.start_watching().unwrap();
    tunedex.start_watching().unwrap();
    assert!(tunedex.is_watching());

    let added = key(&tunedex, "A/B/fresh.mp3");
    lib.add("A/B/fresh.mp3");
    assert!(wait_for(Duration::from_secs(10), || tunedex.lookup(&added).unwrap().is_some()));

    fs::remove_file(Path::new(&added)).unwrap();
    assert!(wait_for(Duration::from_secs(10), || tunedex.lookup(&added).unwrap().is_none()));

    tunedex.stop_watching().unwrap();
    tunedex.stop_watching().unwrap();
    assert!(!tunedex.is_watching());
    assert_eq!(store_keys(&tunedex), index_keys(&tunedex));
}

#[test]
fn test_watcher_follows_directory_rename() {
    let lib = Library::new();
    lib.add("Artist/Old/one.mp3");
    lib.add("Artist/Old/Disc 2/two.flac");
    lib.add("Artist/Older/keep.mp3");
    let tunedex = lib.open();
    tunedex.start_watching().unwrap();

    fs::rename(lib.music.path().join("Artist/Old"), lib.music.path().join("Artist/New")).unwrap();

    let new_one = key(&tunedex, "Artist/New/one.mp3");
    let new_two = key(&tunedex, "Artist/New/Disc 2/two.flac");
    assert!(wait_for(Duration::from_secs(10), || {
        tunedex.lookup(&new_one).unwrap().is_some() && tunedex.lookup(&new_two).unwrap().is_some()
    }));
    assert!(wait_for(Duration::from_secs(10), || {
        tunedex.lookup(&key(&tunedex, "Artist/Old/one.mp3")).unwrap().is_none()
    }));
    tunedex.stop_watching().unwrap();

    let expected: HashSet<String> =
        [new_one.clone(), new_two, key(&tunedex, "Artist/Older/keep.mp3")].into_iter().collect();
    assert_eq!(store_keys(&tunedex), expected);
    assert_eq!(index_keys(&tunedex), expected);
    assert_eq!(tunedex.lookup(&new_one).unwrap().unwrap().album, "New");
}

#[test]
fn test_watcher_indexes_album_moved_into_library() {
    let lib = Library::new();
    lib.add("Artist/Existing/a.mp3");
    let outside = tempdir().unwrap();
    let album = outside.path().join("Album");
    fs::create_dir_all(&album).unwrap();
    for name in ["01 Intro.mp3", "02 Song.mp3", "cover.jpg"] {
        fs::write(album.join(name), b"placeholder audio").unwrap();
    }

    let tunedex = lib.open();
    tunedex.start_watching().unwrap();
    fs::rename(&album, lib.music.path().join("Artist/Album")).unwrap();

    assert!(wait_for(Duration::from_secs(10), || tunedex.track_count().unwrap() == 3));
    tunedex.stop_watching().unwrap();

    let record = tunedex.lookup(&key(&tunedex, "Artist/Album/02 Song.mp3")).unwrap().unwrap();
    assert_eq!((record.artist.as_str(), record.album.as_str()), ("Artist", "Album"));
    assert_eq!(store_keys(&tunedex), index_keys(&tunedex));
}

#[test]
fn test_tree_changes_apply_to_both_stores() {
    let lib = Library::new();
    lib.add("Artist/Old/one.mp3");
    lib.add("Artist/Old/two.mp3");
    lib.add("Artist/Oldies/three.mp3");
    let tunedex = lib.open();

    fs::rename(lib.music.path().join("Artist/Old"), lib.music.path().join("Artist/New")).unwrap();
    let root = tunedex.catalog().music_root().to_path_buf();
    let report = Librarian::apply_batch(
        tunedex.catalog(),
        &[
            FsChange::RemoveTree(root.join("Artist/Old")),
            FsChange::ScanTree(root.join("Artist/New")),
        ],
    )
    .unwrap();
    assert_eq!((report.added, report.removed), (2, 2));

    let expected: HashSet<String> = [
        key(&tunedex, "Artist/New/one.mp3"),
        key(&tunedex, "Artist/New/two.mp3"),
        key(&tunedex, "Artist/Oldies/three.mp3"),
    ]
    .into_iter()
    .collect();
    assert_eq!(store_keys(&tunedex), expected);
    assert_eq!(index_keys(&tunedex), expected);
}

#[test]
fn test_batch_applies_changes_in_order() {
    let lib = Library::new();
    lib.add("A/B/kept.mp3");
    lib.add("A/B/dropped.mp3");
    let tunedex = lib.open();
    let root = tunedex.catalog().music_root().to_path_buf();
    let kept = root.join("A/B/kept.mp3");
    let dropped = root.join("A/B/dropped.mp3");

    fs::remove_file(&dropped).unwrap();
    let fresh: Vec<FsChange> = (0..5)
        .map(|i| {
            let rel = format!("A/C/new{i}.mp3");
            lib.add(&rel);
            FsChange::Upsert(root.join(rel))
        })
        .collect();
    let mut changes = vec![FsChange::Remove(kept.clone()), FsChange::Upsert(dropped.clone())];
    changes.extend(fresh);
    changes.push(FsChange::Remove(dropped.clone()));

    Librarian::apply_batch(tunedex.catalog(), &changes).unwrap();

    // `kept` still exists, so its remove re-indexes it; `dropped` is gone.
    assert!(tunedex.lookup(&kept.to_string_lossy()).unwrap().is_some());
    assert!(tunedex.lookup(&dropped.to_string_lossy()).unwrap().is_none());
    assert_eq!(tunedex.track_count().unwrap(), 6);
    assert_eq!(store_keys(&tunedex), index_keys(&tunedex));
}
