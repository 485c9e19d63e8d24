use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use fingerprint_filesystem_store::{
    IndexState, QueryStatus, StoreEntry, VideoId, VideoIndex, VideoIndexCfg, STORE_FILE_NAME,
};
use vid_clip_finder_lib::test_util::FakeMedia;
use vid_clip_finder_lib::{CancelToken, FingerprintKind};

/// A collection directory plus the synthetic media behind its files. Files
/// on disk carry seed-derived content (so renames keep their content id);
/// decoding happens through [`FakeMedia`].
struct Collection {
    dir: tempfile::TempDir,
    media: FakeMedia,
}

impl Collection {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            media: FakeMedia::new(),
        }
    }

    fn path_of(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn register_video(&mut self, name: &str, seed: u64, duration_secs: f64) {
        self.media.add_video(self.path_of(name), seed, duration_secs);
    }

    fn register_clip(&mut self, clip_path: &str, seed: u64, start_secs: f64, duration_secs: f64) {
        self.media.add_clip_of(clip_path, seed, start_secs, duration_secs);
    }

    fn write_video_file(&self, name: &str, seed: u64) {
        fs::write(self.path_of(name), format!("fake video content {seed}")).unwrap();
    }

    fn add_video(&mut self, name: &str, seed: u64, duration_secs: f64) {
        self.register_video(name, seed, duration_secs);
        self.write_video_file(name, seed);
    }

    fn open(&self) -> VideoIndex<FakeMedia> {
        VideoIndex::open(self.dir.path(), self.media.clone(), VideoIndexCfg::default()).unwrap()
    }
}

fn stored_paths(index: &VideoIndex<FakeMedia>) -> BTreeSet<PathBuf> {
    index
        .ids()
        .iter()
        .map(|id| index.get(id).unwrap().record.src_path)
        .collect()
}

fn entry_for_path(index: &VideoIndex<FakeMedia>, name: &str) -> StoreEntry {
    index
        .ids()
        .iter()
        .map(|id| index.get(id).unwrap())
        .find(|entry| entry.record.src_path.file_name().unwrap() == name)
        .unwrap()
}

#[test]
fn test_sync_is_idempotent_on_an_unchanged_directory() {
    let mut collection = Collection::new();
    collection.add_video("a.mp4", 1, 60.0);
    collection.add_video("b.mp4", 2, 90.0);

    let index = collection.open();
    let first = index.sync().unwrap();
    assert_eq!(first.added, 2);
    assert_eq!(first.removed, 0);

    let ids_after_first: BTreeSet<VideoId> = index.ids().into_iter().collect();

    let second = index.sync().unwrap();
    assert_eq!(second.added, 0);
    assert_eq!(second.removed, 0);
    assert_eq!(second.unchanged, 2);

    let ids_after_second: BTreeSet<VideoId> = index.ids().into_iter().collect();
    assert_eq!(ids_after_first, ids_after_second);
}

#[test]
fn test_sync_never_rewrites_fingerprints_of_unchanged_files() {
    let mut collection = Collection::new();
    collection.add_video("a.mp4", 1, 30.0);

    let index = collection.open();
    index.sync().unwrap();
    index.fingerprint_all(false, &CancelToken::new()).unwrap();

    let before = entry_for_path(&index, "a.mp4");
    assert!(before.is_queryable());

    index.sync().unwrap();
    let after = entry_for_path(&index, "a.mp4");
    assert_eq!(before, after);
}

#[test]
fn test_sync_mirrors_directory_additions_and_removals() {
    let mut collection = Collection::new();
    collection.add_video("a.mp4", 1, 30.0);
    collection.add_video("b.mp4", 2, 30.0);
    // c is known media but not on disk yet
    collection.register_video("c.mp4", 3, 30.0);

    let index = collection.open();
    index.sync().unwrap();
    assert_eq!(index.len(), 2);

    // add c, remove b
    collection.write_video_file("c.mp4", 3);
    fs::remove_file(collection.path_of("b.mp4")).unwrap();

    let report = index.sync().unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(report.removed, 1);

    let expected: BTreeSet<PathBuf> = [collection.path_of("a.mp4"), collection.path_of("c.mp4")]
        .into_iter()
        .collect();
    assert_eq!(stored_paths(&index), expected);
}

#[test]
fn test_rename_keeps_the_entry_and_its_fingerprints() {
    let mut collection = Collection::new();
    collection.add_video("old.mp4", 1, 30.0);
    // the renamed path decodes identically (same seed)
    collection.register_video("new.mp4", 1, 30.0);

    let index = collection.open();
    index.sync().unwrap();
    index.fingerprint_all(false, &CancelToken::new()).unwrap();

    let id = index.ids().pop().unwrap();
    let before = index.get(&id).unwrap();
    assert!(before.is_queryable());

    fs::rename(collection.path_of("old.mp4"), collection.path_of("new.mp4")).unwrap();

    let report = index.sync().unwrap();
    assert_eq!(report.relinked, 1);
    assert_eq!(report.added, 0);
    assert_eq!(report.removed, 0);

    let after = index.get(&id).unwrap();
    assert_eq!(after.record.src_path, collection.path_of("new.mp4"));
    assert_eq!(after.audio, before.audio);
    assert_eq!(after.visual, before.visual);
}

#[test]
fn test_fingerprint_skip_if_present_and_rerun() {
    let mut collection = Collection::new();
    collection.add_video("a.mp4", 1, 30.0);
    collection.add_video("b.mp4", 2, 30.0);

    let index = collection.open();
    index.sync().unwrap();

    let first = index.fingerprint_all(false, &CancelToken::new()).unwrap();
    assert_eq!(first.fingerprinted, 2);

    let entries_before: Vec<StoreEntry> =
        index.ids().iter().map(|id| index.get(id).unwrap()).collect();

    // nothing to do when everything is already fingerprinted
    let second = index.fingerprint_all(false, &CancelToken::new()).unwrap();
    assert_eq!(second.fingerprinted, 0);
    assert_eq!(second.skipped, 2);

    // rerun recomputes everything, bit-identically on unchanged input
    let third = index.fingerprint_all(true, &CancelToken::new()).unwrap();
    assert_eq!(third.fingerprinted, 2);

    let entries_after: Vec<StoreEntry> =
        index.ids().iter().map(|id| index.get(id).unwrap()).collect();
    assert_eq!(entries_before, entries_after);
}

#[test]
fn test_lifecycle_states() {
    let mut collection = Collection::new();
    collection.add_video("a.mp4", 1, 30.0);

    let index = collection.open();
    assert_eq!(index.state(), IndexState::Uninitialized);

    index.sync().unwrap();
    assert_eq!(index.state(), IndexState::Synced);

    let id = index.ids().pop().unwrap();
    let entry = index.get(&id).unwrap();
    assert!(!entry.has_fingerprint(FingerprintKind::Audio));

    index.fingerprint_all(false, &CancelToken::new()).unwrap();
    assert_eq!(index.state(), IndexState::Queryable);
}

#[test]
fn test_query_locates_a_clip_in_its_source_video() {
    let mut collection = Collection::new();
    collection.add_video("a.mp4", 1, 60.0);
    collection.add_video("b.mp4", 2, 90.0);
    collection.register_clip("/clips/from_b.mp4", 2, 40.0, 5.0);

    let index = collection.open();
    index.sync().unwrap();
    index.fingerprint_all(false, &CancelToken::new()).unwrap();

    let result = index.query(std::path::Path::new("/clips/from_b.mp4"));
    assert_eq!(result.status, QueryStatus::Match);

    let best = result.best.unwrap();
    let expected = entry_for_path(&index, "b.mp4");
    assert_eq!(best.video_id, expected.record.id);
    assert!((best.offset_secs - 40.0).abs() <= 0.1 + 1e-9, "offset: {}", best.offset_secs);
    assert!(best.confidence > 0.5);
}

#[test]
fn test_query_on_empty_store_is_no_candidates() {
    let collection = Collection::new();
    let index = collection.open();
    index.sync().unwrap();

    let result = index.query(std::path::Path::new("/clips/anything.mp4"));
    assert_eq!(result.status, QueryStatus::NoCandidates);
    assert!(result.best.is_none());
}

#[test]
fn test_query_before_fingerprinting_is_no_candidates() {
    let mut collection = Collection::new();
    collection.add_video("a.mp4", 1, 60.0);
    collection.register_clip("/clips/from_a.mp4", 1, 10.0, 5.0);

    let index = collection.open();
    index.sync().unwrap();

    let result = index.query(std::path::Path::new("/clips/from_a.mp4"));
    assert_eq!(result.status, QueryStatus::NoCandidates);
}

#[test]
fn test_unreadable_query_clip_is_corrupt_media() {
    let mut collection = Collection::new();
    collection.add_video("a.mp4", 1, 60.0);

    let index = collection.open();
    index.sync().unwrap();
    index.fingerprint_all(false, &CancelToken::new()).unwrap();

    let result = index.query(std::path::Path::new("/clips/never_registered.mp4"));
    assert_eq!(result.status, QueryStatus::CorruptMedia);
}

#[test]
fn test_store_survives_reopen() {
    let mut collection = Collection::new();
    collection.add_video("a.mp4", 1, 60.0);
    collection.register_clip("/clips/from_a.mp4", 1, 20.0, 5.0);

    {
        let index = collection.open();
        index.sync().unwrap();
        index.fingerprint_all(false, &CancelToken::new()).unwrap();
        index.save().unwrap();
    }

    // a valid store file is trusted on reopen; no re-sync or re-fingerprint
    let reopened = collection.open();
    assert_eq!(reopened.state(), IndexState::Queryable);

    let result = reopened.query(std::path::Path::new("/clips/from_a.mp4"));
    assert_eq!(result.status, QueryStatus::Match);
    assert!((result.best.unwrap().offset_secs - 20.0).abs() <= 0.1 + 1e-9);
}

#[test]
fn test_discarded_store_resyncs_metadata_and_forgets_fingerprints() {
    let mut collection = Collection::new();
    collection.add_video("a.mp4", 1, 60.0);
    collection.register_clip("/clips/from_a.mp4", 1, 20.0, 5.0);

    {
        let index = collection.open();
        index.sync().unwrap();
        index.fingerprint_all(false, &CancelToken::new()).unwrap();
        index.save().unwrap();
    }

    // an undecodable store file behaves like a schema version bump:
    // everything is dropped and metadata is re-synced
    fs::write(collection.path_of(STORE_FILE_NAME), b"stale schema").unwrap();

    let reopened = collection.open();
    assert_eq!(reopened.state(), IndexState::Synced);
    assert_eq!(reopened.len(), 1);

    // no stale matches before re-fingerprinting
    let result = reopened.query(std::path::Path::new("/clips/from_a.mp4"));
    assert_eq!(result.status, QueryStatus::NoCandidates);

    reopened.fingerprint_all(false, &CancelToken::new()).unwrap();
    let result = reopened.query(std::path::Path::new("/clips/from_a.mp4"));
    assert_eq!(result.status, QueryStatus::Match);
}
