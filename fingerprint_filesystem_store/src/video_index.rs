use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering::Relaxed},
    time::UNIX_EPOCH,
};

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use walkdir::WalkDir;

use vid_clip_finder_lib::{
    find_best_alignment, AudioFingerprint, CancelToken, CandidateFingerprints, ExtractError,
    Extractor, ExtractorCfg, FfmpegMedia, Fingerprint, FingerprintKind, MatchConfig, MatchError,
    MediaAccess, QueryFingerprints, VisualFingerprint,
};

use crate::base_store::BaseStore;
use crate::errors::StoreError;
use crate::store_entry::{StoreEntry, VideoRecord};
use crate::video_id::VideoId;

/// Name of the store file, created inside the collection directory.
pub const STORE_FILE_NAME: &str = "fingerprints.db";

const DEFAULT_SAVE_THRESHOLD: u32 = 64;

// Filesystems differ in mtime granularity (FUSE/sshfs in particular), so a
// file only counts as touched when its mtime moved by more than this.
const MTIME_TOLERANCE_SECS: i64 = 2;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "webm", "avi", "mov", "m4v"];

/// Options for opening a [`VideoIndex`].
#[derive(Debug, Clone)]
pub struct VideoIndexCfg {
    /// Number of store mutations after which the store autosaves.
    pub save_threshold: u32,
    /// Extraction configuration, applied to indexing and querying alike.
    pub extractor: ExtractorCfg,
    /// Matching configuration.
    pub matching: MatchConfig,
}

impl Default for VideoIndexCfg {
    fn default() -> Self {
        Self {
            save_threshold: DEFAULT_SAVE_THRESHOLD,
            extractor: ExtractorCfg::default(),
            matching: MatchConfig::default(),
        }
    }
}

/// Lifecycle of an index handle. `query` only succeeds in `Queryable`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum IndexState {
    /// Opened, but never synced against the collection directory.
    Uninitialized,
    /// Metadata reflects the directory; no fingerprints yet.
    Synced,
    /// Fingerprints of one kind exist, but no video holds both kinds.
    Fingerprinted(FingerprintKind),
    /// At least one video holds both fingerprint kinds.
    Queryable,
}

/// What a [`sync`][VideoIndex::sync] pass did.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct SyncReport {
    /// Entries created for files new to the store.
    pub added: usize,
    /// Entries whose file was renamed or touched without a content change;
    /// their fingerprints were kept.
    pub relinked: usize,
    /// Files whose entries needed nothing.
    pub unchanged: usize,
    /// Entries removed because their file is gone (or its content changed).
    pub removed: usize,
    /// Files that could not be read or probed; logged and skipped.
    pub failed: Vec<PathBuf>,
}

/// What a [`fingerprint_all`][VideoIndex::fingerprint_all] pass did.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct FingerprintReport {
    pub fingerprinted: usize,
    /// Entries skipped because they already held their fingerprints.
    pub skipped: usize,
    /// Entries left untouched because the pass was cancelled.
    pub cancelled: usize,
    /// Files whose decode failed; logged and skipped.
    pub failed: Vec<PathBuf>,
}

/// Outcome classification of one query.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub enum QueryStatus {
    /// Confident match.
    Match,
    /// Best guess provided, but the margin to the runner-up was below the
    /// ambiguity threshold.
    AmbiguousMatch,
    /// The store holds no candidate that could contain the clip.
    NoCandidates,
    /// The query clip itself could not be decoded.
    CorruptMedia,
    /// The clip was fingerprinted on a different window/chunk grid than the
    /// store.
    IncompatibleFingerprint,
}

impl std::fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            QueryStatus::Match => "match",
            QueryStatus::AmbiguousMatch => "ambiguous match",
            QueryStatus::NoCandidates => "no candidates",
            QueryStatus::CorruptMedia => "corrupt media",
            QueryStatus::IncompatibleFingerprint => "incompatible fingerprint",
        };
        write!(f, "{text}")
    }
}

/// The located source of a query clip.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct QueryMatch {
    pub video_id: VideoId,
    pub src_path: PathBuf,
    /// Offset of the clip into the matched video, in seconds.
    pub offset_secs: f64,
    /// Normalized margin between the best and second-best candidates.
    pub confidence: f64,
    /// Combined distance at the winning alignment, in `0..=1`.
    pub distance: f64,
}

/// Result of one query: a typed status, plus the best guess when one exists.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct QueryResult {
    pub status: QueryStatus,
    pub best: Option<QueryMatch>,
}

impl QueryResult {
    fn status_only(status: QueryStatus) -> Self {
        Self { status, best: None }
    }
}

/// The index manager: one handle owning the store for a collection
/// directory, the extraction pipeline that fills it, and the query surface.
///
/// Writers (sync, fingerprinting) take the store's write lock per mutation;
/// queries hold the read lock for the duration of the candidate scan, so
/// they run concurrently with each other but never overlap a rebuild.
pub struct VideoIndex<M> {
    collection_dir: PathBuf,
    store: BaseStore,
    extractor: Extractor<M>,
    matching: MatchConfig,
    synced: AtomicBool,
}

/// The index most callers want: ffmpeg-backed media access.
pub type FfmpegVideoIndex = VideoIndex<FfmpegMedia>;

impl FfmpegVideoIndex {
    /// Open the collection at `collection_dir` with default configuration
    /// and ffmpeg decoding.
    pub fn open_collection(collection_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open(collection_dir, FfmpegMedia, VideoIndexCfg::default())
    }
}

impl<M: MediaAccess> VideoIndex<M> {
    /// Open (or create) the store inside `collection_dir`.
    ///
    /// If the stored schema version does not match [`crate::SCHEMA_VERSION`]
    /// every entry is dropped, metadata is re-synced from the directory, and
    /// the new version is recorded. No attempt is made to migrate.
    pub fn open(
        collection_dir: impl AsRef<Path>,
        media: M,
        cfg: VideoIndexCfg,
    ) -> Result<Self, StoreError> {
        let collection_dir = collection_dir.as_ref().to_path_buf();
        let store_path = collection_dir.join(STORE_FILE_NAME);
        let had_store_file = store_path.exists();

        let (store, discarded) = BaseStore::open(store_path, cfg.save_threshold)?;

        let ret = Self {
            collection_dir,
            store,
            extractor: Extractor::with_cfg(media, cfg.extractor),
            matching: cfg.matching,
            // a valid pre-existing store file is trusted as already synced
            synced: AtomicBool::new(had_store_file && !discarded),
        };

        if discarded {
            ret.sync()?;
            ret.save()?;
        }

        Ok(ret)
    }

    /// Where the index lifecycle currently stands.
    pub fn state(&self) -> IndexState {
        if !self.synced.load(Relaxed) {
            return IndexState::Uninitialized;
        }

        let entries = self.store.read();
        if entries.values().any(StoreEntry::is_queryable) {
            IndexState::Queryable
        } else if entries.values().any(|e| e.audio.is_some()) {
            IndexState::Fingerprinted(FingerprintKind::Audio)
        } else if entries.values().any(|e| e.visual.is_some()) {
            IndexState::Fingerprinted(FingerprintKind::Visual)
        } else {
            IndexState::Synced
        }
    }

    /// Reconcile the store with the files currently in the collection
    /// directory.
    ///
    /// * files that vanished lose their entries;
    /// * new files gain metadata-only entries;
    /// * files whose mtime is unchanged are not even re-hashed;
    /// * renamed or touched files whose content is unchanged keep their
    ///   entry (and fingerprints) under the same id.
    ///
    /// A file that cannot be read or probed is logged and skipped; it never
    /// aborts the pass.
    pub fn sync(&self) -> Result<SyncReport, StoreError> {
        let files = self.collection_files()?;
        info!(target: "store_sync",
            "syncing {} files under {}",
            files.len(),
            self.collection_dir.display()
        );

        let by_path: HashMap<PathBuf, (VideoId, i64)> = self
            .store
            .read()
            .values()
            .map(|e| (e.record.src_path.clone(), (e.record.id.clone(), e.record.mtime_secs)))
            .collect();

        let mut report = SyncReport::default();
        let mut live: HashSet<VideoId> = HashSet::new();

        for file in &files {
            let mtime_secs = match file_mtime_secs(file) {
                Ok(mtime) => mtime,
                Err(e) => {
                    warn!(target: "store_sync", "cannot stat {}: {e}", file.display());
                    report.failed.push(file.clone());
                    continue;
                }
            };

            if let Some((id, stored_mtime)) = by_path.get(file) {
                if (stored_mtime - mtime_secs).abs() <= MTIME_TOLERANCE_SECS {
                    live.insert(id.clone());
                    report.unchanged += 1;
                    continue;
                }
            }

            let id = match VideoId::from_file(file) {
                Ok(id) => id,
                Err(e) => {
                    warn!(target: "store_sync", "cannot hash {}: {e}", file.display());
                    report.failed.push(file.clone());
                    continue;
                }
            };

            if self.store.contains(&id) {
                // same content under a new name or a fresh mtime: keep the
                // entry and its fingerprints, update the mutable attributes
                debug!(target: "store_sync", "relinking {id} to {}", file.display());
                self.store.modify(&id, |entry| {
                    entry.record.src_path = file.clone();
                    entry.record.mtime_secs = mtime_secs;
                })?;
                live.insert(id);
                report.relinked += 1;
                continue;
            }

            let media_info = match self.extractor.media().probe(file) {
                Ok(media_info) => media_info,
                Err(e) => {
                    warn!(target: "store_sync", "skipping unreadable media {}: {e}", file.display());
                    report.failed.push(file.clone());
                    continue;
                }
            };

            let record = VideoRecord {
                id: id.clone(),
                src_path: file.clone(),
                fps: media_info.fps(),
                duration_secs: media_info.duration_secs(),
                sample_rate: media_info.sample_rate(),
                frame_count: media_info.frame_count(),
                mtime_secs,
            };
            self.store.insert(id.clone(), StoreEntry::new(record))?;
            live.insert(id);
            report.added += 1;
        }

        for id in self.store.ids() {
            if !live.contains(&id) {
                self.store.remove(&id)?;
                report.removed += 1;
            }
        }

        self.synced.store(true, Relaxed);
        info!(target: "store_sync",
            "sync complete: {} added, {} relinked, {} unchanged, {} removed, {} failed",
            report.added,
            report.relinked,
            report.unchanged,
            report.removed,
            report.failed.len()
        );
        Ok(report)
    }

    /// Compute missing fingerprints for every synced video, in parallel.
    ///
    /// With `rerun` false, videos already holding a fingerprint of a kind
    /// keep it (skip-if-present); with `rerun` true everything is recomputed.
    /// A video whose decode fails is logged and skipped; cancellation stops
    /// cleanly between windows and leaves completed work in the store.
    pub fn fingerprint_all(
        &self,
        rerun: bool,
        cancel: &CancelToken,
    ) -> Result<FingerprintReport, StoreError> {
        type Extracted = Result<(Option<AudioFingerprint>, Option<VisualFingerprint>), ExtractError>;

        let mut todo: Vec<(VideoId, PathBuf, bool, bool)> = self
            .store
            .read()
            .values()
            .map(|e| {
                (
                    e.record.id.clone(),
                    e.record.src_path.clone(),
                    rerun || e.audio.is_none(),
                    rerun || e.visual.is_none(),
                )
            })
            .filter(|(_, _, need_audio, need_visual)| *need_audio || *need_visual)
            .collect();
        todo.sort_by(|a, b| a.0.cmp(&b.0));

        let mut report = FingerprintReport::default();
        report.skipped = self.store.len() - todo.len();

        info!(target: "store_fingerprint",
            "fingerprinting {} of {} videos (rerun: {rerun})",
            todo.len(),
            self.store.len()
        );

        let results: Vec<(VideoId, PathBuf, Extracted)> = todo
            .into_par_iter()
            .map(|(id, path, need_audio, need_visual)| {
                let extracted = (|| {
                    let audio = need_audio
                        .then(|| self.extractor.extract_audio(&path, cancel))
                        .transpose()?;
                    let visual = need_visual
                        .then(|| self.extractor.extract_visual(&path, cancel))
                        .transpose()?;
                    Ok((audio, visual))
                })();
                (id, path, extracted)
            })
            .collect();

        for (id, path, extracted) in results {
            match extracted {
                Ok((audio, visual)) => {
                    self.store.modify(&id, |entry| {
                        if let Some(audio) = audio {
                            entry.audio = Some(audio);
                        }
                        if let Some(visual) = visual {
                            entry.visual = Some(visual);
                        }
                    })?;
                    report.fingerprinted += 1;
                }
                Err(ExtractError::Cancelled(_)) => {
                    report.cancelled += 1;
                }
                Err(e @ ExtractError::CorruptMedia { .. }) => {
                    warn!(target: "store_fingerprint", "skipping {}: {e}", path.display());
                    report.failed.push(path);
                }
            }
        }

        self.save()?;
        Ok(report)
    }

    /// Idempotent overwrite of one fingerprint sequence. With `rerun` false
    /// and a sequence of that kind already present, the call is a no-op and
    /// returns `false`.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if `id` is not in the store.
    pub fn upsert_fingerprint(
        &self,
        id: &VideoId,
        fingerprint: Fingerprint,
        rerun: bool,
    ) -> Result<bool, StoreError> {
        let entry = self.store.fetch(id)?;
        if !rerun && entry.has_fingerprint(fingerprint.kind()) {
            debug!(target: "store_fingerprint",
                "{id} already holds a {} fingerprint, skipping",
                fingerprint.kind()
            );
            return Ok(false);
        }

        self.store.modify(id, |entry| match fingerprint {
            Fingerprint::Audio(fp) => entry.audio = Some(fp),
            Fingerprint::Visual(fp) => entry.visual = Some(fp),
        })?;
        Ok(true)
    }

    /// The record and fingerprints for `id`.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if `id` is not in the store.
    pub fn get(&self, id: &VideoId) -> Result<StoreEntry, StoreError> {
        self.store.fetch(id)
    }

    /// Locate the video and timestamp the clip at `clip_path` was taken
    /// from.
    ///
    /// Always returns a typed [`QueryResult`]; decode and matching failures
    /// surface as statuses, never as errors.
    pub fn query(&self, clip_path: &Path) -> QueryResult {
        if self.state() != IndexState::Queryable {
            info!(target: "store_query",
                "query rejected: store at {} holds no queryable candidate",
                self.collection_dir.display()
            );
            return QueryResult::status_only(QueryStatus::NoCandidates);
        }

        let cancel = CancelToken::new();
        let (audio, visual) = match self.extractor.extract_both(clip_path, &cancel) {
            Ok(fingerprints) => fingerprints,
            Err(e) => {
                warn!(target: "store_query", "cannot fingerprint query clip: {e}");
                return QueryResult::status_only(QueryStatus::CorruptMedia);
            }
        };
        let query = QueryFingerprints { audio, visual };

        let entries = self.store.read();
        let candidates: Vec<CandidateFingerprints<'_>> = entries
            .values()
            .filter_map(|entry| {
                Some(CandidateFingerprints {
                    id: entry.record.id.as_str(),
                    audio: entry.audio.as_ref()?,
                    visual: entry.visual.as_ref()?,
                })
            })
            .collect();

        match find_best_alignment(&query, &candidates, &self.matching) {
            Ok(best) => {
                let video_id = VideoId::from(best.id.as_str());
                let src_path = entries
                    .get(&video_id)
                    .map(|entry| entry.record.src_path.clone())
                    .unwrap_or_default();

                let status = if best.ambiguous {
                    QueryStatus::AmbiguousMatch
                } else {
                    QueryStatus::Match
                };
                info!(target: "store_query",
                    "clip {} matched {} at {:.2}s (confidence {:.2})",
                    clip_path.display(),
                    src_path.display(),
                    best.offset_secs,
                    best.confidence
                );

                QueryResult {
                    status,
                    best: Some(QueryMatch {
                        video_id,
                        src_path,
                        offset_secs: best.offset_secs,
                        confidence: best.confidence,
                        distance: best.distance,
                    }),
                }
            }
            Err(MatchError::NoCandidates) => QueryResult::status_only(QueryStatus::NoCandidates),
            Err(MatchError::IncompatibleFingerprint(detail)) => {
                warn!(target: "store_query", "incompatible query fingerprints: {detail}");
                QueryResult::status_only(QueryStatus::IncompatibleFingerprint)
            }
        }
    }

    /// Write the store to disk if it has unsaved changes.
    pub fn save(&self) -> Result<(), StoreError> {
        self.store.save()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.len() == 0
    }

    pub fn ids(&self) -> Vec<VideoId> {
        self.store.ids()
    }

    fn collection_files(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut files = vec![];
        for dir_entry in WalkDir::new(&self.collection_dir) {
            let dir_entry = dir_entry.map_err(|e| StoreError::CollectionIo {
                src: e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "walk error")),
                path: self.collection_dir.clone(),
            })?;

            if !dir_entry.file_type().is_file() {
                continue;
            }
            let path = dir_entry.into_path();
            if has_video_extension(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

fn has_video_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            VIDEO_EXTENSIONS.iter().any(|known| *known == ext)
        })
        .unwrap_or(false)
}

fn file_mtime_secs(path: &Path) -> Result<i64, std::io::Error> {
    let mtime = std::fs::metadata(path)?.modified()?;
    Ok(mtime.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64)
}
