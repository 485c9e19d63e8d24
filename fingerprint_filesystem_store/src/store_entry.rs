use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use vid_clip_finder_lib::{AudioFingerprint, FingerprintKind, VisualFingerprint};

use crate::video_id::VideoId;

/// Scalar metadata for one video in the collection. Created and refreshed by
/// sync; cheap compared to fingerprints.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct VideoRecord {
    pub id: VideoId,
    /// Where the file currently lives. Mutable: renames update this without
    /// touching the id or the fingerprints.
    pub src_path: PathBuf,
    pub fps: f64,
    pub duration_secs: f64,
    pub sample_rate: Option<u32>,
    pub frame_count: u64,
    /// Modification time (seconds since the epoch) when last synced, used to
    /// skip re-hashing untouched files.
    pub mtime_secs: i64,
}

/// One store entry: the record plus at most one fingerprint sequence per
/// kind (upsert semantics, never append).
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct StoreEntry {
    pub record: VideoRecord,
    pub audio: Option<AudioFingerprint>,
    pub visual: Option<VisualFingerprint>,
}

impl StoreEntry {
    pub fn new(record: VideoRecord) -> Self {
        Self {
            record,
            audio: None,
            visual: None,
        }
    }

    pub fn has_fingerprint(&self, kind: FingerprintKind) -> bool {
        match kind {
            FingerprintKind::Audio => self.audio.is_some(),
            FingerprintKind::Visual => self.visual.is_some(),
        }
    }

    /// True when the entry can participate in queries (both kinds present).
    pub fn is_queryable(&self) -> bool {
        self.audio.is_some() && self.visual.is_some()
    }
}
