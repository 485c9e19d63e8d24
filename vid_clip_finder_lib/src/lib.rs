#![allow(clippy::len_without_is_empty)]

//! # Overview
//! vid_clip_finder_lib is a library for fingerprinting the videos of a
//! collection and locating which video (and at what timestamp) a short query
//! clip was taken from, tolerating the noise introduced by re-encoding and
//! minor cropping.
//!
//! # How it works
//! Two fingerprint sequences are generated per video:
//! * An audio sequence: one 13-coefficient spectral-shape descriptor per
//!   fixed-length window (0.1s by default), summarizing what the window
//!   sounds like;
//! * A visual sequence: one 64-bit perceptual hash per fixed-length chunk
//!   (2s by default), built by hashing every frame with the
//!   [discrete cosine transform](http://hackerfactor.com/blog/index.php%3F/archives/432-Looks-Like-It.html)
//!   and averaging the per-bit activations across the chunk.
//!
//! To answer a query the same extraction runs on the clip, and the clip's
//! sequences are slid across every candidate's sequences at every window
//! offset. The best-scoring alignment wins; the margin to the second-best
//! candidate becomes the confidence of the answer.
//!
//! # High level API
//! Build an [`Extractor`] over a [`MediaAccess`] implementation (usually
//! [`FfmpegMedia`]), extract fingerprints, then align with
//! [`find_best_alignment`]:
//!
//! ```no_run
//! use std::path::Path;
//! use vid_clip_finder_lib::*;
//!
//! let extractor = Extractor::new(FfmpegMedia);
//! let cancel = CancelToken::new();
//!
//! let (clip_audio, clip_visual) =
//!     extractor.extract_both(Path::new("clip.mp4"), &cancel).unwrap();
//! let (vid_audio, vid_visual) =
//!     extractor.extract_both(Path::new("full_video.mp4"), &cancel).unwrap();
//!
//! let query = QueryFingerprints { audio: clip_audio, visual: clip_visual };
//! let candidates = [CandidateFingerprints {
//!     id: "full_video",
//!     audio: &vid_audio,
//!     visual: &vid_visual,
//! }];
//!
//! let best = find_best_alignment(&query, &candidates, &MatchConfig::default()).unwrap();
//! println!("clip taken from {} at {:.1}s", best.id, best.offset_secs);
//! ```
//!
//! # Prerequisites
//! The [`FfmpegMedia`] backend calls ffmpeg from the command line. Ffmpeg and
//! ffprobe must be installed and visible on the command line. Media access is
//! behind the [`MediaAccess`] trait, so other decoders (or the synthetic one
//! in [`test_util`]) can be substituted.

pub(crate) mod definitions;
pub(crate) mod fingerprinting;
pub(crate) mod matching;
pub(crate) mod media;
pub(crate) mod utils;

pub use definitions::{
    DEFAULT_CHUNK_SECS, DEFAULT_SAMPLE_RATE, DEFAULT_TARGET_FPS, DEFAULT_WINDOW_SECS,
    DESCRIPTOR_DIM,
};

pub use fingerprinting::{
    extract_error::ExtractError,
    extractor::{CancelToken, Extractor, ExtractorCfg, SceneSnap},
    fingerprint::{AudioFingerprint, AudioWindow, Fingerprint, FingerprintKind, VisualFingerprint},
};

pub use matching::{
    alignment::{BestAlignment, CandidateFingerprints, QueryFingerprints},
    engine::{find_best_alignment, MatchConfig},
    match_error::MatchError,
};

pub use media::{FfmpegMedia, MediaAccess, MediaError};

// Media metadata and scene boundaries are part of the MediaAccess contract.
pub use ffmpeg_media_io::{MediaInfo, SceneBoundary};

#[doc(hidden)]
pub mod test_util;
