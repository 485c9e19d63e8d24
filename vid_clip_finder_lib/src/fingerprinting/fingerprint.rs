use serde::{Deserialize, Serialize};

use crate::definitions::{DESCRIPTOR_DIM, FRAME_HASH_BITS};

/// The two kinds of fingerprint sequence a video can hold.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub enum FingerprintKind {
    Audio,
    Visual,
}

impl std::fmt::Display for FingerprintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FingerprintKind::Audio => write!(f, "audio"),
            FingerprintKind::Visual => write!(f, "visual"),
        }
    }
}

/// One audio window: a compact spectral-shape descriptor, plus a flag marking
/// windows that held no signal (so silence is explicit rather than an error).
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct AudioWindow {
    pub coeffs: [f32; DESCRIPTOR_DIM],
    pub silent: bool,
}

impl AudioWindow {
    pub fn silent() -> Self {
        Self {
            coeffs: [0.0; DESCRIPTOR_DIM],
            silent: true,
        }
    }
}

/// The audio fingerprint sequence of a video: one descriptor per fixed-length
/// window, in playback order.
///
/// The window length is carried with the sequence; sequences with different
/// window lengths never compare (matching rejects them as incompatible).
#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct AudioFingerprint {
    windows: Vec<AudioWindow>,
    window_secs: f64,
}

impl AudioFingerprint {
    pub fn new(windows: Vec<AudioWindow>, window_secs: f64) -> Self {
        Self { windows, window_secs }
    }

    /// An all-silent sequence of `num_windows` windows, used for videos with
    /// no audio track.
    pub fn all_silent(num_windows: usize, window_secs: f64) -> Self {
        Self {
            windows: vec![AudioWindow::silent(); num_windows],
            window_secs,
        }
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn window_secs(&self) -> f64 {
        self.window_secs
    }

    pub fn windows(&self) -> &[AudioWindow] {
        &self.windows
    }

    /// True if every window is flagged silent.
    pub fn is_all_silent(&self) -> bool {
        self.windows.iter().all(|w| w.silent)
    }
}

/// The visual fingerprint sequence of a video: one perceptual hash per
/// fixed-length chunk, in playback order. Each hash packs the 64 bits of
/// the chunk's averaged frame hash into a `u64`.
#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct VisualFingerprint {
    chunks: Vec<u64>,
    chunk_secs: f64,
}

impl VisualFingerprint {
    pub fn new(chunks: Vec<u64>, chunk_secs: f64) -> Self {
        debug_assert!(FRAME_HASH_BITS <= 64);
        Self { chunks, chunk_secs }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk_secs(&self) -> f64 {
        self.chunk_secs
    }

    pub fn chunks(&self) -> &[u64] {
        &self.chunks
    }
}

/// A fingerprint sequence of either kind, tagged so that window size and
/// dimensionality are enforced at construction rather than discovered at
/// query time.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum Fingerprint {
    Audio(AudioFingerprint),
    Visual(VisualFingerprint),
}

impl Fingerprint {
    pub fn kind(&self) -> FingerprintKind {
        match self {
            Fingerprint::Audio(_) => FingerprintKind::Audio,
            Fingerprint::Visual(_) => FingerprintKind::Visual,
        }
    }
}

impl From<AudioFingerprint> for Fingerprint {
    fn from(fp: AudioFingerprint) -> Self {
        Fingerprint::Audio(fp)
    }
}

impl From<VisualFingerprint> for Fingerprint {
    fn from(fp: VisualFingerprint) -> Self {
        Fingerprint::Visual(fp)
    }
}
