use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering::Relaxed},
        Arc,
    },
};

use ffmpeg_media_io::SceneBoundary;

use crate::definitions::*;
use crate::media::MediaAccess;

use super::audio_descriptor::SpectralPlan;
use super::extract_error::ExtractError;
use super::fingerprint::{AudioFingerprint, AudioWindow, VisualFingerprint};
use super::frame_hash::{chunk_hash, hash_frame};

/// Opt-in policy for snapping visual chunk boundaries to detected scene
/// cuts. A boundary is moved to a cut when one lies within
/// `tolerance_secs` of the fixed grid position; the number of chunks never
/// changes. Must be configured identically when indexing and when querying,
/// or offsets stop being comparable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneSnap {
    /// Scene-change score above which a cut is declared (0..1).
    pub threshold: f64,
    /// How far a boundary may be moved to reach a cut, in seconds.
    pub tolerance_secs: f64,
}

impl Default for SceneSnap {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SCENE_THRESHOLD,
            tolerance_secs: DEFAULT_SNAP_TOLERANCE_SECS,
        }
    }
}

/// Options controlling fingerprint extraction.
///
/// The window and chunk lengths must be uniform across everything that is
/// ever compared: every video in a store, and every query against it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractorCfg {
    /// Length of one audio window, in seconds.
    pub window_secs: f64,
    /// Length of one visual chunk, in seconds.
    pub chunk_secs: f64,
    /// Rate the audio track is resampled to before analysis.
    pub sample_rate: u32,
    /// Wall-clock deadline for decoding a single video.
    pub decode_timeout_secs: u64,
    /// Snap visual chunk boundaries to scene cuts. `None` (the default)
    /// keeps the fixed grid.
    pub scene_snap: Option<SceneSnap>,
}

impl Default for ExtractorCfg {
    fn default() -> Self {
        Self {
            window_secs: DEFAULT_WINDOW_SECS,
            chunk_secs: DEFAULT_CHUNK_SECS,
            sample_rate: DEFAULT_SAMPLE_RATE,
            decode_timeout_secs: DEFAULT_DECODE_TIMEOUT_SECS,
            scene_snap: None,
        }
    }
}

/// A cooperative cancellation flag, checked at window/chunk boundaries so
/// that a hung extraction can be abandoned cheaply.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Relaxed)
    }
}

/// Turns decoded media into fingerprint sequences.
pub struct Extractor<M> {
    media: M,
    cfg: ExtractorCfg,
}

impl<M: MediaAccess> Extractor<M> {
    pub fn new(media: M) -> Self {
        Self::with_cfg(media, ExtractorCfg::default())
    }

    pub fn with_cfg(media: M, cfg: ExtractorCfg) -> Self {
        Self { media, cfg }
    }

    pub fn cfg(&self) -> &ExtractorCfg {
        &self.cfg
    }

    pub fn media(&self) -> &M {
        &self.media
    }

    /// The audio fingerprint of the video at `src_path`: one descriptor per
    /// window, `floor(duration / window_secs)` windows.
    ///
    /// A missing audio track is not an error; it yields an all-silent
    /// sequence of the correct length.
    pub fn extract_audio(
        &self,
        src_path: &Path,
        cancel: &CancelToken,
    ) -> Result<AudioFingerprint, ExtractError> {
        let info = self
            .media
            .probe(src_path)
            .map_err(|e| ExtractError::corrupt(src_path, e))?;

        let window_secs = self.cfg.window_secs;
        let num_windows = (info.duration_secs() / window_secs).floor() as usize;
        if num_windows == 0 {
            return Ok(AudioFingerprint::new(vec![], window_secs));
        }

        if info.sample_rate().is_none() {
            return Ok(AudioFingerprint::all_silent(num_windows, window_secs));
        }

        let samples = self
            .media
            .read_audio_mono(src_path, self.cfg.sample_rate, self.cfg.decode_timeout_secs)
            .map_err(|e| ExtractError::corrupt(src_path, e))?;

        let samples_per_window = ((window_secs * self.cfg.sample_rate as f64).round() as usize).max(1);
        let plan = SpectralPlan::new();

        let mut windows = Vec::with_capacity(num_windows);
        for window_no in 0..num_windows {
            if cancel.is_cancelled() {
                return Err(ExtractError::Cancelled(src_path.to_path_buf()));
            }

            let start = window_no * samples_per_window;
            if start >= samples.len() {
                // the decode came up short of the declared duration
                windows.push(AudioWindow::silent());
                continue;
            }
            let end = (start + samples_per_window).min(samples.len());
            windows.push(plan.window_descriptor(&samples[start..end]));
        }

        Ok(AudioFingerprint::new(windows, window_secs))
    }

    /// The visual fingerprint of the video at `src_path`: one hash per chunk,
    /// `floor(duration / chunk_secs)` chunks when the decode runs to
    /// completion. A trailing partial chunk is dropped, not padded, so that
    /// index-time and query-time offsets stay comparable.
    pub fn extract_visual(
        &self,
        src_path: &Path,
        cancel: &CancelToken,
    ) -> Result<VisualFingerprint, ExtractError> {
        let info = self
            .media
            .probe(src_path)
            .map_err(|e| ExtractError::corrupt(src_path, e))?;

        let chunk_secs = self.cfg.chunk_secs;
        let num_chunks = (info.duration_secs() / chunk_secs).floor() as usize;
        if num_chunks == 0 {
            return Ok(VisualFingerprint::new(vec![], chunk_secs));
        }

        let fps = info.fps();
        if fps <= 0.0 {
            return Err(ExtractError::corrupt(
                src_path,
                crate::media::MediaError::Decode("media reports zero frame rate".to_string()),
            ));
        }

        let scenes = match self.cfg.scene_snap {
            Some(snap) => Some(
                self.media
                    .detect_scenes(src_path, snap.threshold)
                    .map_err(|e| ExtractError::corrupt(src_path, e))?,
            ),
            None => None,
        };

        let chunk_ends = chunk_end_frames(
            num_chunks,
            chunk_secs,
            fps,
            scenes.as_deref(),
            self.cfg.scene_snap.map(|snap| snap.tolerance_secs),
        );

        let frames = self
            .media
            .read_gray_frames(
                src_path,
                DECODE_IMAGE_X,
                DECODE_IMAGE_Y,
                self.cfg.decode_timeout_secs,
            )
            .map_err(|e| ExtractError::corrupt(src_path, e))?;

        let mut chunks = Vec::with_capacity(num_chunks);
        let mut frame_hashes = vec![];
        let mut next_end = 0;

        for (frame_no, frame) in frames.enumerate() {
            frame_hashes.push(hash_frame(&frame));

            if frame_no as u64 + 1 == chunk_ends[next_end] {
                if cancel.is_cancelled() {
                    return Err(ExtractError::Cancelled(src_path.to_path_buf()));
                }

                chunks.push(chunk_hash(&frame_hashes));
                frame_hashes.clear();

                next_end += 1;
                if next_end == chunk_ends.len() {
                    break;
                }
            }
        }

        if chunks.is_empty() {
            return Err(ExtractError::corrupt(
                src_path,
                crate::media::MediaError::Decode("decoded no complete chunk".to_string()),
            ));
        }

        Ok(VisualFingerprint::new(chunks, chunk_secs))
    }

    /// Both fingerprints of a video.
    pub fn extract_both(
        &self,
        src_path: &Path,
        cancel: &CancelToken,
    ) -> Result<(AudioFingerprint, VisualFingerprint), ExtractError> {
        let audio = self.extract_audio(src_path, cancel)?;
        let visual = self.extract_visual(src_path, cancel)?;
        Ok((audio, visual))
    }
}

// The frame number (exclusive) at which each chunk ends. Starts from the
// fixed grid; when scene snapping is enabled, a boundary within tolerance of
// a cut is moved onto it. The chunk count is unchanged by construction, and
// boundaries stay strictly increasing.
fn chunk_end_frames(
    num_chunks: usize,
    chunk_secs: f64,
    fps: f64,
    scenes: Option<&[SceneBoundary]>,
    tolerance_secs: Option<f64>,
) -> Vec<u64> {
    let mut ends: Vec<u64> = (1..=num_chunks)
        .map(|k| (k as f64 * chunk_secs * fps).round() as u64)
        .collect();

    if let (Some(scenes), Some(tolerance_secs)) = (scenes, tolerance_secs) {
        // a cut is where one scene ends and the next begins
        let cut_frames: Vec<u64> = scenes.iter().skip(1).map(|s| s.start_frame).collect();
        let tolerance_frames = (tolerance_secs * fps).round() as u64;

        for end in ends.iter_mut() {
            let nearest = cut_frames
                .iter()
                .copied()
                .min_by_key(|cut| cut.abs_diff(*end));
            if let Some(cut) = nearest {
                if cut.abs_diff(*end) <= tolerance_frames && cut > 0 {
                    *end = cut;
                }
            }
        }
    }

    // boundaries must stay strictly increasing (and nonzero) whatever
    // snapping or rounding did to them
    let mut prev = 0;
    for end in ends.iter_mut() {
        if *end <= prev {
            *end = prev + 1;
        }
        prev = *end;
    }

    ends
}
