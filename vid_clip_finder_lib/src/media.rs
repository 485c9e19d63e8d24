use std::path::Path;

use ffmpeg_media_io::{FfmpegError, MediaInfo, SceneBoundary};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for the narrow media interface. Low-level decoder errors are
/// flattened into these variants so that callers never have to understand
/// backend-specific failures.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum MediaError {
    /// The file could not be decoded (missing, truncated, or not media).
    #[error("decode failure: {0}")]
    Decode(String),

    /// Decoding ran past its deadline and was abandoned.
    #[error("decode deadline exceeded")]
    Timeout,
}

impl From<FfmpegError> for MediaError {
    fn from(e: FfmpegError) -> Self {
        match e {
            FfmpegError::Timeout => MediaError::Timeout,
            other => MediaError::Decode(format!("{other}")),
        }
    }
}

/// The media operations the fingerprint extractor consumes.
///
/// Implementations decode somehow (command line ffmpeg, a library binding, or
/// the synthetic generator in [`test_util`][crate::test_util]); the extractor
/// only sees durations, frames and samples.
pub trait MediaAccess: Send + Sync {
    /// Duration, frame rate, sample rate and frame count of a media file.
    fn probe(&self, src_path: &Path) -> Result<MediaInfo, MediaError>;

    /// The audio track as mono f32 samples at `sample_rate`.
    fn read_audio_mono(
        &self,
        src_path: &Path,
        sample_rate: u32,
        timeout_secs: u64,
    ) -> Result<Vec<f32>, MediaError>;

    /// The video frames, decoded grayscale at `width`x`height`, in order.
    fn read_gray_frames(
        &self,
        src_path: &Path,
        width: u32,
        height: u32,
        timeout_secs: u64,
    ) -> Result<Box<dyn Iterator<Item = GrayImage> + Send>, MediaError>;

    /// Scene boundaries of the video. Only used as an alignment hint; an
    /// implementation that cannot detect scenes may return an empty list.
    fn detect_scenes(&self, src_path: &Path, threshold: f64) -> Result<Vec<SceneBoundary>, MediaError>;
}

/// [`MediaAccess`] backed by the ffmpeg/ffprobe command line tools.
#[derive(Clone, Copy, Debug, Default)]
pub struct FfmpegMedia;

impl MediaAccess for FfmpegMedia {
    fn probe(&self, src_path: &Path) -> Result<MediaInfo, MediaError> {
        MediaInfo::new(src_path).map_err(MediaError::from)
    }

    fn read_audio_mono(
        &self,
        src_path: &Path,
        sample_rate: u32,
        timeout_secs: u64,
    ) -> Result<Vec<f32>, MediaError> {
        ffmpeg_media_io::read_audio_mono(src_path, sample_rate, timeout_secs).map_err(MediaError::from)
    }

    fn read_gray_frames(
        &self,
        src_path: &Path,
        width: u32,
        height: u32,
        timeout_secs: u64,
    ) -> Result<Box<dyn Iterator<Item = GrayImage> + Send>, MediaError> {
        let frames = ffmpeg_media_io::FrameReaderBuilder::new(src_path.to_path_buf(), width, height)
            .timeout_secs(timeout_secs)
            .spawn()
            .map_err(MediaError::from)?;
        Ok(Box::new(frames))
    }

    fn detect_scenes(&self, src_path: &Path, threshold: f64) -> Result<Vec<SceneBoundary>, MediaError> {
        let info = self.probe(src_path)?;
        ffmpeg_media_io::detect_scenes(src_path, threshold, info.duration_secs(), info.fps())
            .map_err(MediaError::from)
    }
}
