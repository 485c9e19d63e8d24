//! A wrapper around the command line interfaces of ffmpeg and ffprobe.
//!
//! Provides the small set of media operations needed to fingerprint video
//! collections:
//! * [`MediaInfo`]: duration, frame rate, sample rate and frame count of a
//!   media file, obtained with ffprobe.
//! * [`FrameReaderBuilder`]: an iterator over the frames of a video, decoded
//!   to grayscale at a caller-chosen resolution.
//! * [`read_audio_mono`]: the audio track of a video, decoded to mono f32
//!   samples at a caller-chosen rate.
//! * [`detect_scenes`]: scene-cut boundaries from ffmpeg's `select` filter.
//!
//! # Prerequisites
//! Ffmpeg and ffprobe must be available on the command line. This requirement
//! exists because no well-maintained, memory-leak-free bindings to ffmpeg
//! exist, and because statically linking ffmpeg may introduce additional
//! transitive licensing requirements on end users.

mod audio;
mod error;
mod frames;
mod info;
mod scenes;

pub use audio::read_audio_mono;
pub use error::{FfmpegError, ProbeError};
pub use frames::{FrameIter, FrameReaderBuilder};
pub use info::MediaInfo;
pub use scenes::{detect_scenes, SceneBoundary};

use std::process::Command;

// ffmpeg writes enormous error strings to stderr. Keep only the start of them.
pub(crate) const MAX_STDERR_CHARS: usize = 500;

pub(crate) fn truncate_stderr(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .chars()
        .take(MAX_STDERR_CHARS)
        .collect()
}

// Classify the io error from a failed spawn: A NotFound here means the ffmpeg
// binary itself is missing, which gets its own variant so users get an
// actionable message.
pub(crate) fn spawn_error(e: std::io::Error) -> FfmpegError {
    if e.kind() == std::io::ErrorKind::NotFound {
        FfmpegError::FfmpegNotFound
    } else {
        FfmpegError::Io(format!("{e}"))
    }
}

#[cfg(target_family = "windows")]
pub(crate) fn suppress_console_window(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x08000000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(target_family = "windows"))]
pub(crate) fn suppress_console_window(_cmd: &mut Command) {}
