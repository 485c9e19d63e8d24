use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Various causes of failure for ffmpeg/ffprobe operations.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum FfmpegError {
    /// Ffmpeg/ffprobe command was not found. Make sure ffmpeg is installed and
    /// can be found on the command line.
    #[error("ffmpeg/ffprobe not found. Make sure ffmpeg and ffprobe are installed and visible on the command line")]
    FfmpegNotFound,

    /// Io error occurred while executing an ffmpeg/ffprobe command.
    #[error("ffmpeg IO error: {0}")]
    Io(String),

    /// Ffmpeg/ffprobe returned a nonzero exit code. Because ffmpeg sometimes
    /// prints long error strings to stderr, the resulting string contains only
    /// the first few hundred characters of the error message.
    #[error("internal ffmpeg failure: {0}")]
    FfmpegInternal(String),

    /// The decode of a media file produced no usable output (e.g. zero frames
    /// from a file that ffprobe reported as video).
    #[error("ffmpeg decoded no data from the media file")]
    NoDecodedData,

    /// Ffmpeg/ffprobe ran longer than the configured deadline and was killed.
    #[error("ffmpeg/ffprobe exceeded its deadline and was killed")]
    Timeout,

    /// Ffprobe produced output that was not valid UTF-8.
    #[error("ffprobe output was not valid UTF-8")]
    Utf8Conversion,

    /// Failed to obtain media information.
    #[error("failed to get media properties: {0}")]
    Probe(#[from] ProbeError),
}

/// Failures when interpreting the JSON document printed by ffprobe.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum ProbeError {
    #[error("error parsing probe output: {0}")]
    Json(String),

    #[error("error parsing probe output: {0}")]
    ParseInt(String),

    #[error("error parsing probe output: {0}")]
    ParseFloat(String),

    /// The probed file contains no video stream. This also occurs when
    /// probing files that are not media at all.
    #[error("no video stream in media file")]
    NoVideoStream,
}

impl From<serde_json::Error> for ProbeError {
    fn from(e: serde_json::Error) -> Self {
        // limit maximum number of characters
        let error_string = format!("{e}").chars().take(500).collect::<String>();
        ProbeError::Json(error_string)
    }
}

impl From<std::num::ParseIntError> for ProbeError {
    fn from(e: std::num::ParseIntError) -> Self {
        ProbeError::ParseInt(format!("{e}"))
    }
}

impl From<std::num::ParseFloatError> for ProbeError {
    fn from(e: std::num::ParseFloatError) -> Self {
        ProbeError::ParseFloat(format!("{e}"))
    }
}
