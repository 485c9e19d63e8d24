use std::{
    ffi::OsStr,
    io::Read,
    path::Path,
    process::{Command, Stdio},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use wait_timeout::ChildExt;

use crate::{spawn_error, suppress_console_window, truncate_stderr, FfmpegError, ProbeError};

const FFPROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// The media metadata needed for fingerprinting, obtained with ffprobe.
///
/// If the file contains multiple video streams, only the first is described.
#[derive(PartialEq, Clone, Debug, Serialize, Deserialize, Default)]
pub struct MediaInfo {
    duration_secs: f64,
    fps: f64,
    sample_rate: Option<u32>,
    frame_count: u64,
}

impl MediaInfo {
    /// Probe the media file at `src_path`.
    ///
    /// # Errors
    /// * The file cannot be read, or ffprobe does not recognize it as media
    ///   containing a video stream.
    /// * The output from ffprobe could not be parsed as JSON, or did not
    ///   contain the expected fields.
    pub fn new<P>(src_path: P) -> Result<Self, FfmpegError>
    where
        P: AsRef<Path>,
    {
        let stats_string = ffprobe_json(src_path.as_ref())?;
        Self::from_probe_json(&stats_string).map_err(FfmpegError::from)
    }

    /// Assemble a `MediaInfo` without probing. Intended for [`MediaInfo`]
    /// producers other than ffprobe (alternative decode backends, synthetic
    /// media in tests).
    pub fn from_parts(duration_secs: f64, fps: f64, sample_rate: Option<u32>, frame_count: u64) -> Self {
        Self {
            duration_secs,
            fps,
            sample_rate,
            frame_count,
        }
    }

    /// The duration of the container, in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    /// The frame rate of the first video stream.
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// The sample rate of the first audio stream. `None` if the file has no
    /// audio track.
    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    /// The number of frames in the first video stream. Derived from duration
    /// and frame rate when the container does not declare it.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn from_probe_json(stats_string: &str) -> Result<Self, ProbeError> {
        let stats_parsed: Value = serde_json::from_str(stats_string).map_err(ProbeError::from)?;

        let duration_secs = if let Value::String(d) = &stats_parsed["format"]["duration"] {
            d.parse::<f64>().map_err(ProbeError::from)?
        } else {
            0.0
        };

        let video_stream = first_stream_of_type(&stats_parsed, "video").ok_or(ProbeError::NoVideoStream)?;

        let fps = if let Value::String(rate) = &video_stream["r_frame_rate"] {
            parse_frame_rate(rate)?
        } else {
            0.0
        };

        let frame_count = if let Value::String(n) = &video_stream["nb_frames"] {
            n.parse::<u64>().map_err(ProbeError::from)?
        } else {
            (duration_secs * fps) as u64
        };

        let audio_stream = first_stream_of_type(&stats_parsed, "audio");
        let sample_rate = match audio_stream {
            Some(stream) => {
                if let Value::String(sr) = &stream["sample_rate"] {
                    Some(sr.parse::<u32>().map_err(ProbeError::from)?)
                } else {
                    None
                }
            }
            None => None,
        };

        Ok(Self {
            duration_secs,
            fps,
            sample_rate,
            frame_count,
        })
    }
}

fn first_stream_of_type<'a>(stats: &'a Value, codec_type: &str) -> Option<&'a Value> {
    stats["streams"]
        .as_array()?
        .iter()
        .find(|stream| stream["codec_type"] == Value::String(codec_type.to_string()))
}

// ffprobe reports frame rates as a ratio, e.g. "30000/1001".
fn parse_frame_rate(rate: &str) -> Result<f64, ProbeError> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num = num.parse::<f64>().map_err(ProbeError::from)?;
            let den = den.parse::<f64>().map_err(ProbeError::from)?;
            if den == 0.0 {
                Ok(0.0)
            } else {
                Ok(num / den)
            }
        }
        None => rate.parse::<f64>().map_err(ProbeError::from),
    }
}

fn ffprobe_json(src_path: &Path) -> Result<String, FfmpegError> {
    let args = &[
        OsStr::new("-v"),
        OsStr::new("quiet"),
        OsStr::new("-show_format"),
        OsStr::new("-show_streams"),
        OsStr::new("-print_format"),
        OsStr::new("json"),
        src_path.as_os_str(),
    ];

    let mut command = Command::new("ffprobe");
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    suppress_console_window(&mut command);

    let mut child = command.spawn().map_err(spawn_error)?;

    let mut stdout_acc = vec![];
    if let Some(mut stdout) = child.stdout.take() {
        let _ = stdout.read_to_end(&mut stdout_acc);
    }

    match child.wait_timeout(FFPROBE_TIMEOUT).map_err(|e| FfmpegError::Io(format!("{e}")))? {
        Some(status) if status.success() => {}
        Some(_) => return Err(FfmpegError::FfmpegInternal(truncate_stderr(&stdout_acc))),
        None => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(FfmpegError::Timeout);
        }
    }

    String::from_utf8(stdout_acc).map_err(|_| FfmpegError::Utf8Conversion)
}
