use std::{
    ffi::{OsStr, OsString},
    io::Read,
    path::Path,
    process::{Command, Stdio},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use wait_timeout::ChildExt;

use crate::{spawn_error, suppress_console_window, FfmpegError};

const SCENE_DETECT_TIMEOUT: Duration = Duration::from_secs(600);

/// A detected scene, as a half-open `[start, end)` interval in both seconds
/// and frame numbers.
#[derive(PartialEq, Clone, Debug, Serialize, Deserialize)]
pub struct SceneBoundary {
    pub start_secs: f64,
    pub start_frame: u64,
    pub end_secs: f64,
    pub end_frame: u64,
}

/// Detect scene boundaries in a video using ffmpeg's `select` filter.
///
/// `threshold` is the scene-change score in `0..1` above which a cut is
/// declared (0.4 is a reasonable default). The scenes returned tile the whole
/// video: the first starts at zero and the last ends at `duration_secs`.
pub fn detect_scenes(
    src_path: &Path,
    threshold: f64,
    duration_secs: f64,
    fps: f64,
) -> Result<Vec<SceneBoundary>, FfmpegError> {
    let filter = OsString::from(format!("select='gt(scene,{threshold})',showinfo"));

    #[rustfmt::skip]
    let args = &[
        OsStr::new("-nostdin"),
        OsStr::new("-hide_banner"),
        OsStr::new("-nostats"),
        OsStr::new("-i"),  src_path.as_os_str(),
        OsStr::new("-vf"), filter.as_os_str(),
        OsStr::new("-f"),  OsStr::new("null"),
        OsStr::new("-"),
    ];

    let mut command = Command::new("ffmpeg");
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    suppress_console_window(&mut command);

    let mut child = command.spawn().map_err(spawn_error)?;

    // showinfo logs to stderr, one line per selected (i.e. cut) frame.
    let mut stderr_acc = vec![];
    if let Some(mut stderr) = child.stderr.take() {
        let _ = stderr.read_to_end(&mut stderr_acc);
    }

    match child
        .wait_timeout(SCENE_DETECT_TIMEOUT)
        .map_err(|e| FfmpegError::Io(format!("{e}")))?
    {
        Some(status) if status.success() => {}
        Some(status) => {
            return Err(FfmpegError::FfmpegInternal(format!(
                "scene detection exited with {status}"
            )))
        }
        None => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(FfmpegError::Timeout);
        }
    }

    let stderr_text = String::from_utf8_lossy(&stderr_acc);
    let cuts = parse_cut_times(&stderr_text);
    Ok(boundaries_from_cuts(&cuts, duration_secs, fps))
}

// Pull the pts_time field out of each showinfo line. Lines look like:
//   [Parsed_showinfo_1 @ 0x...] n:   0 pts:  12345 pts_time:5.1383  ...
fn parse_cut_times(stderr_text: &str) -> Vec<f64> {
    let mut cuts = vec![];
    for line in stderr_text.lines() {
        if !line.contains("Parsed_showinfo") {
            continue;
        }
        let Some(idx) = line.find("pts_time:") else {
            continue;
        };
        let rest = &line[idx + "pts_time:".len()..];
        let token: String = rest
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
            .collect();
        if let Ok(t) = token.parse::<f64>() {
            cuts.push(t);
        }
    }
    cuts.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    cuts.dedup();
    cuts
}

fn boundaries_from_cuts(cuts: &[f64], duration_secs: f64, fps: f64) -> Vec<SceneBoundary> {
    let frame_of = |secs: f64| (secs * fps).round() as u64;

    let mut starts = vec![0.0];
    starts.extend(cuts.iter().copied().filter(|t| *t > 0.0 && *t < duration_secs));

    starts
        .windows(2)
        .map(|pair| (pair[0], pair[1]))
        .chain(starts.last().map(|last| (*last, duration_secs)))
        .map(|(start_secs, end_secs)| SceneBoundary {
            start_secs,
            start_frame: frame_of(start_secs),
            end_secs,
            end_frame: frame_of(end_secs),
        })
        .collect()
}
