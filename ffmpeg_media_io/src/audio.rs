use std::{
    ffi::{OsStr, OsString},
    io::Read,
    path::Path,
    process::{Command, Stdio},
    time::{Duration, SystemTime},
};

use wait_timeout::ChildExt;

use crate::{spawn_error, suppress_console_window, FfmpegError};

/// Decode the audio track of `src_path` to mono f32 samples at `sample_rate`.
///
/// Channels are downmixed by ffmpeg. The decode is abandoned (and the child
/// process killed) if it runs past `timeout_secs`.
///
/// # Errors
/// * The file has no audio track, or cannot be decoded.
/// * The deadline passed before decoding completed.
pub fn read_audio_mono(
    src_path: &Path,
    sample_rate: u32,
    timeout_secs: u64,
) -> Result<Vec<f32>, FfmpegError> {
    let sample_rate_string = OsString::from(sample_rate.to_string());

    #[rustfmt::skip]
    let args = &[
        OsStr::new("-nostdin"),
        OsStr::new("-hide_banner"),
        OsStr::new("-loglevel"), OsStr::new("warning"),
        OsStr::new("-nostats"),
        OsStr::new("-i"),        src_path.as_os_str(),
        OsStr::new("-vn"),
        OsStr::new("-ac"),       OsStr::new("1"),
        OsStr::new("-ar"),       sample_rate_string.as_os_str(),
        OsStr::new("-f"),        OsStr::new("f32le"),
        OsStr::new("-c:a"),      OsStr::new("pcm_f32le"),
        OsStr::new("-"),
    ];

    let mut command = Command::new("ffmpeg");
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    suppress_console_window(&mut command);

    let mut child = command.spawn().map_err(spawn_error)?;

    let deadline = SystemTime::now() + Duration::from_secs(timeout_secs);
    let mut raw = vec![];
    let mut read_buf = [0u8; 65536];
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| FfmpegError::Io("failed to obtain stdout".to_string()))?;

    loop {
        if SystemTime::now() > deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(FfmpegError::Timeout);
        }

        match stdout.read(&mut read_buf) {
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(FfmpegError::Io(format!("{e}")));
            }
            Ok(0) => break,
            Ok(amount) => raw.extend_from_slice(&read_buf[..amount]),
        }
    }

    match child
        .wait_timeout(Duration::from_secs(5))
        .map_err(|e| FfmpegError::Io(format!("{e}")))?
    {
        Some(status) if status.success() => {}
        Some(status) => {
            return Err(FfmpegError::FfmpegInternal(format!(
                "audio decode exited with {status}"
            )))
        }
        None => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(FfmpegError::Timeout);
        }
    }

    if raw.is_empty() {
        return Err(FfmpegError::NoDecodedData);
    }

    Ok(samples_from_le_bytes(&raw))
}

fn samples_from_le_bytes(raw: &[u8]) -> Vec<f32> {
    raw.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_le_byte_conversion() {
        let samples = [0.0f32, 1.0, -0.5];
        let mut raw = vec![];
        for s in samples {
            raw.extend_from_slice(&s.to_le_bytes());
        }
        assert_eq!(samples_from_le_bytes(&raw), samples);
    }

    #[test]
    fn test_trailing_partial_sample_is_dropped() {
        let mut raw = 1.0f32.to_le_bytes().to_vec();
        raw.push(0xff);
        assert_eq!(samples_from_le_bytes(&raw), vec![1.0]);
    }
}
