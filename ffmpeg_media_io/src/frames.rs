use std::{
    ffi::{OsStr, OsString},
    io::Read,
    path::PathBuf,
    process::{Child, Command, Stdio},
    time::{Duration, SystemTime},
};

use image::GrayImage;

use crate::{spawn_error, suppress_console_window, FfmpegError};

/// Configuration for reading the frames of a video with ffmpeg.
///
/// Frames are decoded to grayscale at the requested resolution (ffmpeg
/// performs the scaling, so no full-size frame is ever held in memory).
#[derive(Debug, Clone)]
pub struct FrameReaderBuilder {
    src_path: PathBuf,
    width: u32,
    height: u32,
    fps: Option<f64>,
    num_frames: Option<u64>,
    timeout_secs: u64,
}

impl FrameReaderBuilder {
    pub fn new(src_path: PathBuf, width: u32, height: u32) -> Self {
        Self {
            src_path,
            width,
            height,
            fps: None,
            num_frames: None,
            timeout_secs: u32::MAX as u64,
        }
    }

    /// Resample the video to the given frame rate while decoding.
    pub fn fps(mut self, fps: f64) -> Self {
        self.fps = Some(fps);
        self
    }

    /// Stop after decoding this many frames.
    pub fn num_frames(mut self, num_frames: u64) -> Self {
        self.num_frames = Some(num_frames);
        self
    }

    /// Wall-clock deadline for the whole decode. When exceeded, the iterator
    /// ends and the ffmpeg child process is killed.
    pub fn timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Spawn ffmpeg and return an iterator over the decoded frames.
    pub fn spawn(self) -> Result<FrameIter, FfmpegError> {
        let fps_string;
        let mut args: Vec<&OsStr> = vec![
            OsStr::new("-nostdin"),
            OsStr::new("-hide_banner"),
            OsStr::new("-loglevel"),
            OsStr::new("warning"),
            OsStr::new("-nostats"),
            OsStr::new("-i"),
            self.src_path.as_os_str(),
        ];

        if let Some(fps) = self.fps {
            fps_string = OsString::from(format!("fps={fps}"));
            args.extend([OsStr::new("-vf"), fps_string.as_os_str()]);
        }

        let num_frames_string;
        if let Some(num_frames) = self.num_frames {
            num_frames_string = OsString::from(num_frames.to_string());
            args.extend([OsStr::new("-vframes"), num_frames_string.as_os_str()]);
        }

        let size_string = OsString::from(format!("{}x{}", self.width, self.height));
        args.extend([
            OsStr::new("-s"),
            size_string.as_os_str(),
            OsStr::new("-pix_fmt"),
            OsStr::new("gray"),
            OsStr::new("-c:v"),
            OsStr::new("rawvideo"),
            OsStr::new("-f"),
            OsStr::new("rawvideo"),
            OsStr::new("-"),
        ]);

        let mut command = Command::new("ffmpeg");
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        suppress_console_window(&mut command);

        let mut child = command.spawn().map_err(spawn_error)?;

        // Prevent a possible lockup if stderr gets full by dropping the
        // handle from our side.
        std::mem::drop(child.stderr.take());

        Ok(FrameIter {
            width: self.width,
            height: self.height,
            child,
            frames_read: 0,
            timeout_time: SystemTime::now() + Duration::from_secs(self.timeout_secs),
            finished: false,
        })
    }
}

/// An iterator over the grayscale frames of a video.
///
/// Ends when the video is exhausted, a decode error occurs, or the configured
/// deadline passes. The underlying ffmpeg process is killed when the iterator
/// finishes or is dropped.
#[derive(Debug)]
pub struct FrameIter {
    width: u32,
    height: u32,
    child: Child,
    frames_read: u64,
    timeout_time: SystemTime,
    finished: bool,
}

impl FrameIter {
    /// The number of frames produced so far.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    fn finish(&mut self) {
        self.finished = true;
        let _kill_error = self.child.kill();
        let _wait_error = self.child.wait();
    }
}

impl Iterator for FrameIter {
    type Item = GrayImage;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || SystemTime::now() > self.timeout_time {
            self.finish();
            return None;
        }

        let raw_buf_size = usize::try_from(self.width)
            .ok()?
            .checked_mul(usize::try_from(self.height).ok()?)?;
        let mut raw_buf = vec![0u8; raw_buf_size];

        // Read one whole frame, aborting if the deadline passes mid-frame.
        let stdout = self.child.stdout.as_mut()?;
        let mut buf_head = 0;
        while buf_head < raw_buf.len() {
            if SystemTime::now() > self.timeout_time {
                self.finish();
                return None;
            }

            match stdout.read(&mut raw_buf[buf_head..]) {
                // something went wrong, or no more data can be read
                Err(_) | Ok(0) => {
                    self.finish();
                    return None;
                }
                Ok(bytes_read) => buf_head += bytes_read,
            }
        }

        self.frames_read += 1;
        GrayImage::from_raw(self.width, self.height, raw_buf)
    }
}

// to prevent accumulation of zombie processes, reap the return code of the
// ffmpeg child (if nothing else has done so already) here
impl Drop for FrameIter {
    fn drop(&mut self) {
        let _kill_error = self.child.kill();
        let _wait_error = self.child.wait();
    }
}
