//! Utilities for testing: seeded synthetic fingerprints, and an in-memory
//! [`MediaAccess`] implementation that generates deterministic media so
//! extraction and matching can be exercised end to end without ffmpeg or
//! real video files.

use std::{collections::HashMap, path::Path, path::PathBuf};

use image::GrayImage;
use rand::prelude::*;

use crate::fingerprinting::fingerprint::{AudioFingerprint, AudioWindow, VisualFingerprint};
use crate::media::{MediaAccess, MediaError};
use crate::{MediaInfo, SceneBoundary, DESCRIPTOR_DIM};

/// A random (non-silent) audio fingerprint of `num_windows` windows.
pub fn random_audio_fingerprint(rng: &mut StdRng, num_windows: usize, window_secs: f64) -> AudioFingerprint {
    let windows = (0..num_windows)
        .map(|_| {
            let mut coeffs = [0.0f32; DESCRIPTOR_DIM];
            for coeff in coeffs.iter_mut() {
                *coeff = rng.gen_range(-1.0..1.0);
            }
            AudioWindow { coeffs, silent: false }
        })
        .collect();
    AudioFingerprint::new(windows, window_secs)
}

/// A random visual fingerprint of `num_chunks` chunks.
pub fn random_visual_fingerprint(rng: &mut StdRng, num_chunks: usize, chunk_secs: f64) -> VisualFingerprint {
    let chunks = (0..num_chunks).map(|_| rng.gen::<u64>()).collect();
    VisualFingerprint::new(chunks, chunk_secs)
}

const FAKE_FPS: f64 = 10.0;
const FAKE_SAMPLE_RATE: u32 = 22050;

#[derive(Clone, Debug)]
struct FakeVideo {
    seed: u64,
    start_secs: f64,
    duration_secs: f64,
    has_audio: bool,
}

/// An in-memory media collection. Every registered video is a window into a
/// deterministic master signal derived from its seed, so a "clip" registered
/// with the same seed at an offset decodes to exactly the samples and frames
/// of its source video at that offset.
#[derive(Clone, Debug, Default)]
pub struct FakeMedia {
    videos: HashMap<PathBuf, FakeVideo>,
}

impl FakeMedia {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a video of `duration_secs` built from `seed`.
    pub fn add_video(&mut self, name: impl Into<PathBuf>, seed: u64, duration_secs: f64) {
        self.videos.insert(
            name.into(),
            FakeVideo {
                seed,
                start_secs: 0.0,
                duration_secs,
                has_audio: true,
            },
        );
    }

    /// Register a video with no audio track.
    pub fn add_video_without_audio(&mut self, name: impl Into<PathBuf>, seed: u64, duration_secs: f64) {
        self.videos.insert(
            name.into(),
            FakeVideo {
                seed,
                start_secs: 0.0,
                duration_secs,
                has_audio: false,
            },
        );
    }

    /// Register a clip: the portion of seed `seed`'s master signal starting
    /// at `start_secs` and lasting `duration_secs`.
    pub fn add_clip_of(
        &mut self,
        name: impl Into<PathBuf>,
        seed: u64,
        start_secs: f64,
        duration_secs: f64,
    ) {
        self.videos.insert(
            name.into(),
            FakeVideo {
                seed,
                start_secs,
                duration_secs,
                has_audio: true,
            },
        );
    }

    /// Remove a registered video, mirroring deletion from a directory.
    pub fn remove_video(&mut self, name: impl AsRef<Path>) {
        self.videos.remove(name.as_ref());
    }

    /// Re-register an existing video under a new path.
    pub fn rename_video(&mut self, from: impl AsRef<Path>, to: impl Into<PathBuf>) {
        if let Some(video) = self.videos.remove(from.as_ref()) {
            self.videos.insert(to.into(), video);
        }
    }

    fn get(&self, src_path: &Path) -> Result<&FakeVideo, MediaError> {
        self.videos
            .get(src_path)
            .ok_or_else(|| MediaError::Decode(format!("no fake video at {}", src_path.display())))
    }
}

impl MediaAccess for FakeMedia {
    fn probe(&self, src_path: &Path) -> Result<MediaInfo, MediaError> {
        let video = self.get(src_path)?;
        Ok(MediaInfo::from_parts(
            video.duration_secs,
            FAKE_FPS,
            video.has_audio.then_some(FAKE_SAMPLE_RATE),
            (video.duration_secs * FAKE_FPS).round() as u64,
        ))
    }

    fn read_audio_mono(
        &self,
        src_path: &Path,
        sample_rate: u32,
        _timeout_secs: u64,
    ) -> Result<Vec<f32>, MediaError> {
        let video = self.get(src_path)?;
        if !video.has_audio {
            return Err(MediaError::Decode("no audio track".to_string()));
        }

        let start_sample = (video.start_secs * sample_rate as f64).round() as u64;
        let num_samples = (video.duration_secs * sample_rate as f64).round() as u64;

        Ok((start_sample..start_sample + num_samples)
            .map(|global| sample_value(video.seed, global))
            .collect())
    }

    fn read_gray_frames(
        &self,
        src_path: &Path,
        width: u32,
        height: u32,
        _timeout_secs: u64,
    ) -> Result<Box<dyn Iterator<Item = GrayImage> + Send>, MediaError> {
        let video = self.get(src_path)?;

        let start_frame = (video.start_secs * FAKE_FPS).round() as u64;
        let num_frames = (video.duration_secs * FAKE_FPS).round() as u64;
        let seed = video.seed;

        Ok(Box::new((start_frame..start_frame + num_frames).map(
            move |global_frame| {
                GrayImage::from_fn(width, height, |x, y| {
                    let pixel_index = (y * width + x) as u64;
                    image::Luma([pixel_value(seed, global_frame, pixel_index)])
                })
            },
        )))
    }

    fn detect_scenes(&self, src_path: &Path, _threshold: f64) -> Result<Vec<SceneBoundary>, MediaError> {
        let video = self.get(src_path)?;
        // synthetic noise has no scene structure; one scene spans the video
        Ok(vec![SceneBoundary {
            start_secs: 0.0,
            start_frame: 0,
            end_secs: video.duration_secs,
            end_frame: (video.duration_secs * FAKE_FPS).round() as u64,
        }])
    }
}

fn sample_value(seed: u64, global_sample: u64) -> f32 {
    let bits = splitmix64(seed ^ global_sample.wrapping_mul(0x9E37_79B9_7F4A_7C15));
    ((bits >> 11) as f64 / (1u64 << 53) as f64 - 0.5) as f32
}

fn pixel_value(seed: u64, global_frame: u64, pixel_index: u64) -> u8 {
    let key = seed
        ^ global_frame.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ pixel_index.wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    (splitmix64(key) >> 56) as u8
}

fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_clip_decodes_to_the_source_signal_at_its_offset() {
        let mut media = FakeMedia::new();
        media.add_video("full.mp4", 42, 90.0);
        media.add_clip_of("clip.mp4", 42, 40.0, 5.0);

        let full = media
            .read_audio_mono(Path::new("full.mp4"), FAKE_SAMPLE_RATE, 0)
            .unwrap();
        let clip = media
            .read_audio_mono(Path::new("clip.mp4"), FAKE_SAMPLE_RATE, 0)
            .unwrap();

        let start = 40 * FAKE_SAMPLE_RATE as usize;
        assert_eq!(&full[start..start + clip.len()], &clip[..]);
    }

    #[test]
    fn test_different_seeds_decode_differently() {
        let mut media = FakeMedia::new();
        media.add_video("a.mp4", 1, 10.0);
        media.add_video("b.mp4", 2, 10.0);

        let a = media.read_audio_mono(Path::new("a.mp4"), FAKE_SAMPLE_RATE, 0).unwrap();
        let b = media.read_audio_mono(Path::new("b.mp4"), FAKE_SAMPLE_RATE, 0).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_probe_reports_registered_duration() {
        let mut media = FakeMedia::new();
        media.add_video("a.mp4", 1, 60.0);

        let info = media.probe(Path::new("a.mp4")).unwrap();
        assert_eq!(info.duration_secs(), 60.0);
        assert_eq!(info.fps(), FAKE_FPS);
        assert_eq!(info.sample_rate(), Some(FAKE_SAMPLE_RATE));
    }

    #[test]
    fn test_unknown_path_is_a_decode_error() {
        let media = FakeMedia::new();
        assert!(media.probe(Path::new("missing.mp4")).is_err());
    }
}
