// Audio descriptor definitions
pub const DESCRIPTOR_DIM: usize = 13;
pub const SPECTRUM_SEGMENT_LEN: usize = 1024;
pub const SPECTRUM_SEGMENT_HOP: usize = 512;
pub const SILENCE_RMS_THRESHOLD: f32 = 1e-4;

// Frame hash definitions (frames are decoded at DECODE size, hashed down to
// HASH_IMAGE size by keeping the low-frequency corner of the DCT)
pub const DECODE_IMAGE_X: u32 = 32;
pub const DECODE_IMAGE_Y: u32 = 32;
pub const HASH_IMAGE_X: usize = 8;
pub const HASH_IMAGE_Y: usize = 8;
pub const FRAME_HASH_BITS: usize = HASH_IMAGE_X * HASH_IMAGE_Y;

// Windowing. The audio window length is derived from the target frame rate so
// that windows line up 1:1 with frames of a video at that rate.
pub const DEFAULT_TARGET_FPS: f64 = 10.0;
pub const DEFAULT_WINDOW_SECS: f64 = 1.0 / DEFAULT_TARGET_FPS;
pub const DEFAULT_CHUNK_SECS: f64 = 2.0;
pub const DEFAULT_SAMPLE_RATE: u32 = 22050;

pub const DEFAULT_DECODE_TIMEOUT_SECS: u64 = 300;

// Scene snapping defaults (opt-in policy, see ExtractorCfg::scene_snap)
pub const DEFAULT_SCENE_THRESHOLD: f64 = 0.4;
pub const DEFAULT_SNAP_TOLERANCE_SECS: f64 = 0.25;
