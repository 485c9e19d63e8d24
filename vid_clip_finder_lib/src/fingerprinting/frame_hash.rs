use image::GrayImage;

use crate::definitions::*;
use crate::utils::dct_ops;

/// Perceptual hash of one grayscale frame: keep the low-frequency
/// [`HASH_IMAGE_X`]x[`HASH_IMAGE_Y`] corner of the frame's DCT, drop the DC
/// term, and set a bit for every coefficient above the corner's mean.
pub fn hash_frame(frame: &GrayImage) -> u64 {
    let dct = dct_ops::perform_dct_2d(frame);
    let rowstride = DECODE_IMAGE_X as usize;

    let mut bins = [0f64; FRAME_HASH_BITS];
    for y in 0..HASH_IMAGE_Y {
        for x in 0..HASH_IMAGE_X {
            bins[y * HASH_IMAGE_X + x] = dct[y * rowstride + x];
        }
    }

    // The DC coefficient is just overall brightness. Without this, the hash
    // degenerates for dark or bright frames.
    bins[0] = 0.0;

    let average = bins.iter().sum::<f64>() / bins.len() as f64;
    bittify(&bins, |coeff| coeff > average)
}

/// Combine the per-frame hashes of one chunk into a single hash: average the
/// activation of each bit across the frames and threshold at 0.5.
pub fn chunk_hash(frame_hashes: &[u64]) -> u64 {
    assert!(!frame_hashes.is_empty());

    let num_frames = frame_hashes.len() as u64;
    let mut combined = 0u64;
    for bit in 0..FRAME_HASH_BITS {
        let activations = frame_hashes.iter().filter(|hash| (**hash >> bit) & 1 == 1).count() as u64;
        if activations * 2 >= num_frames {
            combined |= 1 << bit;
        }
    }
    combined
}

//Utility helper: reduce a sequence of values to bits via a predicate.
fn bittify<F>(values: &[f64], predicate: F) -> u64
where
    F: Fn(f64) -> bool,
{
    let mut bitstring = 0u64;
    for (i, value) in values.iter().enumerate() {
        if predicate(*value) {
            bitstring |= 1 << i;
        }
    }
    bitstring
}

#[cfg(test)]
mod test {
    use super::*;
    use image::Luma;

    fn gradient_frame(step: usize) -> GrayImage {
        let mut frame = GrayImage::new(DECODE_IMAGE_X, DECODE_IMAGE_Y);
        for (x, y, px) in frame.enumerate_pixels_mut() {
            *px = Luma([(((x as usize * step) + y as usize) % 256) as u8]);
        }
        frame
    }

    #[test]
    fn test_identical_frames_hash_identically() {
        assert_eq!(hash_frame(&gradient_frame(3)), hash_frame(&gradient_frame(3)));
    }

    #[test]
    fn test_different_frames_hash_differently() {
        let a = hash_frame(&gradient_frame(3));
        let b = hash_frame(&gradient_frame(11));
        assert_ne!(a, b);
    }

    #[test]
    fn test_chunk_hash_of_identical_frames_is_the_frame_hash() {
        let hash = hash_frame(&gradient_frame(5));
        assert_eq!(chunk_hash(&[hash, hash, hash]), hash);
    }

    #[test]
    fn test_chunk_hash_majority_vote() {
        // bit 0 set in 2 of 4 hashes (exactly 0.5 -> set), bit 1 set in 1 of 4
        let hashes = [0b01, 0b01, 0b10, 0b00];
        assert_eq!(chunk_hash(&hashes), 0b01);
    }
}
