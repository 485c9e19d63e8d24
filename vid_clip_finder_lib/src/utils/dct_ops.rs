use image::GrayImage;
use rustdct::DctPlanner;
use transpose::transpose_inplace;

use crate::definitions::*;

/// 2-D type-II DCT of a square grayscale frame. Pixel values are centered
/// around zero before transforming.
pub fn perform_dct_2d(frame: &GrayImage) -> Vec<f64> {
    let (x, y) = frame.dimensions();
    assert!(
        x == DECODE_IMAGE_X && y == DECODE_IMAGE_Y,
        "actual: {x}x{y}, expected: {DECODE_IMAGE_X}x{DECODE_IMAGE_Y}"
    );

    let dimension = x as usize;
    let mut raw_bytes = frame
        .as_raw()
        .iter()
        .map(|px| *px as f64 - 128.0)
        .collect::<Vec<_>>();

    //setup the DCT.....
    let mut planner = DctPlanner::new();
    let dct = planner.plan_dct2(dimension);

    //perform round 1 of the DCT (on rows):
    raw_bytes.chunks_exact_mut(dimension).for_each(|row| {
        dct.process_dct2(row);
    });

    //now transpose...
    let mut scratch = vec![0f64; dimension];
    transpose_inplace(&mut raw_bytes, &mut scratch, dimension, dimension);

    //perform round 2 of the DCT (on cols):
    raw_bytes.chunks_exact_mut(dimension).for_each(|col| {
        dct.process_dct2(col);
    });

    //now transpose...
    transpose_inplace(&mut raw_bytes, &mut scratch, dimension, dimension);

    //and finally, normalize (has no effect on the hash, but keeps magnitudes
    //comparable if further processing is ever required.)
    for val in raw_bytes.iter_mut() {
        *val *= 4f64 / (HASH_IMAGE_X as f64 * HASH_IMAGE_Y as f64);
    }

    raw_bytes
}

#[cfg(test)]
mod test {
    use super::*;

    fn flat_frame(value: u8) -> GrayImage {
        GrayImage::from_pixel(DECODE_IMAGE_X, DECODE_IMAGE_Y, image::Luma([value]))
    }

    #[test]
    fn test_flat_frame_has_energy_only_in_dc() {
        let dct = perform_dct_2d(&flat_frame(200));

        assert!(dct[0].abs() > 1.0);
        for coeff in &dct[1..] {
            assert!(coeff.abs() < 1e-6);
        }
    }

    #[test]
    fn test_dct_is_deterministic() {
        let mut frame = flat_frame(0);
        for (i, px) in frame.iter_mut().enumerate() {
            *px = (i % 251) as u8;
        }

        let a = perform_dct_2d(&frame);
        let b = perform_dct_2d(&frame);
        assert_eq!(a, b);
    }
}
