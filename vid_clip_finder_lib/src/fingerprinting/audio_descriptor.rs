use std::sync::Arc;

use rustdct::{DctPlanner, TransformType2And3};

use crate::definitions::*;

use super::fingerprint::AudioWindow;

/// Precomputed transforms and tables for turning raw samples into spectral
/// descriptors. Built once per extraction, shared across windows.
pub struct SpectralPlan {
    segment_dct: Arc<dyn TransformType2And3<f32>>,
    band_dct: Arc<dyn TransformType2And3<f32>>,
    hann: Vec<f32>,
    band_edges: [usize; DESCRIPTOR_DIM + 1],
}

impl SpectralPlan {
    pub fn new() -> Self {
        let mut planner = DctPlanner::new();
        let segment_dct = planner.plan_dct2(SPECTRUM_SEGMENT_LEN);
        let band_dct = planner.plan_dct2(DESCRIPTOR_DIM);

        let hann = (0..SPECTRUM_SEGMENT_LEN)
            .map(|n| {
                let phase = 2.0 * std::f32::consts::PI * n as f32 / (SPECTRUM_SEGMENT_LEN - 1) as f32;
                0.5 - 0.5 * phase.cos()
            })
            .collect();

        Self {
            segment_dct,
            band_dct,
            hann,
            band_edges: log_spaced_band_edges(),
        }
    }

    /// The descriptor for one audio window.
    ///
    /// Short-time spectra are taken over the window (overlapping segments of
    /// [`SPECTRUM_SEGMENT_LEN`] samples), folded into [`DESCRIPTOR_DIM`]
    /// log-spaced bands, log-compressed, decorrelated with a final DCT, and
    /// averaged across the segments. Windows whose RMS falls below
    /// [`SILENCE_RMS_THRESHOLD`] yield the explicit silent descriptor.
    pub fn window_descriptor(&self, samples: &[f32]) -> AudioWindow {
        if samples.is_empty() || rms(samples) < SILENCE_RMS_THRESHOLD {
            return AudioWindow::silent();
        }

        let mut mean_coeffs = [0.0f32; DESCRIPTOR_DIM];
        let mut num_segments = 0u32;
        let mut segment_buf = vec![0.0f32; SPECTRUM_SEGMENT_LEN];

        let mut start = 0;
        loop {
            let segment = &samples[start..samples.len().min(start + SPECTRUM_SEGMENT_LEN)];

            // Windows shorter than one segment get a single zero-padded
            // segment so they still produce a descriptor.
            segment_buf.fill(0.0);
            for (buf, (sample, hann)) in segment_buf.iter_mut().zip(segment.iter().zip(&self.hann)) {
                *buf = sample * hann;
            }

            let coeffs = self.segment_coefficients(&mut segment_buf);
            for (acc, coeff) in mean_coeffs.iter_mut().zip(coeffs) {
                *acc += coeff;
            }
            num_segments += 1;

            start += SPECTRUM_SEGMENT_HOP;
            if start + SPECTRUM_SEGMENT_LEN > samples.len() {
                break;
            }
        }

        for acc in mean_coeffs.iter_mut() {
            *acc /= num_segments as f32;
        }

        AudioWindow {
            coeffs: mean_coeffs,
            silent: false,
        }
    }

    // One short-time spectrum -> banded log energies -> DCT-II decorrelation.
    fn segment_coefficients(&self, segment_buf: &mut [f32]) -> [f32; DESCRIPTOR_DIM] {
        self.segment_dct.process_dct2(segment_buf);

        let mut bands = [0.0f32; DESCRIPTOR_DIM];
        for (band, edges) in bands.iter_mut().zip(self.band_edges.windows(2)) {
            let (lo, hi) = (edges[0], edges[1]);
            let energy: f32 = segment_buf[lo..hi].iter().map(|c| c * c).sum();
            *band = (energy / (hi - lo) as f32 + 1e-10).ln();
        }

        self.band_dct.process_dct2(&mut bands);
        bands
    }
}

impl Default for SpectralPlan {
    fn default() -> Self {
        Self::new()
    }
}

// Band edges over the spectral bins, log-spaced so low frequencies get the
// finer resolution. First edge skips the DC bin.
fn log_spaced_band_edges() -> [usize; DESCRIPTOR_DIM + 1] {
    let lo = 1f64;
    let hi = SPECTRUM_SEGMENT_LEN as f64;
    let ratio = (hi / lo).ln() / DESCRIPTOR_DIM as f64;

    let mut edges = [0usize; DESCRIPTOR_DIM + 1];
    for (i, edge) in edges.iter_mut().enumerate() {
        *edge = (lo * (ratio * i as f64).exp()).round() as usize;
    }

    // rounding can collapse the narrow low bands; force each band nonempty
    for i in 1..edges.len() {
        if edges[i] <= edges[i - 1] {
            edges[i] = edges[i - 1] + 1;
        }
    }
    edges[DESCRIPTOR_DIM] = SPECTRUM_SEGMENT_LEN;
    edges
}

fn rms(samples: &[f32]) -> f32 {
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}
