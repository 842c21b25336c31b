//! Carrier frequency identification
//!
//! Finds the dominant tone of a recording with an FFT, so an unknown record
//! can be matched to a [`VinylFormat`] before decoding starts.

use rustfft::{num_complex::Complex, FftPlanner};

use super::format::{Rpm, VinylFormat};

/// Shortest input worth analyzing
const MIN_FFT_SIZE: usize = 256;

/// Longest FFT computed; longer inputs only use their first samples
const MAX_FFT_SIZE: usize = 1 << 16;

/// FFT-based carrier detector
///
/// Keeps its planner so repeated calls with the same length reuse the plan.
pub struct CarrierDetector {
    sample_rate: u32,
    planner: FftPlanner<f32>,
    buffer: Vec<Complex<f32>>,
}

impl CarrierDetector {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            planner: FftPlanner::new(),
            buffer: Vec::new(),
        }
    }

    /// Dominant frequency of a mono signal, in Hz
    ///
    /// The peak bin is refined by parabolic interpolation of the log
    /// magnitudes around it. Returns `None` for inputs shorter than 256
    /// samples or without energy.
    pub fn estimate(&mut self, samples: &[f32]) -> Option<f32> {
        if samples.len() < MIN_FFT_SIZE || self.sample_rate == 0 {
            return None;
        }
        // Largest power of two that fits, so no zero padding smears the peak
        let fft_size = (1usize << samples.len().ilog2()).min(MAX_FFT_SIZE);

        // Hann window
        self.buffer.clear();
        self.buffer.extend(samples[..fft_size].iter().enumerate().map(|(i, &x)| {
            let w = 0.5 - 0.5 * (std::f32::consts::TAU * i as f32 / fft_size as f32).cos();
            Complex::new(x * w, 0.0)
        }));

        let fft = self.planner.plan_fft_forward(fft_size);
        fft.process(&mut self.buffer);

        let magnitudes: Vec<f32> = self.buffer[..fft_size / 2]
            .iter()
            .map(|c| c.norm())
            .collect();
        let (peak, &peak_magnitude) = magnitudes
            .iter()
            .enumerate()
            .skip(1)
            .max_by(|a, b| a.1.total_cmp(b.1))?;
        if peak_magnitude <= 1e-9 {
            return None;
        }

        let offset = match (magnitudes.get(peak - 1), magnitudes.get(peak + 1)) {
            (Some(&left), Some(&right)) if left > 0.0 && right > 0.0 => {
                let (l, c, r) = (left.ln(), peak_magnitude.ln(), right.ln());
                let denominator = l - 2.0 * c + r;
                if denominator.abs() > f32::EPSILON {
                    (0.5 * (l - r) / denominator).clamp(-0.5, 0.5)
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };

        Some((peak as f32 + offset) * self.sample_rate as f32 / fft_size as f32)
    }

    /// Estimate the carrier and map it to a format and turntable speed
    pub fn identify(&mut self, samples: &[f32], tolerance: f32) -> Option<(VinylFormat, Rpm)> {
        let frequency = self.estimate(samples)?;
        let found = VinylFormat::identify(frequency, tolerance);
        tracing::debug!(frequency_hz = frequency, found = ?found, "Carrier identification");
        found
    }
}

/// One-shot carrier estimate, see [`CarrierDetector::estimate`]
pub fn estimate_carrier_hz(samples: &[f32], sample_rate: u32) -> Option<f32> {
    CarrierDetector::new(sample_rate).estimate(samples)
}
