//! Synthetic timecode signal generation
//!
//! Produces the quadrature carrier pair a timecoded record plays back, with
//! the record speed, level and DC offset under the caller's control. Used by
//! the tests and by the `--simulate` command.

use std::f64::consts::{FRAC_PI_2, TAU};

use super::format::{Rpm, VinylFormat};

/// Quadrature carrier generator
///
/// Channel 1 is `sin(φ)` and channel 2 is `sin(φ - π/2)`, so channel 1
/// leads while the record turns forward. The phase is continuous across
/// blocks and speed changes.
#[derive(Debug, Clone)]
pub struct TimecodeGenerator {
    /// Sample rate in Hz
    sample_rate: u32,
    /// Carrier frequency at nominal speed
    carrier_hz: f32,
    /// Current carrier phase in radians, kept in `[0, 2π)`
    phase: f64,
    /// Signed speed ratio, negative plays backwards
    speed: f32,
    /// Peak amplitude of both channels
    amplitude: f32,
    /// Constant added to both channels
    dc_offset: f32,
    /// Emit channel 2 on the left output
    swap_channels: bool,
}

impl TimecodeGenerator {
    /// Create a generator at nominal forward speed
    ///
    /// # Arguments
    /// * `sample_rate` - Sample rate in Hz
    /// * `carrier_hz` - Carrier frequency at nominal speed
    ///
    /// # Example
    /// ```
    /// use vinyldeck_core::timecode::signal::TimecodeGenerator;
    ///
    /// let mut gen = TimecodeGenerator::new(44100, 1000.0);
    /// let (left, right) = gen.next_frame();
    /// assert!(left.abs() <= 0.5 && right.abs() <= 0.5);
    /// ```
    pub fn new(sample_rate: u32, carrier_hz: f32) -> Self {
        Self {
            sample_rate,
            carrier_hz,
            phase: 0.0,
            speed: 1.0,
            amplitude: 0.5, // -6dB to leave headroom
            dc_offset: 0.0,
            swap_channels: false,
        }
    }

    /// Create a generator that plays a format's record at 33 rpm
    ///
    /// The level is the format's full-scale amplitude and the channels are
    /// wired the way the format expects.
    pub fn for_format(format: VinylFormat, sample_rate: u32) -> Self {
        let mut generator = Self::new(sample_rate, format.reference_frequency_hz(Rpm::Rpm33));
        generator.amplitude = format.full_scale_amplitude();
        generator.swap_channels = format.reversed_channels();
        generator
    }

    /// Get the next sample pair
    pub fn next_frame(&mut self) -> (f32, f32) {
        let a = self.amplitude as f64;
        let first = (a * self.phase.sin()) as f32 + self.dc_offset;
        let second = (a * (self.phase - FRAC_PI_2).sin()) as f32 + self.dc_offset;

        let step = TAU * self.carrier_hz as f64 * self.speed as f64 / self.sample_rate as f64;
        self.phase = (self.phase + step).rem_euclid(TAU);

        if self.swap_channels {
            (second, first)
        } else {
            (first, second)
        }
    }

    /// Fill both channel buffers
    ///
    /// Only the common length of the two buffers is written.
    pub fn fill_blocks(&mut self, left: &mut [f32], right: &mut [f32]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            (*l, *r) = self.next_frame();
        }
    }

    /// Fill an interleaved buffer of `nb_channels` channels
    ///
    /// The pair goes to channels 0 and 1; any other channel is silent.
    pub fn fill_interleaved(&mut self, frames: &mut [f32], nb_channels: usize) {
        if nb_channels < 2 {
            return;
        }
        for frame in frames.chunks_exact_mut(nb_channels) {
            let (left, right) = self.next_frame();
            frame.fill(0.0);
            frame[0] = left;
            frame[1] = right;
        }
    }

    /// Set the signed speed ratio (1.0 = nominal, negative = backwards)
    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed;
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Change the nominal carrier, e.g. to play the record at 45 rpm
    pub fn set_carrier_hz(&mut self, carrier_hz: f32) {
        self.carrier_hz = carrier_hz;
    }

    /// Set the peak amplitude
    ///
    /// # Arguments
    /// * `amplitude` - Amplitude from 0.0 to 1.0
    pub fn set_amplitude(&mut self, amplitude: f32) {
        self.amplitude = amplitude.clamp(0.0, 1.0);
    }

    pub fn amplitude(&self) -> f32 {
        self.amplitude
    }

    pub fn set_dc_offset(&mut self, offset: f32) {
        self.dc_offset = offset;
    }

    pub fn set_swap_channels(&mut self, swap: bool) {
        self.swap_channels = swap;
    }

    /// Current carrier phase in radians
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Back to phase zero
    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_amplitude_and_offset() {
        let mut gen = TimecodeGenerator::new(44100, 1000.0);
        gen.set_amplitude(0.25);
        gen.set_dc_offset(0.1);
        for _ in 0..1000 {
            let (l, r) = gen.next_frame();
            assert!((l - 0.1).abs() <= 0.25 + 1e-6);
            assert!((r - 0.1).abs() <= 0.25 + 1e-6);
        }
    }

    #[test]
    fn test_amplitude_is_clamped() {
        let mut gen = TimecodeGenerator::new(44100, 1000.0);
        gen.set_amplitude(3.0);
        assert_eq!(gen.amplitude(), 1.0);
    }

    #[test]
    fn test_channels_in_quadrature() {
        let mut gen = TimecodeGenerator::new(44100, 1000.0);
        let (l, r) = gen.next_frame();
        assert_relative_eq!(l, 0.0);
        assert_relative_eq!(r, -0.5);
    }

    #[test]
    fn test_phase_advances_by_speed() {
        let mut gen = TimecodeGenerator::new(44100, 1000.0);
        gen.set_speed(0.5);
        gen.next_frame();
        assert_relative_eq!(gen.phase(), TAU * 500.0 / 44100.0, epsilon = 1e-12);

        gen.reset();
        gen.set_speed(-1.0);
        gen.next_frame();
        assert_relative_eq!(gen.phase(), TAU - TAU * 1000.0 / 44100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_blocks_are_continuous() {
        let mut whole = TimecodeGenerator::new(44100, 1000.0);
        let mut split = whole.clone();

        let (mut l1, mut r1) = (vec![0.0; 300], vec![0.0; 300]);
        whole.fill_blocks(&mut l1, &mut r1);

        let (mut l2, mut r2) = (vec![0.0; 300], vec![0.0; 300]);
        let (a, b) = l2.split_at_mut(117);
        let (c, d) = r2.split_at_mut(117);
        split.fill_blocks(a, c);
        split.fill_blocks(b, d);

        assert_eq!(l1, l2);
        assert_eq!(r1, r2);
    }

    #[test]
    fn test_format_wiring() {
        let mut gen = TimecodeGenerator::for_format(VinylFormat::Mixvibes, 44100);
        assert_relative_eq!(gen.amplitude(), 0.4);
        let (l, r) = gen.next_frame();
        assert_relative_eq!(l, -0.4);
        assert_relative_eq!(r, 0.0);
    }

    #[test]
    fn test_fill_interleaved() {
        let mut gen = TimecodeGenerator::new(44100, 1000.0);
        let mut frames = vec![1.0f32; 12];
        gen.fill_interleaved(&mut frames, 3);
        assert_relative_eq!(frames[1], -0.5);
        for frame in frames.chunks(3) {
            assert_eq!(frame[2], 0.0);
        }
    }
}
