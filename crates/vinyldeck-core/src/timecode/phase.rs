//! Phase unwrapping and relative record position
//!
//! The two timecode channels form a quadrature pair, so every sample pair
//! gives an instantaneous carrier phase. Unwrapped, that phase counts carrier
//! cycles played since tracking started, which is the distance the needle
//! has travelled.

use std::f64::consts::{PI, TAU};

/// Removes the `2π` jumps from a sequence of wrapped phases
///
/// Consecutive inputs are assumed to differ by less than `π`; a larger step
/// is taken to be a wrap-around.
#[derive(Debug, Clone, Default)]
pub struct PhaseUnwrapper {
    previous: Option<f64>,
    offset: f64,
}

impl PhaseUnwrapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unwrap one phase value in `[-π, π]`
    ///
    /// # Example
    /// ```
    /// use vinyldeck_core::timecode::phase::PhaseUnwrapper;
    ///
    /// let mut unwrapper = PhaseUnwrapper::new();
    /// unwrapper.unwrap(3.0);
    /// let next = unwrapper.unwrap(-3.0);
    /// assert!((next - (2.0 * std::f64::consts::PI - 3.0)).abs() < 1e-9);
    /// ```
    pub fn unwrap(&mut self, phase: f64) -> f64 {
        if let Some(previous) = self.previous {
            let delta = phase - previous;
            if delta > PI {
                self.offset -= TAU;
            } else if delta < -PI {
                self.offset += TAU;
            }
        }
        self.previous = Some(phase);
        phase + self.offset
    }

    /// Unwrap a whole sequence in place
    pub fn process(&mut self, phases: &mut [f64]) {
        for phase in phases.iter_mut() {
            *phase = self.unwrap(*phase);
        }
    }

    /// Forget the history; the next value is taken as-is
    pub fn reset(&mut self) {
        self.previous = None;
        self.offset = 0.0;
    }
}

/// Accumulates the distance played, in seconds of nominal-speed audio
#[derive(Debug, Clone)]
pub struct PositionTracker {
    unwrapper: PhaseUnwrapper,
    last_phase: Option<f64>,
    position_secs: f64,
    carrier_hz: f64,
    min_amplitude: f32,
    reverse_direction: bool,
}

impl PositionTracker {
    /// Create a tracker
    ///
    /// # Arguments
    /// * `carrier_hz` - Carrier frequency at nominal speed
    /// * `min_amplitude` - Sample pairs weaker than this break the phase track
    pub fn new(carrier_hz: f32, min_amplitude: f32) -> Self {
        Self {
            unwrapper: PhaseUnwrapper::new(),
            last_phase: None,
            position_secs: 0.0,
            carrier_hz: carrier_hz as f64,
            min_amplitude,
            reverse_direction: false,
        }
    }

    /// Follow the phase over a block of conditioned samples
    pub fn update(&mut self, channel_1: &[f32], channel_2: &[f32]) {
        if self.carrier_hz <= 0.0 {
            return;
        }
        let sign = if self.reverse_direction { -1.0 } else { 1.0 };

        for (&a, &b) in channel_1.iter().zip(channel_2) {
            if a.hypot(b) < self.min_amplitude {
                self.break_track();
                continue;
            }
            let phase = self.unwrapper.unwrap((a as f64).atan2(-b as f64));
            if let Some(last) = self.last_phase {
                self.position_secs += sign * (phase - last) / (TAU * self.carrier_hz);
            }
            self.last_phase = Some(phase);
        }
    }

    fn break_track(&mut self) {
        if self.last_phase.is_some() {
            self.unwrapper.reset();
            self.last_phase = None;
        }
    }

    pub fn position_secs(&self) -> f64 {
        self.position_secs
    }

    pub fn set_carrier(&mut self, carrier_hz: f32) {
        self.carrier_hz = carrier_hz as f64;
    }

    pub fn set_min_amplitude(&mut self, min_amplitude: f32) {
        self.min_amplitude = min_amplitude;
    }

    pub fn set_reverse_direction(&mut self, reverse: bool) {
        self.reverse_direction = reverse;
    }

    /// Zero the position without losing the phase track
    pub fn reset_position(&mut self) {
        self.position_secs = 0.0;
    }

    /// Zero the position and drop the phase track
    pub fn reset(&mut self) {
        self.position_secs = 0.0;
        self.break_track();
    }
}
