//! Amplitude measurement, gain and DC-bias removal
//!
//! Everything here works on one channel at a time. The amplitude helpers
//! double as the volume measurement reported to the player.

/// Highest volume ever reported, whatever the input level
pub const MAX_VOLUME: f32 = 1.0;

/// Largest representable sample magnitude
pub const CLIP_LEVEL: f32 = 1.0;

/// Time constant of the DC-bias estimate, in seconds
const DC_TIME_CONSTANT_SECS: f32 = 0.1;

/// Mean absolute value of a channel (0.0 for an empty slice)
pub fn amplitude_average(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|x| x.abs()).sum::<f32>() / samples.len() as f32
}

/// Maximum absolute value of a channel (0.0 for an empty slice)
pub fn amplitude_peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |peak, x| peak.max(x.abs()))
}

/// Signed mean of a channel
pub fn dc_offset(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f32>() / samples.len() as f32
}

/// Average amplitude of the louder of two channels
///
/// A quadrature pair never has both channels near zero at once, so this
/// stays close to the carrier amplitude even over a handful of samples.
pub fn presence_level(channel_1: &[f32], channel_2: &[f32]) -> f32 {
    amplitude_average(channel_1).max(amplitude_average(channel_2))
}

/// Normalize a peak amplitude into a volume in `[0, MAX_VOLUME]`
pub fn volume_from_peak(peak: f32, full_scale: f32) -> f32 {
    if full_scale <= 0.0 || !peak.is_finite() {
        return 0.0;
    }
    (peak / full_scale).clamp(0.0, MAX_VOLUME)
}

/// Multiply by `coeff` and clamp to the representable range
///
/// Only coefficients above 1 amplify; 1 leaves the samples untouched.
pub fn apply_gain_and_clip(samples: &mut [f32], coeff: f32) {
    if coeff <= 1.0 {
        return;
    }
    for sample in samples.iter_mut() {
        *sample = (*sample * coeff).clamp(-CLIP_LEVEL, CLIP_LEVEL);
    }
}

/// Subtract a DC bias from every sample
pub fn center(samples: &mut [f32], bias: f32) {
    if bias == 0.0 {
        return;
    }
    for sample in samples.iter_mut() {
        *sample -= bias;
    }
}

/// Amplitude summary of both channels over one analysis window
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SignalLevel {
    /// Average amplitude of the weaker channel
    pub average: f32,
    /// Peak amplitude of the weaker channel
    pub peak: f32,
    /// Normalized volume from the mean of both channel peaks
    pub volume: f32,
}

impl SignalLevel {
    /// Measure both (already centered) channels
    pub fn measure(channel_1: &[f32], channel_2: &[f32], full_scale: f32) -> Self {
        let (peak_1, peak_2) = (amplitude_peak(channel_1), amplitude_peak(channel_2));
        Self {
            average: amplitude_average(channel_1).min(amplitude_average(channel_2)),
            peak: peak_1.min(peak_2),
            volume: volume_from_peak((peak_1 + peak_2) / 2.0, full_scale),
        }
    }
}

/// Slow estimate of a channel's DC offset
///
/// Fed with the segments the decoder has finished analyzing. Those segments
/// start and end on crossings, so a bias that shows up in a single window
/// because it holds a partial cycle averages out over a few passes. Samples
/// dropped at the window cap are folded in too: an offset larger than the
/// carrier leaves no crossings, and the cap is the only way out.
#[derive(Debug, Clone)]
pub struct DcTracker {
    bias: f32,
    time_constant_samples: f32,
}

impl DcTracker {
    /// Create a tracker for the given sample rate
    pub fn new(sample_rate: u32) -> Self {
        Self {
            bias: 0.0,
            time_constant_samples: (sample_rate as f32 * DC_TIME_CONSTANT_SECS).max(1.0),
        }
    }

    /// Fold a finished segment into the estimate
    pub fn update(&mut self, segment: &[f32]) {
        if segment.is_empty() {
            return;
        }
        let len = segment.len() as f32;
        let weight = len / (len + self.time_constant_samples);
        self.bias += (dc_offset(segment) - self.bias) * weight;
    }

    /// Current bias estimate
    pub fn bias(&self) -> f32 {
        self.bias
    }

    /// Forget the estimate
    pub fn reset(&mut self) {
        self.bias = 0.0;
    }
}
