//! Zero-crossing extraction
//!
//! A crossing is recorded between two consecutive samples that straddle
//! zero. Its position is linearly interpolated between the two samples so
//! interval measurements are not quantized to whole samples.

/// Keeps a crossing that starts exactly on zero strictly after its sample
const MIN_FRACTION: f64 = 1e-6;

/// A single sign change in a channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossingEvent {
    /// `true` for negative-to-positive, `false` for positive-to-negative
    pub is_rising: bool,
    /// Interpolated position, relative to the start of the window
    pub position: f64,
}

impl CrossingEvent {
    /// Index of the last sample before the sign change
    pub fn sample_index(&self) -> usize {
        // Positions lie in (i, i + 1]
        (self.position.ceil() as usize).saturating_sub(1)
    }
}

/// Stateless zero-crossing scanner
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroCrossExtractor;

impl ZeroCrossExtractor {
    /// Scan `samples` once and write every crossing into `out`
    ///
    /// `out` is cleared first so the caller can reuse its allocation.
    /// Returns the sample index of the last crossing, if any. Samples
    /// before that index belong to completed intervals; everything from it
    /// onwards has to stay in the window for the next pass.
    pub fn extract(samples: &[f32], out: &mut Vec<CrossingEvent>) -> Option<usize> {
        out.clear();
        for (i, pair) in samples.windows(2).enumerate() {
            let (a, b) = (pair[0], pair[1]);
            let is_rising = a < 0.0 && b >= 0.0;
            let is_falling = a >= 0.0 && b < 0.0;
            if !is_rising && !is_falling {
                continue;
            }
            let fraction = (a / (a - b)) as f64;
            out.push(CrossingEvent {
                is_rising,
                position: i as f64 + fraction.clamp(MIN_FRACTION, 1.0),
            });
        }
        out.last().map(CrossingEvent::sample_index)
    }
}
