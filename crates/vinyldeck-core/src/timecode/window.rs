//! Two-channel sample window carried across analysis passes
//!
//! The window keeps the part of the signal that has not been fully analyzed
//! yet. A carrier cycle split across two audio buffers is completed by the
//! next append instead of being lost.

use crate::error::{DecoderError, Result};

/// Left/right sample sequences of equal length
#[derive(Debug, Clone, Default)]
pub struct SampleWindow {
    channel_1: Vec<f32>,
    channel_2: Vec<f32>,
}

impl SampleWindow {
    /// Create an empty window
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty window able to hold `capacity` samples per channel
    /// without reallocating
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channel_1: Vec::with_capacity(capacity),
            channel_2: Vec::with_capacity(capacity),
        }
    }

    /// Append a block of samples to both channels
    ///
    /// # Errors
    /// [`DecoderError::InvalidInput`] if the blocks differ in length. The
    /// window is left untouched in that case.
    pub fn append(&mut self, samples_1: &[f32], samples_2: &[f32]) -> Result<()> {
        if samples_1.len() != samples_2.len() {
            return Err(DecoderError::InvalidInput(format!(
                "channel lengths differ: {} vs {}",
                samples_1.len(),
                samples_2.len()
            )));
        }
        self.channel_1.extend_from_slice(samples_1);
        self.channel_2.extend_from_slice(samples_2);
        Ok(())
    }

    /// Remove the first `n` samples of both channels
    ///
    /// `n` larger than the window empties it.
    pub fn consume_prefix(&mut self, n: usize) {
        let n = n.min(self.len());
        self.channel_1.drain(..n);
        self.channel_2.drain(..n);
    }

    /// Drop the oldest samples so that at most `max_len` remain
    ///
    /// Returns the number of samples removed per channel.
    pub fn trim_front_to(&mut self, max_len: usize) -> usize {
        let excess = self.len().saturating_sub(max_len);
        self.consume_prefix(excess);
        excess
    }

    /// Remove everything
    pub fn clear(&mut self) {
        self.channel_1.clear();
        self.channel_2.clear();
    }

    /// Samples per channel
    pub fn len(&self) -> usize {
        self.channel_1.len()
    }

    /// Whether the window holds no samples
    pub fn is_empty(&self) -> bool {
        self.channel_1.is_empty()
    }

    /// Channel 1 (left) samples
    pub fn channel_1(&self) -> &[f32] {
        &self.channel_1
    }

    /// Channel 2 (right) samples
    pub fn channel_2(&self) -> &[f32] {
        &self.channel_2
    }

    /// Mutable access to both channels, used for in-place gain
    pub(crate) fn tail_mut(&mut self, from: usize) -> (&mut [f32], &mut [f32]) {
        let from = from.min(self.len());
        (&mut self.channel_1[from..], &mut self.channel_2[from..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_consume() {
        let mut window = SampleWindow::new();
        window.append(&[0.1, 0.2, 0.3], &[0.4, 0.5, 0.6]).unwrap();
        window.append(&[0.7], &[0.8]).unwrap();
        assert_eq!(window.len(), 4);

        window.consume_prefix(2);
        assert_eq!(window.channel_1(), &[0.3, 0.7]);
        assert_eq!(window.channel_2(), &[0.6, 0.8]);
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let mut window = SampleWindow::new();
        window.append(&[0.1], &[0.2]).unwrap();

        let result = window.append(&[0.1, 0.2], &[0.3]);
        assert!(matches!(result, Err(DecoderError::InvalidInput(_))));
        assert_eq!(window.len(), 1, "Failed append must not modify the window");
        assert_eq!(window.channel_2().len(), 1);
    }

    #[test]
    fn test_consume_lengths_for_every_prefix() {
        for length in 0..20usize {
            for k in 0..=length {
                let samples: Vec<f32> = (0..length).map(|i| i as f32).collect();
                let mut window = SampleWindow::new();
                window.append(&samples, &samples).unwrap();
                window.consume_prefix(k);
                assert_eq!(window.len(), length - k);
                assert_eq!(window.channel_1().len(), window.channel_2().len());
            }
        }
    }

    #[test]
    fn test_consume_more_than_length() {
        let mut window = SampleWindow::new();
        window.append(&[1.0, 2.0], &[3.0, 4.0]).unwrap();
        window.consume_prefix(10);
        assert!(window.is_empty());
    }

    #[test]
    fn test_trim_front_keeps_newest() {
        let mut window = SampleWindow::with_capacity(8);
        let samples: Vec<f32> = (0..10).map(|i| i as f32).collect();
        window.append(&samples, &samples).unwrap();

        let removed = window.trim_front_to(4);
        assert_eq!(removed, 6);
        assert_eq!(window.channel_1(), &[6.0, 7.0, 8.0, 9.0]);

        assert_eq!(window.trim_front_to(100), 0);
        assert_eq!(window.len(), 4);
    }
}
