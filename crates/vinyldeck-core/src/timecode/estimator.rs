//! Speed and direction from crossing timings
//!
//! Speed comes from the spacing of crossings in each channel compared with
//! the spacing the carrier has at nominal speed. Direction comes from which
//! channel crosses first: the two channels carry the same tone a quarter
//! period apart, so after a channel 1 crossing the next channel 2 crossing
//! has the same polarity when channel 1 leads and the opposite polarity when
//! channel 2 leads.

use serde::{Deserialize, Serialize};

use super::crossing::CrossingEvent;

/// Rotation direction of the record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    /// `1.0` forward, `-1.0` reverse
    pub fn sign(self) -> f32 {
        match self {
            Self::Forward => 1.0,
            Self::Reverse => -1.0,
        }
    }

    /// The opposite direction
    pub fn flipped(self) -> Self {
        match self {
            Self::Forward => Self::Reverse,
            Self::Reverse => Self::Forward,
        }
    }
}

/// Raw reading produced from one analysis pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Speed ratio magnitude (1.0 = nominal)
    pub speed: f32,
    /// `None` when the quadrature vote was tied
    pub direction: Option<Direction>,
}

/// Per-channel measurement details of a [`Candidate`]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChannelSpeeds {
    pub channel_1: Option<f32>,
    pub channel_2: Option<f32>,
}

impl ChannelSpeeds {
    /// Relative disagreement between the two channels, if both measured
    pub fn disagreement(&self) -> Option<f32> {
        match (self.channel_1, self.channel_2) {
            (Some(a), Some(b)) => {
                let mean = (a + b) / 2.0;
                if mean > 0.0 {
                    Some((a - b).abs() / mean)
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

/// Turns crossing lists into speed/direction candidates
#[derive(Debug, Clone)]
pub struct SpeedEstimator {
    /// Expected samples between crossings at nominal speed
    reference_cycle_length: f64,
    /// Invert the decoded direction (channel wiring)
    reverse_direction: bool,
    /// Channel disagreement above which a quality warning is logged
    disagreement_tolerance: f32,
}

impl SpeedEstimator {
    /// Create an estimator
    ///
    /// # Arguments
    /// * `sample_rate` - Sample rate in Hz
    /// * `carrier_hz` - Reference frequency of the record at nominal speed
    pub fn new(sample_rate: u32, carrier_hz: f32) -> Self {
        Self {
            reference_cycle_length: Self::cycle_length(sample_rate, carrier_hz),
            reverse_direction: false,
            disagreement_tolerance: 0.25,
        }
    }

    /// Samples between two crossings of a carrier at nominal speed
    pub fn cycle_length(sample_rate: u32, carrier_hz: f32) -> f64 {
        sample_rate as f64 / (2.0 * carrier_hz as f64)
    }

    /// Update the carrier after a sample rate, rpm or format change
    pub fn set_carrier(&mut self, sample_rate: u32, carrier_hz: f32) {
        self.reference_cycle_length = Self::cycle_length(sample_rate, carrier_hz);
    }

    pub fn reference_cycle_length(&self) -> f64 {
        self.reference_cycle_length
    }

    pub fn set_reverse_direction(&mut self, reverse: bool) {
        self.reverse_direction = reverse;
    }

    pub fn reverse_direction(&self) -> bool {
        self.reverse_direction
    }

    pub fn set_disagreement_tolerance(&mut self, tolerance: f32) {
        self.disagreement_tolerance = tolerance;
    }

    /// Estimate speed and direction from one pass
    ///
    /// Only intervals starting before `consumed` are measured; the rest are
    /// measured on the next pass, once those samples are the head of the
    /// window. Returns `None` when neither channel has such an interval.
    pub fn estimate(
        &self,
        crossings_1: &[CrossingEvent],
        crossings_2: &[CrossingEvent],
        consumed: usize,
    ) -> Option<(Candidate, ChannelSpeeds)> {
        let speeds = ChannelSpeeds {
            channel_1: self.channel_speed(crossings_1, consumed),
            channel_2: self.channel_speed(crossings_2, consumed),
        };

        let speed = match (speeds.channel_1, speeds.channel_2) {
            (Some(a), Some(b)) => (a + b) / 2.0,
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => return None,
        };

        if let Some(disagreement) = speeds.disagreement() {
            if disagreement > self.disagreement_tolerance {
                tracing::debug!(
                    channel_1 = ?speeds.channel_1,
                    channel_2 = ?speeds.channel_2,
                    disagreement,
                    "Channel speeds disagree"
                );
            }
        }

        let direction = Self::vote_direction(crossings_1, crossings_2, consumed).map(|d| {
            if self.reverse_direction {
                d.flipped()
            } else {
                d
            }
        });

        Some((Candidate { speed, direction }, speeds))
    }

    /// Mean of `reference / interval` over the measured intervals of a channel
    fn channel_speed(&self, crossings: &[CrossingEvent], consumed: usize) -> Option<f32> {
        let (sum, count) = crossings
            .windows(2)
            .take_while(|pair| pair[0].sample_index() < consumed)
            .map(|pair| pair[1].position - pair[0].position)
            .filter(|&interval| interval > 0.0)
            .fold((0.0f64, 0usize), |(sum, count), interval| {
                (sum + self.reference_cycle_length / interval, count + 1)
            });

        if count == 0 {
            None
        } else {
            Some((sum / count as f64) as f32)
        }
    }

    /// Quadrature vote over the measured channel 1 crossings
    ///
    /// The channel 2 crossing has to fall before the next channel 1 crossing
    /// to take part, which keeps a dead channel 2 from voting.
    fn vote_direction(
        crossings_1: &[CrossingEvent],
        crossings_2: &[CrossingEvent],
        consumed: usize,
    ) -> Option<Direction> {
        let mut balance = 0i64;

        for (i, lead) in crossings_1.iter().enumerate() {
            if lead.sample_index() >= consumed {
                break;
            }
            let next = crossings_2.partition_point(|c| c.position <= lead.position);
            let Some(follower) = crossings_2.get(next) else {
                break;
            };
            if let Some(bound) = crossings_1.get(i + 1) {
                if follower.position >= bound.position {
                    continue;
                }
            }
            if follower.is_rising == lead.is_rising {
                balance += 1;
            } else {
                balance -= 1;
            }
        }

        match balance.signum() {
            1 => Some(Direction::Forward),
            -1 => Some(Direction::Reverse),
            _ => None,
        }
    }
}
