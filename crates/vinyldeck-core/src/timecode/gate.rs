//! Validity gating, transient suppression and smoothing
//!
//! Raw candidates from the estimator are noisy: a needle drop produces a
//! few cycles of garbage, a scratch produces a direction change that may
//! only last one buffer, and a lifted stylus produces silence. The gate
//! decides which candidates become readings and keeps the last reading
//! alive for a few failed cycles before declaring the signal lost.
//!
//! ```text
//!        accepted (same sign) x N
//!  Idle ──────────────► Starting ─────────► Running ◄────────┐
//!   ▲                                        │  opposite sign │ x M
//!   │ failed x max_no_new_speed_found        ▼                │
//!   └────────────────────────────── DirectionPending ─────────┘
//! ```

use serde::{Deserialize, Serialize};

use super::conditioner::SignalLevel;
use super::estimator::{Candidate, Direction};
use crate::error::{DecoderError, Result};

/// Consecutive failed cycles before the reading is dropped
pub const MAX_NO_NEW_SPEED_FOUND: u32 = 3;

/// Highest speed trusted when the signal is weak
pub const SPEED_FOR_VOLUME_CUT: f32 = 0.90;

/// Accepted candidates in a row without a direction vote before a quality
/// warning is logged
pub const DIRECTION_UNCERTAIN_WARNING: u32 = 8;

fn default_max_no_new_speed_found() -> u32 {
    MAX_NO_NEW_SPEED_FOUND
}

fn default_confirmations() -> u32 {
    3
}

fn default_smoothing_factor() -> f32 {
    0.5
}

fn default_max_speed_step() -> f32 {
    0.3
}

fn default_max_weak_signal_speed() -> f32 {
    SPEED_FOR_VOLUME_CUT
}

fn default_channel_disagreement_tolerance() -> f32 {
    0.25
}

/// Tunable limits of the gate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateThresholds {
    /// Failed cycles tolerated before reporting "no reading"
    #[serde(default = "default_max_no_new_speed_found")]
    pub max_no_new_speed_found: u32,
    /// Consistent candidates needed before the first reading
    #[serde(default = "default_confirmations")]
    pub startup_confirmations: u32,
    /// Consistent candidates needed to accept a direction change
    #[serde(default = "default_confirmations")]
    pub direction_change_confirmations: u32,
    /// Low-pass coefficient in `(0, 1]`, 1 disables smoothing
    #[serde(default = "default_smoothing_factor")]
    pub smoothing_factor: f32,
    /// Largest speed change applied in one cycle
    #[serde(default = "default_max_speed_step")]
    pub max_speed_step: f32,
    /// Highest speed accepted while the amplitude is below the normal-speed threshold
    #[serde(default = "default_max_weak_signal_speed")]
    pub max_weak_signal_speed: f32,
    /// Relative channel disagreement that triggers a quality warning
    #[serde(default = "default_channel_disagreement_tolerance")]
    pub channel_disagreement_tolerance: f32,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            max_no_new_speed_found: default_max_no_new_speed_found(),
            startup_confirmations: default_confirmations(),
            direction_change_confirmations: default_confirmations(),
            smoothing_factor: default_smoothing_factor(),
            max_speed_step: default_max_speed_step(),
            max_weak_signal_speed: default_max_weak_signal_speed(),
            channel_disagreement_tolerance: default_channel_disagreement_tolerance(),
        }
    }
}

impl GateThresholds {
    /// Check every field is in range
    pub fn validate(&self) -> Result<()> {
        if self.max_no_new_speed_found == 0 {
            return Err(DecoderError::parameter(
                "max_no_new_speed_found",
                "must be at least 1",
            ));
        }
        if self.startup_confirmations == 0 {
            return Err(DecoderError::parameter(
                "startup_confirmations",
                "must be at least 1",
            ));
        }
        if self.direction_change_confirmations == 0 {
            return Err(DecoderError::parameter(
                "direction_change_confirmations",
                "must be at least 1",
            ));
        }
        if !(self.smoothing_factor > 0.0 && self.smoothing_factor <= 1.0) {
            return Err(DecoderError::parameter(
                "smoothing_factor",
                format!("{} is outside (0, 1]", self.smoothing_factor),
            ));
        }
        if !(self.max_speed_step > 0.0 && self.max_speed_step.is_finite()) {
            return Err(DecoderError::parameter(
                "max_speed_step",
                format!("{} must be positive", self.max_speed_step),
            ));
        }
        if !(self.max_weak_signal_speed >= 0.0 && self.max_weak_signal_speed.is_finite()) {
            return Err(DecoderError::parameter(
                "max_weak_signal_speed",
                format!("{} must be non-negative", self.max_weak_signal_speed),
            ));
        }
        if !(self.channel_disagreement_tolerance >= 0.0) {
            return Err(DecoderError::parameter(
                "channel_disagreement_tolerance",
                format!("{} must be non-negative", self.channel_disagreement_tolerance),
            ));
        }
        Ok(())
    }
}

/// Where the gate stands in confirming turntable motion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotionState {
    /// No confirmed motion
    #[default]
    Idle,
    /// Motion seen, waiting for enough consistent candidates
    Starting {
        direction: Direction,
        confirmations: u32,
    },
    /// Readings are being reported
    Running,
    /// Readings are being reported, a direction change awaits confirmation
    DirectionPending {
        direction: Direction,
        confirmations: u32,
    },
}

/// What one analysis pass produced
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// Not enough signal accumulated yet to judge
    Pending,
    /// Silence, noise, or a window that overflowed without a usable cycle
    NoSignal,
    /// A raw reading and the level of the window it came from
    Candidate {
        candidate: Candidate,
        level: SignalLevel,
    },
}

/// Amplitude thresholds applied to every window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmplitudeThresholds {
    /// Below this the window is noise
    pub min_amplitude: f32,
    /// Below this only slow motion is trusted
    pub min_amplitude_for_normal_speed: f32,
}

/// Turns candidates into readings
#[derive(Debug, Clone)]
pub struct MotionGate {
    thresholds: GateThresholds,
    amplitude: AmplitudeThresholds,
    state: MotionState,
    /// Speed magnitude of the current reading
    speed: Option<f32>,
    direction: Option<Direction>,
    volume: Option<f32>,
    no_new_speed_found: u32,
    direction_uncertain: u32,
}

impl MotionGate {
    pub fn new(thresholds: GateThresholds, amplitude: AmplitudeThresholds) -> Self {
        Self {
            thresholds,
            amplitude,
            state: MotionState::Idle,
            speed: None,
            direction: None,
            volume: None,
            no_new_speed_found: 0,
            direction_uncertain: 0,
        }
    }

    /// Whether a window at this level is noise
    pub fn is_noise(&self, level: &SignalLevel) -> bool {
        level.peak < self.amplitude.min_amplitude || level.average < self.amplitude.min_amplitude
    }

    /// Whether a block whose louder channel averages `presence` is silent
    pub fn is_silent(&self, presence: f32) -> bool {
        presence < self.amplitude.min_amplitude
    }

    /// Feed the outcome of one pass
    ///
    /// Returns `true` when the reading changed: a candidate was accepted, or
    /// the reading was dropped because the signal is gone.
    pub fn observe(&mut self, outcome: CycleOutcome) -> bool {
        match outcome {
            CycleOutcome::Pending => false,
            CycleOutcome::NoSignal => self.fail(),
            CycleOutcome::Candidate { candidate, level } => {
                if self.is_noise(&level) {
                    return self.fail();
                }
                if level.average < self.amplitude.min_amplitude_for_normal_speed
                    && candidate.speed > self.thresholds.max_weak_signal_speed
                {
                    tracing::trace!(
                        speed = candidate.speed,
                        amplitude = level.average,
                        "Fast reading on weak signal rejected"
                    );
                    return self.fail();
                }
                self.accept(candidate, level.volume)
            }
        }
    }

    fn fail(&mut self) -> bool {
        self.no_new_speed_found = self.no_new_speed_found.saturating_add(1);
        if self.no_new_speed_found < self.thresholds.max_no_new_speed_found {
            return false;
        }

        match self.state {
            MotionState::Idle => false,
            MotionState::Starting { .. } => {
                self.state = MotionState::Idle;
                false
            }
            MotionState::Running | MotionState::DirectionPending { .. } => {
                tracing::debug!(
                    failed_cycles = self.no_new_speed_found,
                    "Timecode signal lost"
                );
                self.clear_reading();
                true
            }
        }
    }

    fn accept(&mut self, candidate: Candidate, volume: f32) -> bool {
        self.no_new_speed_found = 0;
        match candidate.direction {
            Some(_) => self.direction_uncertain = 0,
            None => {
                self.direction_uncertain = self.direction_uncertain.saturating_add(1);
                if self.direction_uncertain == DIRECTION_UNCERTAIN_WARNING {
                    tracing::debug!(
                        cycles = self.direction_uncertain,
                        speed = candidate.speed,
                        "Direction undecided, channel 2 may be missing"
                    );
                }
            }
        }

        match (self.state, candidate.direction) {
            (MotionState::Idle, None) => false,
            (MotionState::Idle, Some(direction)) => {
                self.state = MotionState::Starting {
                    direction,
                    confirmations: 1,
                };
                self.confirm_start(candidate, volume)
            }
            (MotionState::Starting { .. }, None) => false,
            (
                MotionState::Starting {
                    direction,
                    confirmations,
                },
                Some(seen),
            ) => {
                self.state = if seen == direction {
                    MotionState::Starting {
                        direction,
                        confirmations: confirmations + 1,
                    }
                } else {
                    MotionState::Starting {
                        direction: seen,
                        confirmations: 1,
                    }
                };
                self.confirm_start(candidate, volume)
            }
            (MotionState::Running, seen) => {
                if let (Some(seen), Some(current)) = (seen, self.direction) {
                    if seen != current {
                        self.begin_direction_change(seen);
                    }
                }
                self.update_reading(candidate.speed, volume);
                true
            }
            (
                MotionState::DirectionPending {
                    direction,
                    confirmations,
                },
                seen,
            ) => {
                match seen {
                    Some(seen) if seen == direction => {
                        let confirmations = confirmations + 1;
                        if confirmations >= self.thresholds.direction_change_confirmations {
                            self.commit_direction(direction);
                        } else {
                            self.state = MotionState::DirectionPending {
                                direction,
                                confirmations,
                            };
                        }
                    }
                    Some(_) => {
                        tracing::trace!("Direction change rejected as transient");
                        self.state = MotionState::Running;
                    }
                    None => {}
                }
                self.update_reading(candidate.speed, volume);
                true
            }
        }
    }

    fn confirm_start(&mut self, candidate: Candidate, volume: f32) -> bool {
        let MotionState::Starting {
            direction,
            confirmations,
        } = self.state
        else {
            return false;
        };
        if confirmations < self.thresholds.startup_confirmations {
            return false;
        }

        tracing::debug!(
            speed = candidate.speed,
            direction = ?direction,
            "Turntable motion confirmed"
        );
        self.state = MotionState::Running;
        self.speed = Some(candidate.speed);
        self.direction = Some(direction);
        self.volume = Some(volume);
        true
    }

    fn begin_direction_change(&mut self, direction: Direction) {
        if self.thresholds.direction_change_confirmations <= 1 {
            self.commit_direction(direction);
        } else {
            self.state = MotionState::DirectionPending {
                direction,
                confirmations: 1,
            };
        }
    }

    fn commit_direction(&mut self, direction: Direction) {
        tracing::debug!(direction = ?direction, "Direction change confirmed");
        self.direction = Some(direction);
        self.state = MotionState::Running;
    }

    fn update_reading(&mut self, target: f32, volume: f32) {
        let next = match self.speed {
            Some(previous) => {
                let step = ((target - previous) * self.thresholds.smoothing_factor)
                    .clamp(-self.thresholds.max_speed_step, self.thresholds.max_speed_step);
                (previous + step).max(0.0)
            }
            None => target,
        };
        self.speed = Some(next);
        self.volume = Some(volume);
    }

    fn clear_reading(&mut self) {
        self.state = MotionState::Idle;
        self.speed = None;
        self.direction = None;
        self.volume = None;
    }

    /// Signed speed of the current reading
    pub fn speed(&self) -> Option<f32> {
        let magnitude = self.speed?;
        let sign = self.direction.map_or(1.0, Direction::sign);
        Some(magnitude * sign)
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    pub fn volume(&self) -> Option<f32> {
        self.volume
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    pub fn thresholds(&self) -> &GateThresholds {
        &self.thresholds
    }

    pub fn set_thresholds(&mut self, thresholds: GateThresholds) {
        self.thresholds = thresholds;
    }

    pub fn amplitude(&self) -> &AmplitudeThresholds {
        &self.amplitude
    }

    pub fn set_amplitude(&mut self, amplitude: AmplitudeThresholds) {
        self.amplitude = amplitude;
    }

    /// Consecutive cycles without a usable candidate
    pub fn no_new_speed_found(&self) -> u32 {
        self.no_new_speed_found
    }

    /// Consecutive accepted candidates without a direction vote
    ///
    /// The reported direction is held while this grows. A player can treat
    /// a value of [`DIRECTION_UNCERTAIN_WARNING`] or more as a wiring fault
    /// and stop trusting the sign.
    pub fn direction_uncertain(&self) -> u32 {
        self.direction_uncertain
    }

    /// Clear counters and pending confirmations, keep the reading
    pub fn reset_counters(&mut self) {
        self.no_new_speed_found = 0;
        self.direction_uncertain = 0;
        self.state = match self.state {
            MotionState::Idle | MotionState::Starting { .. } => MotionState::Idle,
            MotionState::Running | MotionState::DirectionPending { .. } => MotionState::Running,
        };
    }

    /// Back to the initial state, dropping the reading
    pub fn reset(&mut self) {
        self.clear_reading();
        self.no_new_speed_found = 0;
        self.direction_uncertain = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const STRONG: SignalLevel = SignalLevel {
        average: 0.3,
        peak: 0.5,
        volume: 1.0,
    };

    fn gate() -> MotionGate {
        MotionGate::new(
            GateThresholds::default(),
            AmplitudeThresholds {
                min_amplitude: 0.05,
                min_amplitude_for_normal_speed: 0.1,
            },
        )
    }

    fn candidate(speed: f32, direction: Direction) -> CycleOutcome {
        CycleOutcome::Candidate {
            candidate: Candidate {
                speed,
                direction: Some(direction),
            },
            level: STRONG,
        }
    }

    fn running_gate() -> MotionGate {
        let mut gate = gate();
        for _ in 0..3 {
            gate.observe(candidate(1.0, Direction::Forward));
        }
        assert_eq!(gate.state(), MotionState::Running);
        gate
    }

    #[test]
    fn test_startup_needs_confirmations() {
        let mut gate = gate();
        assert!(!gate.observe(candidate(1.0, Direction::Forward)));
        assert!(!gate.observe(candidate(1.0, Direction::Forward)));
        assert_eq!(gate.speed(), None);
        assert!(gate.observe(candidate(1.0, Direction::Forward)));
        assert_eq!(gate.speed(), Some(1.0));
        assert_eq!(gate.volume(), Some(1.0));
    }

    #[test]
    fn test_startup_restarts_on_sign_change() {
        let mut gate = gate();
        gate.observe(candidate(1.0, Direction::Forward));
        gate.observe(candidate(1.0, Direction::Forward));
        gate.observe(candidate(1.0, Direction::Reverse));
        assert_eq!(
            gate.state(),
            MotionState::Starting {
                direction: Direction::Reverse,
                confirmations: 1
            }
        );
    }

    #[test]
    fn test_pending_does_not_count() {
        let mut gate = running_gate();
        for _ in 0..10 {
            assert!(!gate.observe(CycleOutcome::Pending));
        }
        assert_eq!(gate.speed(), Some(1.0));
    }

    #[test]
    fn test_signal_lost_after_failures() {
        let mut gate = running_gate();
        assert!(!gate.observe(CycleOutcome::NoSignal));
        assert!(!gate.observe(CycleOutcome::NoSignal));
        assert_eq!(gate.speed(), Some(1.0), "Last reading held during grace");
        assert!(gate.observe(CycleOutcome::NoSignal));
        assert_eq!(gate.speed(), None);
        assert_eq!(gate.volume(), None);
        assert_eq!(gate.state(), MotionState::Idle);
    }

    #[test]
    fn test_noise_level_is_failure() {
        let mut gate = running_gate();
        let quiet = CycleOutcome::Candidate {
            candidate: Candidate {
                speed: 1.0,
                direction: Some(Direction::Forward),
            },
            level: SignalLevel {
                average: 0.01,
                peak: 0.02,
                volume: 0.04,
            },
        };
        gate.observe(quiet);
        assert_eq!(gate.no_new_speed_found(), 1);
    }

    #[test]
    fn test_weak_signal_only_trusts_slow_motion() {
        let mut gate = running_gate();
        let weak = SignalLevel {
            average: 0.07,
            peak: 0.12,
            volume: 0.24,
        };
        let fast = CycleOutcome::Candidate {
            candidate: Candidate {
                speed: 1.0,
                direction: Some(Direction::Forward),
            },
            level: weak,
        };
        assert!(!gate.observe(fast));
        assert_eq!(gate.no_new_speed_found(), 1);

        let slow = CycleOutcome::Candidate {
            candidate: Candidate {
                speed: 0.4,
                direction: Some(Direction::Forward),
            },
            level: weak,
        };
        assert!(gate.observe(slow));
        assert_eq!(gate.no_new_speed_found(), 0);
        assert_relative_eq!(gate.volume().unwrap(), 0.24);
    }

    #[test]
    fn test_smoothing_is_bounded() {
        let mut gate = running_gate();
        gate.observe(candidate(3.0, Direction::Forward));
        assert_relative_eq!(gate.speed().unwrap(), 1.3);
        gate.observe(candidate(1.4, Direction::Forward));
        assert_relative_eq!(gate.speed().unwrap(), 1.35);
    }

    #[test]
    fn test_single_direction_flip_rejected() {
        let mut gate = running_gate();
        gate.observe(candidate(1.0, Direction::Reverse));
        assert_eq!(gate.direction(), Some(Direction::Forward));
        assert!(gate.speed().unwrap() > 0.0);
        gate.observe(candidate(1.0, Direction::Forward));
        assert_eq!(gate.state(), MotionState::Running);
        assert_eq!(gate.direction(), Some(Direction::Forward));
    }

    #[test]
    fn test_direction_change_confirmed() {
        let mut gate = running_gate();
        for _ in 0..3 {
            gate.observe(candidate(1.0, Direction::Reverse));
        }
        assert_eq!(gate.direction(), Some(Direction::Reverse));
        assert_relative_eq!(gate.speed().unwrap(), -1.0);
    }

    #[test]
    fn test_uncertain_direction_keeps_sign() {
        let mut gate = running_gate();
        let outcome = CycleOutcome::Candidate {
            candidate: Candidate {
                speed: 1.0,
                direction: None,
            },
            level: STRONG,
        };
        assert!(gate.observe(outcome));
        assert_eq!(gate.direction(), Some(Direction::Forward));
        assert_eq!(gate.direction_uncertain(), 1);
    }

    /// A long run without votes holds the sign until a vote arrives
    #[test]
    fn test_sustained_uncertain_direction() {
        let mut gate = running_gate();
        let unvoted = CycleOutcome::Candidate {
            candidate: Candidate {
                speed: 1.0,
                direction: None,
            },
            level: STRONG,
        };
        for _ in 0..DIRECTION_UNCERTAIN_WARNING + 2 {
            assert!(gate.observe(unvoted));
        }
        assert!(gate.direction_uncertain() >= DIRECTION_UNCERTAIN_WARNING);
        assert_eq!(gate.direction(), Some(Direction::Forward));
        assert_eq!(gate.state(), MotionState::Running);

        gate.observe(candidate(1.0, Direction::Forward));
        assert_eq!(gate.direction_uncertain(), 0);
    }

    #[test]
    fn test_silence_threshold_follows_min_amplitude() {
        let mut gate = gate();
        assert!(gate.is_silent(0.0));
        assert!(gate.is_silent(0.04));
        assert!(!gate.is_silent(0.05));

        gate.set_amplitude(AmplitudeThresholds {
            min_amplitude: 0.0,
            min_amplitude_for_normal_speed: 0.0,
        });
        assert!(!gate.is_silent(0.0));
    }

    #[test]
    fn test_reset_counters_keeps_reading() {
        let mut gate = running_gate();
        gate.observe(candidate(1.0, Direction::Reverse));
        gate.observe(CycleOutcome::NoSignal);
        gate.reset_counters();
        assert_eq!(gate.state(), MotionState::Running);
        assert_eq!(gate.no_new_speed_found(), 0);
        assert_eq!(gate.speed(), Some(1.0));

        gate.reset();
        assert_eq!(gate.speed(), None);
    }

    #[test]
    fn test_threshold_validation() {
        assert!(GateThresholds::default().validate().is_ok());

        let zero_startup = GateThresholds {
            startup_confirmations: 0,
            ..Default::default()
        };
        assert!(zero_startup.validate().is_err());

        let bad_smoothing = GateThresholds {
            smoothing_factor: 1.5,
            ..Default::default()
        };
        assert!(bad_smoothing.validate().is_err());

        let negative = GateThresholds {
            max_weak_signal_speed: -0.1,
            ..Default::default()
        };
        assert!(negative.validate().is_err());
    }
}
