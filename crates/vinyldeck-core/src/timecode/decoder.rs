//! Timecode decoding engine
//!
//! [`TimecodeDecoder`] owns one turntable's analysis state. Each call to
//! [`TimecodeDecoder::analyze`] appends an audio block, conditions it, finds
//! the crossings, turns the completed intervals into a candidate and lets
//! the gate decide whether the reading changes. Samples of an interval that
//! is still in progress stay in the window for the next block.

use super::conditioner::{apply_gain_and_clip, center, presence_level, DcTracker, SignalLevel};
use super::crossing::{CrossingEvent, ZeroCrossExtractor};
use super::estimator::{Direction, SpeedEstimator};
use super::format::{Rpm, VinylFormat};
use super::gate::{
    AmplitudeThresholds, CycleOutcome, GateThresholds, MotionGate, MotionState,
};
use super::phase::PositionTracker;
use super::window::SampleWindow;
use crate::config::DecoderConfig;
use crate::error::{DecoderError, Result};
use crate::{DEFAULT_INPUT_GAIN, MAX_SAMPLE_RATE, MAX_SIN_WAV_AREA_FACTOR, MIN_SAMPLE_RATE};

/// Speed, direction and volume decoder for one turntable
///
/// # Example
/// ```
/// use vinyldeck_core::{TimecodeDecoder, TimecodeGenerator, VinylFormat};
///
/// let mut decoder = TimecodeDecoder::new(VinylFormat::Serato, 44100).unwrap();
/// let mut generator = TimecodeGenerator::for_format(VinylFormat::Serato, 44100);
/// let (mut left, mut right) = (vec![0.0; 512], vec![0.0; 512]);
///
/// for _ in 0..50 {
///     generator.fill_blocks(&mut left, &mut right);
///     decoder.analyze(&left, &right).unwrap();
/// }
/// let speed = decoder.speed().unwrap();
/// assert!((speed - 1.0).abs() < 0.02);
/// ```
#[derive(Debug)]
pub struct TimecodeDecoder {
    format: VinylFormat,
    rpm: Rpm,
    sample_rate: u32,
    input_gain: f32,
    window: SampleWindow,
    dc: [DcTracker; 2],
    /// Centered copy of the window, rebuilt every pass
    conditioned: [Vec<f32>; 2],
    crossings: [Vec<CrossingEvent>; 2],
    estimator: SpeedEstimator,
    gate: MotionGate,
    position: PositionTracker,
    /// De-interleaving buffers for [`Self::analyze_interleaved`]
    deinterleaved: [Vec<f32>; 2],
}

impl TimecodeDecoder {
    /// Create a decoder for a format at 33 rpm
    ///
    /// Amplitude thresholds and the reverse flag start at the format defaults.
    ///
    /// # Errors
    /// [`DecoderError::InvalidParameter`] for a sample rate outside
    /// [`MIN_SAMPLE_RATE`]..=[`MAX_SAMPLE_RATE`].
    pub fn new(format: VinylFormat, sample_rate: u32) -> Result<Self> {
        validate_sample_rate(sample_rate)?;

        let rpm = Rpm::default();
        let carrier_hz = format.reference_frequency_hz(rpm);
        let mut estimator = SpeedEstimator::new(sample_rate, carrier_hz);
        estimator.set_reverse_direction(format.reversed_channels());
        let thresholds = GateThresholds::default();
        estimator.set_disagreement_tolerance(thresholds.channel_disagreement_tolerance);

        let mut position = PositionTracker::new(carrier_hz, format.default_min_amplitude());
        position.set_reverse_direction(format.reversed_channels());

        let max_len = window_cap(estimator.reference_cycle_length());

        tracing::info!(
            format = %format,
            sample_rate,
            carrier_hz,
            "Timecode decoder created"
        );

        Ok(Self {
            format,
            rpm,
            sample_rate,
            input_gain: DEFAULT_INPUT_GAIN,
            window: SampleWindow::with_capacity(max_len),
            dc: [DcTracker::new(sample_rate), DcTracker::new(sample_rate)],
            conditioned: [Vec::with_capacity(max_len), Vec::with_capacity(max_len)],
            crossings: [Vec::new(), Vec::new()],
            estimator,
            gate: MotionGate::new(thresholds, format_amplitudes(format)),
            position,
            deinterleaved: [Vec::new(), Vec::new()],
        })
    }

    /// Create a decoder with every setting taken from a configuration
    ///
    /// # Errors
    /// The first setting that fails validation.
    pub fn from_config(config: &DecoderConfig) -> Result<Self> {
        let mut decoder = Self::new(config.format, config.sample_rate)?;
        decoder.set_rpm(config.rpm.as_u16())?;
        decoder.set_input_gain(config.input_gain)?;
        if let Some(min_amplitude) = config.min_amplitude {
            decoder.set_min_amplitude(min_amplitude)?;
        }
        if let Some(min_amplitude) = config.min_amplitude_for_normal_speed {
            decoder.set_min_amplitude_for_normal_speed(min_amplitude)?;
        }
        if let Some(reverse) = config.reverse_direction {
            decoder.set_reverse_direction(reverse);
        }
        decoder.set_thresholds(config.thresholds)?;
        Ok(decoder)
    }

    /// Analyze one block of both channels
    ///
    /// # Arguments
    /// * `samples_1` - Left channel block
    /// * `samples_2` - Right channel block, same length
    ///
    /// # Returns
    /// `true` when a new reading was accepted or the reading was just lost.
    /// A block whose louder channel stays under the minimum amplitude is a
    /// failed cycle on its own, whatever its length.
    ///
    /// # Errors
    /// [`DecoderError::InvalidInput`] for empty or mismatched blocks. The
    /// decoder state is unchanged in that case.
    pub fn analyze(&mut self, samples_1: &[f32], samples_2: &[f32]) -> Result<bool> {
        if samples_1.is_empty() && samples_2.is_empty() {
            return Err(DecoderError::InvalidInput("empty block".to_string()));
        }
        let start = self.window.len();
        self.window.append(samples_1, samples_2)?;

        let (tail_1, tail_2) = self.window.tail_mut(start);
        apply_gain_and_clip(tail_1, self.input_gain);
        apply_gain_and_clip(tail_2, self.input_gain);

        self.condition_window();
        self.position
            .update(&self.conditioned[0][start..], &self.conditioned[1][start..]);

        let outcome = self.run_cycle(start);
        Ok(self.gate.observe(outcome))
    }

    /// Analyze a block of interleaved frames
    ///
    /// # Arguments
    /// * `frames` - Interleaved samples, `nb_channels` per frame
    /// * `nb_channels` - Channels per frame
    /// * `left_index` - Channel carrying timecode channel 1
    /// * `right_index` - Channel carrying timecode channel 2
    ///
    /// # Errors
    /// [`DecoderError::InvalidInput`] if the layout does not describe `frames`.
    pub fn analyze_interleaved(
        &mut self,
        frames: &[f32],
        nb_channels: usize,
        left_index: usize,
        right_index: usize,
    ) -> Result<bool> {
        if nb_channels == 0 || left_index >= nb_channels || right_index >= nb_channels {
            return Err(DecoderError::InvalidInput(format!(
                "channel indices {}/{} do not fit {} channels",
                left_index, right_index, nb_channels
            )));
        }
        if frames.len() % nb_channels != 0 {
            return Err(DecoderError::InvalidInput(format!(
                "{} samples are not a whole number of {}-channel frames",
                frames.len(),
                nb_channels
            )));
        }

        let [mut left, mut right] = std::mem::take(&mut self.deinterleaved);
        left.clear();
        right.clear();
        for frame in frames.chunks_exact(nb_channels) {
            left.push(frame[left_index]);
            right.push(frame[right_index]);
        }

        let result = self.analyze(&left, &right);
        self.deinterleaved = [left, right];
        result
    }

    /// Copy the window into the scratch buffers and remove the DC bias
    fn condition_window(&mut self) {
        let channels = [self.window.channel_1(), self.window.channel_2()];
        for ((buffer, raw), dc) in self.conditioned.iter_mut().zip(channels).zip(&self.dc) {
            buffer.clear();
            buffer.extend_from_slice(raw);
            center(buffer, dc.bias());
        }
    }

    /// One analysis pass over the window; `start` is where the new block begins
    fn run_cycle(&mut self, start: usize) -> CycleOutcome {
        let presence = presence_level(
            &self.conditioned[0][start..],
            &self.conditioned[1][start..],
        );
        if self.gate.is_silent(presence) {
            tracing::trace!(presence, "Silent block");
            self.window.clear();
            return CycleOutcome::NoSignal;
        }

        let last_1 = ZeroCrossExtractor::extract(&self.conditioned[0], &mut self.crossings[0]);
        let last_2 = ZeroCrossExtractor::extract(&self.conditioned[1], &mut self.crossings[1]);

        let mut consumed = 0;
        if let (Some(last_1), Some(last_2)) = (last_1, last_2) {
            consumed = last_1.min(last_2);
            let estimate = self
                .estimator
                .estimate(&self.crossings[0], &self.crossings[1], consumed);

            if let Some((candidate, _)) = estimate {
                let level = self.measure_from(0);
                if self.gate.is_noise(&level) {
                    tracing::trace!(peak = level.peak, "Window discarded as noise");
                    self.window.clear();
                    return CycleOutcome::NoSignal;
                }
                self.consume(consumed);
                return CycleOutcome::Candidate { candidate, level };
            }
            self.consume(consumed);
        }

        let nominal_cycle = 2.0 * self.estimator.reference_cycle_length();
        if self.window.len() as f64 >= nominal_cycle
            && self.gate.is_noise(&self.measure_from(consumed))
        {
            tracing::trace!(samples = self.window.len(), "No timecode in window");
            self.window.clear();
            return CycleOutcome::NoSignal;
        }

        let max_len = window_cap(self.estimator.reference_cycle_length());
        if self.window.len() > max_len {
            let excess = self.window.len() - max_len;
            self.dc[0].update(&self.window.channel_1()[..excess]);
            self.dc[1].update(&self.window.channel_2()[..excess]);
            let removed = self.window.trim_front_to(max_len);
            tracing::trace!(
                removed,
                bias_1 = self.dc[0].bias(),
                bias_2 = self.dc[1].bias(),
                "Window cap reached without a usable cycle"
            );
            return CycleOutcome::NoSignal;
        }

        CycleOutcome::Pending
    }

    /// Level of the conditioned window from `from` onwards
    fn measure_from(&self, from: usize) -> SignalLevel {
        let from = from.min(self.conditioned[0].len());
        SignalLevel::measure(
            &self.conditioned[0][from..],
            &self.conditioned[1][from..],
            self.format.full_scale_amplitude(),
        )
    }

    /// Drop the analyzed prefix and fold it into the DC estimates
    fn consume(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        let n = n.min(self.window.len());
        self.dc[0].update(&self.window.channel_1()[..n]);
        self.dc[1].update(&self.window.channel_2()[..n]);
        self.window.consume_prefix(n);
    }

    /// Signed speed ratio, `None` without a valid reading
    pub fn speed(&self) -> Option<f32> {
        self.gate.speed()
    }

    /// Volume in `[0, 1]`, `None` without a valid reading
    pub fn volume(&self) -> Option<f32> {
        self.gate.volume()
    }

    pub fn direction(&self) -> Option<Direction> {
        self.gate.direction()
    }

    pub fn state(&self) -> MotionState {
        self.gate.state()
    }

    /// Distance played since creation or the last position reset, in seconds
    /// of nominal-speed audio
    pub fn position_secs(&self) -> f64 {
        self.position.position_secs()
    }

    pub fn reset_position(&mut self) {
        self.position.reset_position();
    }

    /// Samples between two crossings at nominal speed
    pub fn reference_cycle_length(&self) -> f64 {
        self.estimator.reference_cycle_length()
    }

    /// Samples currently carried over to the next block
    pub fn pending_samples(&self) -> usize {
        self.window.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Change the sample rate; all analysis state is reset
    pub fn set_sample_rate(&mut self, sample_rate: u32) -> Result<()> {
        validate_sample_rate(sample_rate)?;
        self.sample_rate = sample_rate;
        self.dc = [DcTracker::new(sample_rate), DcTracker::new(sample_rate)];
        self.update_carrier();
        self.reset();
        tracing::info!(sample_rate, "Sample rate changed");
        Ok(())
    }

    pub fn rpm(&self) -> Rpm {
        self.rpm
    }

    /// Select 33 or 45 rpm; confirmation counters are reset
    ///
    /// # Errors
    /// [`DecoderError::InvalidParameter`] for any other value, keeping the
    /// current speed.
    pub fn set_rpm(&mut self, rpm: u16) -> Result<()> {
        let rpm = Rpm::try_from(rpm)?;
        if rpm == self.rpm {
            return Ok(());
        }
        self.rpm = rpm;
        self.update_carrier();
        self.gate.reset_counters();
        tracing::info!(rpm = %rpm, "Turntable speed changed");
        Ok(())
    }

    pub fn input_gain(&self) -> f32 {
        self.input_gain
    }

    /// Gain applied to incoming samples before clipping, at least 1
    pub fn set_input_gain(&mut self, gain: f32) -> Result<()> {
        if !(gain.is_finite() && gain >= 1.0) {
            return Err(DecoderError::parameter(
                "input_gain",
                format!("{} must be a finite value >= 1", gain),
            ));
        }
        self.input_gain = gain;
        Ok(())
    }

    pub fn min_amplitude(&self) -> f32 {
        self.gate.amplitude().min_amplitude
    }

    pub fn set_min_amplitude(&mut self, amplitude: f32) -> Result<()> {
        validate_amplitude("min_amplitude", amplitude)?;
        let mut thresholds = *self.gate.amplitude();
        thresholds.min_amplitude = amplitude;
        self.gate.set_amplitude(thresholds);
        self.position.set_min_amplitude(amplitude);
        Ok(())
    }

    pub fn min_amplitude_for_normal_speed(&self) -> f32 {
        self.gate.amplitude().min_amplitude_for_normal_speed
    }

    pub fn set_min_amplitude_for_normal_speed(&mut self, amplitude: f32) -> Result<()> {
        validate_amplitude("min_amplitude_for_normal_speed", amplitude)?;
        let mut thresholds = *self.gate.amplitude();
        thresholds.min_amplitude_for_normal_speed = amplitude;
        self.gate.set_amplitude(thresholds);
        Ok(())
    }

    pub fn reverse_direction(&self) -> bool {
        self.estimator.reverse_direction()
    }

    /// Invert the decoded direction, for swapped cabling
    pub fn set_reverse_direction(&mut self, reverse: bool) {
        self.estimator.set_reverse_direction(reverse);
        self.position.set_reverse_direction(reverse);
    }

    pub fn format(&self) -> VinylFormat {
        self.format
    }

    /// Switch record format
    ///
    /// Analysis state is reset; amplitude thresholds and the reverse flag
    /// return to the new format's defaults.
    pub fn set_format(&mut self, format: VinylFormat) {
        self.format = format;
        self.gate.set_amplitude(format_amplitudes(format));
        self.position.set_min_amplitude(format.default_min_amplitude());
        self.set_reverse_direction(format.reversed_channels());
        self.update_carrier();
        self.reset();
        tracing::info!(format = %format, "Vinyl format changed");
    }

    pub fn thresholds(&self) -> &GateThresholds {
        self.gate.thresholds()
    }

    /// Replace the gate limits after validating them
    pub fn set_thresholds(&mut self, thresholds: GateThresholds) -> Result<()> {
        thresholds.validate()?;
        self.estimator
            .set_disagreement_tolerance(thresholds.channel_disagreement_tolerance);
        self.gate.set_thresholds(thresholds);
        Ok(())
    }

    /// Drop the window, DC estimates, reading and position
    pub fn reset(&mut self) {
        self.window.clear();
        for dc in &mut self.dc {
            dc.reset();
        }
        for crossings in &mut self.crossings {
            crossings.clear();
        }
        self.gate.reset();
        self.position.reset();
    }

    fn update_carrier(&mut self) {
        let carrier_hz = self.format.reference_frequency_hz(self.rpm);
        self.estimator.set_carrier(self.sample_rate, carrier_hz);
        self.position.set_carrier(carrier_hz);
    }
}

fn format_amplitudes(format: VinylFormat) -> AmplitudeThresholds {
    AmplitudeThresholds {
        min_amplitude: format.default_min_amplitude(),
        min_amplitude_for_normal_speed: format.default_min_amplitude_for_normal_speed(),
    }
}

fn window_cap(reference_cycle_length: f64) -> usize {
    (MAX_SIN_WAV_AREA_FACTOR as f64 * reference_cycle_length).ceil() as usize
}

fn validate_sample_rate(sample_rate: u32) -> Result<()> {
    if sample_rate < MIN_SAMPLE_RATE {
        return Err(DecoderError::parameter(
            "sample_rate",
            format!("{} Hz is below the minimum of {} Hz", sample_rate, MIN_SAMPLE_RATE),
        ));
    }
    if sample_rate > MAX_SAMPLE_RATE {
        return Err(DecoderError::parameter(
            "sample_rate",
            format!("{} Hz is above the maximum of {} Hz", sample_rate, MAX_SAMPLE_RATE),
        ));
    }
    Ok(())
}

fn validate_amplitude(name: &'static str, amplitude: f32) -> Result<()> {
    if !(amplitude.is_finite() && amplitude >= 0.0) {
        return Err(DecoderError::parameter(
            name,
            format!("{} must be a finite value >= 0", amplitude),
        ));
    }
    Ok(())
}
