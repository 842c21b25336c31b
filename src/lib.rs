//! Vinyldeck - timecoded vinyl decoder
//!
//! This library re-exports the decoding engine, record formats, test signal
//! generation and configuration from `vinyldeck-core`.

pub use vinyldeck_core::config;
pub use vinyldeck_core::error;
pub use vinyldeck_core::timecode;

pub use vinyldeck_core::{
    estimate_carrier_hz, CarrierDetector, DecoderConfig, DecoderError, Direction,
    GateThresholds, MotionState, Rpm, TimecodeDecoder, TimecodeGenerator, VinylFormat,
};
pub use vinyldeck_core::{
    BUILD_DATE, DEFAULT_INPUT_GAIN, DEFAULT_SAMPLE_RATE, DIRECTION_UNCERTAIN_WARNING,
    MAX_NO_NEW_SPEED_FOUND, MAX_SAMPLE_RATE, MAX_SIN_WAV_AREA_FACTOR, MIN_SAMPLE_RATE,
    SPEED_FOR_VOLUME_CUT, VERSION,
};
