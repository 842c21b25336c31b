//! Vinyldeck Core - Timecoded vinyl decoding
//!
//! Recovers playback speed, rotation direction and volume from the
//! two-channel carrier a timecoded record produces, block by block, for a
//! playback engine that follows the turntable.

pub mod config;
pub mod error;
pub mod timecode;

pub use config::DecoderConfig;
pub use error::{DecoderError, Result};
pub use timecode::decoder::TimecodeDecoder;
pub use timecode::estimator::Direction;
pub use timecode::format::{Rpm, VinylFormat};
pub use timecode::gate::{
    GateThresholds, MotionState, DIRECTION_UNCERTAIN_WARNING, MAX_NO_NEW_SPEED_FOUND,
    SPEED_FOR_VOLUME_CUT,
};
pub use timecode::signal::TimecodeGenerator;
pub use timecode::spectrum::{estimate_carrier_hz, CarrierDetector};

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (UTC), set by build.rs
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Default sample rate for decoding
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Lowest sample rate accepted by the decoder
pub const MIN_SAMPLE_RATE: u32 = 8000;

/// Highest sample rate accepted by the decoder
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Input gain applied when none is configured
pub const DEFAULT_INPUT_GAIN: f32 = 1.0;

/// Window cap, in reference cycle lengths, before a window without a usable
/// cycle is trimmed
pub const MAX_SIN_WAV_AREA_FACTOR: usize = 100;
