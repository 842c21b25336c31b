//! Persistent decoder configuration
//!
//! Stores the record format, turntable speed, sample rate and tuning in a
//! JSON file at `<data_dir>/vinyldeck/config.json`. Amplitude thresholds and
//! the reverse flag are optional; when absent the format defaults apply.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::timecode::format::{Rpm, VinylFormat};
use crate::timecode::gate::GateThresholds;

fn default_sample_rate() -> u32 {
    crate::DEFAULT_SAMPLE_RATE
}

fn default_input_gain() -> f32 {
    crate::DEFAULT_INPUT_GAIN
}

/// Decoder settings as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Timecoded record in use
    #[serde(default)]
    pub format: VinylFormat,
    /// Turntable speed, 33 or 45
    #[serde(default)]
    pub rpm: Rpm,
    /// Sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Input gain, at least 1
    #[serde(default = "default_input_gain")]
    pub input_gain: f32,
    /// Noise threshold (None = format default)
    #[serde(default)]
    pub min_amplitude: Option<f32>,
    /// Weak-signal threshold (None = format default)
    #[serde(default)]
    pub min_amplitude_for_normal_speed: Option<f32>,
    /// Direction inversion (None = format wiring)
    #[serde(default)]
    pub reverse_direction: Option<bool>,
    #[serde(default)]
    pub thresholds: GateThresholds,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            format: VinylFormat::default(),
            rpm: Rpm::default(),
            sample_rate: default_sample_rate(),
            input_gain: default_input_gain(),
            min_amplitude: None,
            min_amplitude_for_normal_speed: None,
            reverse_direction: None,
            thresholds: GateThresholds::default(),
        }
    }
}

impl DecoderConfig {
    /// Config file path: `<data_dir>/vinyldeck/config.json`
    pub fn path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vinyldeck")
            .join("config.json")
    }

    /// Load config from the default path, falling back to defaults on any error
    pub fn load() -> Self {
        let path = Self::path();
        match Self::load_from(&path) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "Loaded config from disk");
                config
            }
            Err(e) if path.exists() => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read config, using defaults");
                Self::default()
            }
            Err(_) => {
                tracing::info!(path = %path.display(), "No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Load config from a specific file
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config = serde_json::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Save config to disk, creating parent directories if needed
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Config saved to disk");
        Ok(())
    }
}
