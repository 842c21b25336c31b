//! Timecoded vinyl formats and turntable speeds
//!
//! Every supported record is described by a constant table: the carrier
//! frequency pressed on the record at each rotational speed, the default
//! amplitude thresholds, the peak level expected at nominal speed and whether
//! the stereo channels are wired the other way round.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DecoderError;

/// Turntable rotational speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Rpm {
    /// 33⅓ revolutions per minute
    #[default]
    Rpm33,
    /// 45 revolutions per minute
    Rpm45,
}

impl Rpm {
    /// Nominal value as written on the turntable selector
    pub fn as_u16(self) -> u16 {
        match self {
            Self::Rpm33 => 33,
            Self::Rpm45 => 45,
        }
    }

    /// All supported speeds
    pub fn all() -> &'static [Self] {
        &[Self::Rpm33, Self::Rpm45]
    }
}

impl TryFrom<u16> for Rpm {
    type Error = DecoderError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            33 => Ok(Self::Rpm33),
            45 => Ok(Self::Rpm45),
            other => Err(DecoderError::parameter(
                "rpm",
                format!("{} is not supported (expected 33 or 45)", other),
            )),
        }
    }
}

impl From<Rpm> for u16 {
    fn from(rpm: Rpm) -> Self {
        rpm.as_u16()
    }
}

impl fmt::Display for Rpm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} rpm", self.as_u16())
    }
}

/// Supported timecoded vinyl records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VinylFormat {
    /// Serato Control Vinyl
    #[default]
    Serato,
    /// Final Scratch Standard 2.0
    FinalScratch,
    /// Mixvibes DVS (channels wired in reverse)
    Mixvibes,
}

struct Profile {
    name: &'static str,
    carrier_hz_33: f32,
    carrier_hz_45: f32,
    min_amplitude: f32,
    min_amplitude_for_normal_speed: f32,
    full_scale_amplitude: f32,
    reversed_channels: bool,
}

const SERATO: Profile = Profile {
    name: "serato",
    carrier_hz_33: 1000.0,
    carrier_hz_45: 1350.0,
    min_amplitude: 0.05,
    min_amplitude_for_normal_speed: 0.10,
    full_scale_amplitude: 0.5,
    reversed_channels: false,
};

const FINAL_SCRATCH: Profile = Profile {
    name: "final_scratch",
    carrier_hz_33: 1200.0,
    carrier_hz_45: 1620.0,
    min_amplitude: 0.06,
    min_amplitude_for_normal_speed: 0.12,
    full_scale_amplitude: 0.6,
    reversed_channels: false,
};

const MIXVIBES: Profile = Profile {
    name: "mixvibes",
    carrier_hz_33: 1300.0,
    carrier_hz_45: 1755.0,
    min_amplitude: 0.04,
    min_amplitude_for_normal_speed: 0.08,
    full_scale_amplitude: 0.4,
    reversed_channels: true,
};

impl VinylFormat {
    fn profile(self) -> &'static Profile {
        match self {
            Self::Serato => &SERATO,
            Self::FinalScratch => &FINAL_SCRATCH,
            Self::Mixvibes => &MIXVIBES,
        }
    }

    /// All supported formats
    pub fn all() -> &'static [Self] {
        &[Self::Serato, Self::FinalScratch, Self::Mixvibes]
    }

    /// Short identifier, also accepted by [`FromStr`]
    pub fn name(self) -> &'static str {
        self.profile().name
    }

    /// Carrier frequency pressed on the record at the given speed
    pub fn reference_frequency_hz(self, rpm: Rpm) -> f32 {
        let profile = self.profile();
        match rpm {
            Rpm::Rpm33 => profile.carrier_hz_33,
            Rpm::Rpm45 => profile.carrier_hz_45,
        }
    }

    /// Amplitude under which the signal is considered noise
    pub fn default_min_amplitude(self) -> f32 {
        self.profile().min_amplitude
    }

    /// Amplitude under which only slow motion is trusted
    pub fn default_min_amplitude_for_normal_speed(self) -> f32 {
        self.profile().min_amplitude_for_normal_speed
    }

    /// Peak amplitude expected when the record plays at nominal speed
    pub fn full_scale_amplitude(self) -> f32 {
        self.profile().full_scale_amplitude
    }

    /// Whether left and right are swapped relative to the forward convention
    pub fn reversed_channels(self) -> bool {
        self.profile().reversed_channels
    }

    /// Map a measured carrier frequency to the closest format and speed
    ///
    /// The measurement is assumed to come from a record playing at nominal
    /// speed. Returns `None` when no carrier lies within `tolerance`
    /// (relative, e.g. `0.02` for 2%).
    pub fn identify(frequency_hz: f32, tolerance: f32) -> Option<(Self, Rpm)> {
        Self::all()
            .iter()
            .flat_map(|&format| Rpm::all().iter().map(move |&rpm| (format, rpm)))
            .map(|(format, rpm)| {
                let reference = format.reference_frequency_hz(rpm);
                let error = (frequency_hz - reference).abs() / reference;
                (format, rpm, error)
            })
            .filter(|&(_, _, error)| error <= tolerance)
            .min_by(|a, b| a.2.total_cmp(&b.2))
            .map(|(format, rpm, _)| (format, rpm))
    }
}

impl fmt::Display for VinylFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VinylFormat {
    type Err = DecoderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "serato" => Ok(Self::Serato),
            "final_scratch" | "finalscratch" => Ok(Self::FinalScratch),
            "mixvibes" => Ok(Self::Mixvibes),
            _ => Err(DecoderError::parameter(
                "format",
                format!("unknown vinyl format '{}'", s),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpm_parsing() {
        assert_eq!(Rpm::try_from(33).unwrap(), Rpm::Rpm33);
        assert_eq!(Rpm::try_from(45).unwrap(), Rpm::Rpm45);
        assert!(matches!(
            Rpm::try_from(78),
            Err(DecoderError::InvalidParameter { name: "rpm", .. })
        ));
    }

    #[test]
    fn test_45_rpm_is_faster_carrier() {
        for &format in VinylFormat::all() {
            assert!(
                format.reference_frequency_hz(Rpm::Rpm45)
                    > format.reference_frequency_hz(Rpm::Rpm33)
            );
        }
    }

    #[test]
    fn test_only_mixvibes_is_reversed() {
        assert!(!VinylFormat::Serato.reversed_channels());
        assert!(!VinylFormat::FinalScratch.reversed_channels());
        assert!(VinylFormat::Mixvibes.reversed_channels());
    }

    #[test]
    fn test_thresholds_are_ordered() {
        for &format in VinylFormat::all() {
            assert!(format.default_min_amplitude() >= 0.0);
            assert!(format.default_min_amplitude() < format.default_min_amplitude_for_normal_speed());
        }
    }

    #[test]
    fn test_name_round_trip() {
        for &format in VinylFormat::all() {
            assert_eq!(format.name().parse::<VinylFormat>().unwrap(), format);
        }
        assert_eq!(
            "Final Scratch".parse::<VinylFormat>().unwrap(),
            VinylFormat::FinalScratch
        );
        assert!("traktor".parse::<VinylFormat>().is_err());
    }

    #[test]
    fn test_identify() {
        assert_eq!(
            VinylFormat::identify(1003.0, 0.02),
            Some((VinylFormat::Serato, Rpm::Rpm33))
        );
        assert_eq!(
            VinylFormat::identify(1750.0, 0.02),
            Some((VinylFormat::Mixvibes, Rpm::Rpm45))
        );
        assert_eq!(VinylFormat::identify(440.0, 0.02), None);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&VinylFormat::FinalScratch).unwrap();
        assert_eq!(json, "\"final_scratch\"");
        let rpm: Rpm = serde_json::from_str("45").unwrap();
        assert_eq!(rpm, Rpm::Rpm45);
        assert!(serde_json::from_str::<Rpm>("78").is_err());
    }
}
