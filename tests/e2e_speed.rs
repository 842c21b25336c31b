//! E2E tests for speed decoding
//!
//! Drives the decoder with synthetic timecode at known speeds and checks
//! the reading converges, whatever the block size, level or DC offset.

use approx::assert_relative_eq;
use vinyldeck::{Direction, TimecodeDecoder, TimecodeGenerator, VinylFormat};

const SAMPLE_RATE: u32 = 44100;

/// Feed `seconds` of generated signal in blocks of `block` samples
fn run(
    decoder: &mut TimecodeDecoder,
    generator: &mut TimecodeGenerator,
    block: usize,
    seconds: f32,
) {
    let (mut left, mut right) = (vec![0.0; block], vec![0.0; block]);
    let blocks = (seconds * SAMPLE_RATE as f32 / block as f32).ceil() as usize;
    for _ in 0..blocks {
        generator.fill_blocks(&mut left, &mut right);
        decoder.analyze(&left, &right).unwrap();
    }
}

fn serato() -> (TimecodeDecoder, TimecodeGenerator) {
    (
        TimecodeDecoder::new(VinylFormat::Serato, SAMPLE_RATE).unwrap(),
        TimecodeGenerator::for_format(VinylFormat::Serato, SAMPLE_RATE),
    )
}

/// Nominal speed reads 1.0 for any block size
#[test]
fn test_block_size_independence() {
    for block in [1, 7, 64, 256, 1000, 4096] {
        let (mut decoder, mut generator) = serato();
        run(&mut decoder, &mut generator, block, 1.5);

        let speed = decoder
            .speed()
            .unwrap_or_else(|| panic!("No reading with block size {}", block));
        assert!(
            (speed - 1.0).abs() < 0.02,
            "Block size {} decoded speed {}",
            block,
            speed
        );
        assert_eq!(decoder.direction(), Some(Direction::Forward));
    }
}

#[test]
fn test_double_speed() {
    let (mut decoder, mut generator) = serato();
    generator.set_speed(2.0);
    run(&mut decoder, &mut generator, 512, 1.0);
    assert_relative_eq!(decoder.speed().unwrap(), 2.0, epsilon = 0.04);
}

#[test]
fn test_half_speed() {
    let (mut decoder, mut generator) = serato();
    generator.set_speed(0.5);
    run(&mut decoder, &mut generator, 512, 1.0);
    assert_relative_eq!(decoder.speed().unwrap(), 0.5, epsilon = 0.01);
}

#[test]
fn test_speed_change_is_followed() {
    let (mut decoder, mut generator) = serato();
    run(&mut decoder, &mut generator, 512, 0.5);
    generator.set_speed(1.5);
    run(&mut decoder, &mut generator, 512, 0.5);
    assert_relative_eq!(decoder.speed().unwrap(), 1.5, epsilon = 0.03);
}

#[test]
fn test_dc_offset_is_removed() {
    let (mut decoder, mut generator) = serato();
    generator.set_dc_offset(0.1);
    run(&mut decoder, &mut generator, 512, 2.0);
    assert_relative_eq!(decoder.speed().unwrap(), 1.0, epsilon = 0.02);
}

/// An offset larger than the carrier amplitude still decodes
#[test]
fn test_dc_offset_above_amplitude() {
    let (mut decoder, mut generator) = serato();
    generator.set_amplitude(0.35);
    generator.set_dc_offset(0.5);
    run(&mut decoder, &mut generator, 512, 2.5);
    assert_relative_eq!(decoder.speed().unwrap(), 1.0, epsilon = 0.02);
    assert_eq!(decoder.direction(), Some(Direction::Forward));
}

#[test]
fn test_45_rpm() {
    let (mut decoder, mut generator) = serato();
    decoder.set_rpm(45).unwrap();
    generator.set_carrier_hz(1350.0);
    run(&mut decoder, &mut generator, 512, 1.0);
    assert_relative_eq!(decoder.speed().unwrap(), 1.0, epsilon = 0.02);
}

/// Every format decodes its own record forward, including reversed wiring
#[test]
fn test_every_format() {
    for &format in VinylFormat::all() {
        let mut decoder = TimecodeDecoder::new(format, SAMPLE_RATE).unwrap();
        let mut generator = TimecodeGenerator::for_format(format, SAMPLE_RATE);
        run(&mut decoder, &mut generator, 512, 1.0);

        assert_relative_eq!(decoder.speed().unwrap(), 1.0, epsilon = 0.02);
        assert_eq!(
            decoder.direction(),
            Some(Direction::Forward),
            "{} should decode forward",
            format
        );
        assert_relative_eq!(decoder.volume().unwrap(), 1.0, epsilon = 0.02);
    }
}

#[test]
fn test_other_sample_rate() {
    let mut decoder = TimecodeDecoder::new(VinylFormat::Serato, 48000).unwrap();
    let mut generator = TimecodeGenerator::for_format(VinylFormat::Serato, 48000);
    let (mut left, mut right) = (vec![0.0; 480], vec![0.0; 480]);
    for _ in 0..100 {
        generator.fill_blocks(&mut left, &mut right);
        decoder.analyze(&left, &right).unwrap();
    }
    assert_relative_eq!(decoder.speed().unwrap(), 1.0, epsilon = 0.02);
}

/// A quiet record is unreadable until the input gain lifts it
#[test]
fn test_input_gain_lifts_quiet_signal() {
    let (mut decoder, mut generator) = serato();
    generator.set_amplitude(0.03);
    run(&mut decoder, &mut generator, 512, 0.5);
    assert_eq!(decoder.speed(), None);

    decoder.set_input_gain(8.0).unwrap();
    run(&mut decoder, &mut generator, 512, 0.5);
    assert_relative_eq!(decoder.speed().unwrap(), 1.0, epsilon = 0.02);
    assert_relative_eq!(decoder.volume().unwrap(), 0.48, epsilon = 0.02);
}

#[test]
fn test_volume_follows_level() {
    let (mut decoder, mut generator) = serato();
    generator.set_amplitude(0.25);
    run(&mut decoder, &mut generator, 512, 0.5);
    assert_relative_eq!(decoder.volume().unwrap(), 0.5, epsilon = 0.02);
}

#[test]
fn test_position_tracks_playback() {
    let (mut decoder, mut generator) = serato();
    generator.set_speed(2.0);
    run(&mut decoder, &mut generator, 441, 1.0);
    assert_relative_eq!(decoder.position_secs(), 2.0, epsilon = 0.01);
}
