//! Vinyldeck - timecoded vinyl decoder
//!
//! Command line front end: lists the supported records, runs a simulated
//! turntable through the decoder and identifies a record from its carrier.

use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};
use vinyldeck::{
    CarrierDetector, DecoderConfig, Direction, Rpm, TimecodeDecoder, TimecodeGenerator,
    VinylFormat, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE,
};

/// Samples per analysis block in simulations
const SIMULATION_BLOCK: usize = 512;

/// Relative carrier error accepted when identifying a record
const DETECT_TOLERANCE: f32 = 0.02;

#[derive(Error, Debug, PartialEq)]
enum CliError {
    #[error("{0} requires a value")]
    MissingValue(&'static str),

    #[error("Invalid value for {flag}: {value}")]
    InvalidValue { flag: &'static str, value: String },

    #[error("Unknown argument: {0}")]
    UnknownArgument(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Help,
    Version,
    ListFormats,
    Simulate,
    Detect,
}

#[derive(Debug, Clone, PartialEq)]
struct Options {
    mode: Mode,
    config: Option<PathBuf>,
    save_config: Option<PathBuf>,
    format: Option<VinylFormat>,
    rpm: Option<Rpm>,
    speed: f32,
    seconds: f32,
    json: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            mode: Mode::Help,
            config: None,
            save_config: None,
            format: None,
            rpm: None,
            speed: 1.0,
            seconds: 2.0,
            json: false,
        }
    }
}

/// One line of simulation output
#[derive(Debug, Serialize)]
struct Reading {
    time_secs: f32,
    speed: Option<f32>,
    volume: Option<f32>,
    direction: Option<Direction>,
    position_secs: f64,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vinyldeck=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            return Ok(());
        }
    };

    match options.mode {
        Mode::Help => print_help(),
        Mode::Version => println!("vinyldeck {} ({})", vinyldeck::VERSION, vinyldeck::BUILD_DATE),
        Mode::ListFormats => list_formats(),
        Mode::Simulate => simulate(&options)?,
        Mode::Detect => detect(&options)?,
    }
    Ok(())
}

fn parse_args(args: &[String]) -> Result<Options, CliError> {
    let mut options = Options::default();
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => options.mode = Mode::Help,
            "--version" | "-v" => options.mode = Mode::Version,
            "--list-formats" | "-l" => options.mode = Mode::ListFormats,
            "--simulate" | "-s" => options.mode = Mode::Simulate,
            "--detect" | "-d" => options.mode = Mode::Detect,
            "--json" => options.json = true,
            "--config" | "-c" => {
                options.config = Some(PathBuf::from(value(args, i, "--config")?));
                i += 1;
            }
            "--save-config" => {
                options.save_config = Some(PathBuf::from(value(args, i, "--save-config")?));
                i += 1;
            }
            "--format" | "-f" => {
                let raw = value(args, i, "--format")?;
                options.format = Some(raw.parse().map_err(|_| CliError::InvalidValue {
                    flag: "--format",
                    value: raw.to_string(),
                })?);
                i += 1;
            }
            "--rpm" | "-r" => {
                let raw = value(args, i, "--rpm")?;
                let rpm = raw
                    .parse::<u16>()
                    .ok()
                    .and_then(|n| Rpm::try_from(n).ok())
                    .ok_or_else(|| CliError::InvalidValue {
                        flag: "--rpm",
                        value: raw.to_string(),
                    })?;
                options.rpm = Some(rpm);
                i += 1;
            }
            "--speed" => {
                options.speed = number(args, i, "--speed")?;
                i += 1;
            }
            "--seconds" => {
                let seconds = number(args, i, "--seconds")?;
                if seconds <= 0.0 {
                    return Err(CliError::InvalidValue {
                        flag: "--seconds",
                        value: seconds.to_string(),
                    });
                }
                options.seconds = seconds;
                i += 1;
            }
            other => return Err(CliError::UnknownArgument(other.to_string())),
        }
        i += 1;
    }

    Ok(options)
}

fn value<'a>(args: &'a [String], i: usize, flag: &'static str) -> Result<&'a str, CliError> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or(CliError::MissingValue(flag))
}

fn number(args: &[String], i: usize, flag: &'static str) -> Result<f32, CliError> {
    let raw = value(args, i, flag)?;
    raw.parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| CliError::InvalidValue {
            flag,
            value: raw.to_string(),
        })
}

fn print_help() {
    println!("Usage: vinyldeck [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -l, --list-formats      List supported timecoded records");
    println!("  -s, --simulate          Decode a simulated turntable and print readings");
    println!("  -d, --detect            Identify the record of a simulated carrier");
    println!("  -f, --format NAME       Record format (serato, final_scratch, mixvibes)");
    println!("  -r, --rpm 33|45         Turntable speed");
    println!("      --speed RATIO       Simulated speed ratio, negative plays backwards");
    println!("      --seconds N         Simulated duration (default: 2)");
    println!("      --json              Print readings as JSON lines");
    println!("  -c, --config PATH       Load settings from PATH");
    println!("      --save-config PATH  Write the effective settings to PATH");
    println!("  -v, --version           Show version");
    println!("  -h, --help              Show this help");
    println!();
    println!("Examples:");
    println!("  vinyldeck --simulate --format serato --speed -0.5");
    println!("  vinyldeck --detect --format mixvibes --rpm 45");
}

fn list_formats() {
    println!("Supported formats:");
    println!();
    for &format in VinylFormat::all() {
        let wiring = if format.reversed_channels() {
            " [reversed channels]"
        } else {
            ""
        };
        println!("  {}{}", format, wiring);
        println!(
            "     Carrier: {} Hz @ 33, {} Hz @ 45",
            format.reference_frequency_hz(Rpm::Rpm33),
            format.reference_frequency_hz(Rpm::Rpm45)
        );
        println!(
            "     Min amplitude: {} (normal speed: {})",
            format.default_min_amplitude(),
            format.default_min_amplitude_for_normal_speed()
        );
        println!();
    }
}

/// Settings from the config file with command line overrides applied
fn effective_config(options: &Options) -> Result<DecoderConfig> {
    let mut config = match &options.config {
        Some(path) => DecoderConfig::load_from(path)?,
        None => DecoderConfig::load(),
    };
    if let Some(format) = options.format {
        config.format = format;
    }
    if let Some(rpm) = options.rpm {
        config.rpm = rpm;
    }
    if let Some(path) = &options.save_config {
        config.save(path)?;
    }
    Ok(config)
}

fn simulate(options: &Options) -> Result<()> {
    let config = effective_config(options)?;
    let mut decoder = TimecodeDecoder::from_config(&config)?;
    let mut generator = TimecodeGenerator::for_format(config.format, config.sample_rate);
    generator.set_carrier_hz(config.format.reference_frequency_hz(config.rpm));
    generator.set_speed(options.speed);

    info!(
        format = %config.format,
        rpm = %config.rpm,
        speed = options.speed,
        "Starting simulation"
    );

    let (mut left, mut right) = (vec![0.0; SIMULATION_BLOCK], vec![0.0; SIMULATION_BLOCK]);
    let total_blocks =
        (options.seconds * config.sample_rate as f32 / SIMULATION_BLOCK as f32).ceil() as usize;
    let report_every = (config.sample_rate as usize / 10 / SIMULATION_BLOCK).max(1);

    for block in 0..total_blocks {
        generator.fill_blocks(&mut left, &mut right);
        decoder.analyze(&left, &right)?;

        if (block + 1) % report_every != 0 {
            continue;
        }
        let reading = Reading {
            time_secs: ((block + 1) * SIMULATION_BLOCK) as f32 / config.sample_rate as f32,
            speed: decoder.speed(),
            volume: decoder.volume(),
            direction: decoder.direction(),
            position_secs: decoder.position_secs(),
        };
        if options.json {
            println!("{}", serde_json::to_string(&reading)?);
        } else {
            println!(
                "t={:>6.2}s | speed: {:>7} | volume: {:>5} | position: {:>7.3}s",
                reading.time_secs,
                fmt_option(reading.speed, 3),
                fmt_option(reading.volume, 2),
                reading.position_secs
            );
        }
    }
    Ok(())
}

fn detect(options: &Options) -> Result<()> {
    let config = effective_config(options)?;
    anyhow::ensure!(
        (MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&config.sample_rate),
        "Sample rate {} Hz is outside {}..={} Hz",
        config.sample_rate,
        MIN_SAMPLE_RATE,
        MAX_SAMPLE_RATE
    );
    let carrier_hz = config.format.reference_frequency_hz(config.rpm);
    let mut generator = TimecodeGenerator::new(config.sample_rate, carrier_hz);
    generator.set_speed(options.speed);

    let mut samples = vec![0.0; config.sample_rate as usize / 2];
    let mut unused = vec![0.0; samples.len()];
    generator.fill_blocks(&mut samples, &mut unused);

    let mut detector = CarrierDetector::new(config.sample_rate);
    match detector.estimate(&samples) {
        Some(frequency) => {
            println!("Carrier: {:.1} Hz", frequency);
            match detector.identify(&samples, DETECT_TOLERANCE) {
                Some((format, rpm)) => println!("Record: {} at {}", format, rpm),
                None => println!("Record: unknown"),
            }
        }
        None => {
            error!("No carrier found");
            println!("No carrier found");
        }
    }
    Ok(())
}

fn fmt_option(value: Option<f32>, decimals: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", decimals, v),
        None => "-".to_string(),
    }
}
