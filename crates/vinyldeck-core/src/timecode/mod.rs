//! Timecode analysis module
//!
//! Leaves first:
//! - Phase unwrapping and record position ([`phase`])
//! - Sample window carried between blocks ([`window`])
//! - Gain, amplitude and DC bias ([`conditioner`])
//! - Zero-crossing extraction ([`crossing`])
//! - Speed and direction candidates ([`estimator`])
//! - Validity gate, transient suppression and smoothing ([`gate`])
//! - Record format profiles ([`format`])
//! - The decoding engine ([`decoder`])
//! - Test signal generation ([`signal`]) and carrier identification ([`spectrum`])

pub mod conditioner;
pub mod crossing;
pub mod decoder;
pub mod estimator;
pub mod format;
pub mod gate;
pub mod phase;
pub mod signal;
pub mod spectrum;
pub mod window;
