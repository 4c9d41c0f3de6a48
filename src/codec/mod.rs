//! # Bitstream Preprocessors
//!
//! Per-codec fixups applied to payloads before PES packetization: H.264
//! access-unit delimiter insertion, HEVC start-code verification, AAC ADTS
//! wrapping, and Opus control-header framing. Each preprocessor surfaces its
//! error immediately; none of them re-encodes.

/// AAC AudioSpecificConfig parsing and ADTS framing
pub mod aac;
/// H.264 start-code checks and AUD/SPS insertion
pub mod h264;
/// HEVC start-code checks
pub mod hevc;
/// Opus control-header framing and channel mapping
pub mod opus;

pub use aac::AdtsContext;
