#![doc(html_root_url = "https://docs.rs/isdbt-mux/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! # isdbt-mux - ISDB-Tb MPEG Transport Stream Muxer
//!
//! `isdbt-mux` packetizes elementary streams (H.264/HEVC video, MPEG/AAC/
//! AC-3/Opus audio, DVB subtitles, KLV data) into an MPEG-2 Transport Stream
//! shaped for the Brazilian ISDB-Tb (SBTVD) broadcast profile, with DVB
//! System B signaling and Blu-ray M2TS output as options.
//!
//! ## Features
//!
//! - PES packetization with PCR discipline, random-access signaling and
//!   constant-bitrate null stuffing
//! - Full SI generation: PAT, PMT, SDT, NIT, TOT and EIT with the ISDB-Tb
//!   descriptor set (TS information, partial reception, terrestrial
//!   delivery system)
//! - One-seg / full-seg service topologies with computed service ids
//! - Codec preprocessors: H.264 AUD insertion, AAC ADTS wrapping, Opus
//!   control-header framing
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use isdbt_mux::av::{CodecId, Packet, StreamInfo};
//! use isdbt_mux::{MuxConfig, Muxer, TsMuxer};
//! use tokio::fs::File;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let file = File::create("output.ts").await?;
//!     let mut muxer = TsMuxer::new(file, MuxConfig::default());
//!
//!     let streams = vec![
//!         StreamInfo::new(CodecId::H264),
//!         StreamInfo::new(CodecId::Aac).with_language("por"),
//!     ];
//!     muxer.write_header(&streams).await?;
//!
//!     // feed coded frames...
//!     let frame = vec![0x00, 0x00, 0x00, 0x01, 0x65];
//!     let packet = Packet::new(frame)
//!         .with_stream_index(0)
//!         .with_pts(0)
//!         .with_key_flag(true);
//!     muxer.write_packet(&packet).await?;
//!
//!     muxer.write_trailer().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - `av`: elementary stream descriptions and packets
//! - `codec`: per-codec bitstream preprocessors
//! - `config`: the plain configuration record and ISDB-Tb profile enums
//! - `mux`: the packetization engine, SI builders and scheduler
//! - `error`: error types
//! - `utils`: CRC32 and timestamp rescaling

/// Elementary stream types and packets
pub mod av;

/// Codec bitstream preprocessors
pub mod codec;

/// Muxer configuration
pub mod config;

/// Error types and utilities
pub mod error;

/// Transport stream packetization engine
pub mod mux;

/// Common utilities and helper functions
pub mod utils;

pub use config::{
    GuardInterval, M2tsMode, MuxConfig, MuxFlags, ServiceType, TransmissionMode,
    TransmissionProfile,
};
pub use error::{MuxError, Result};
pub use mux::{Muxer, TsMuxer};
