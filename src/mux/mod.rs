//! # Transport Stream Packetization Engine
//!
//! Everything between a submitted [`Packet`](crate::av::Packet) and the
//! 188-byte cells on the wire: the section writer, the SI table builders,
//! the PES packetizer with its PCR and stuffing discipline, the
//! retransmission scheduler, and the ISDB-Tb service topology.

use crate::av::{Packet, StreamInfo};
use crate::Result;

/// Bounded scratch buffer for table assembly
pub mod buffer;
/// TsMuxer and per-stream state
pub mod muxer;
/// PES packetization and rate control
pub mod pes;
/// SI table retransmission timers
pub mod scheduler;
/// PSI/SI section framing
pub mod section;
/// PAT/PMT/SDT/NIT/TOT/EIT builders
pub mod tables;
/// Service topology for the ISDB-Tb transmission profiles
pub mod topology;
/// Cell staging, byte position tracking and M2TS prefixing
pub mod wire;

pub use muxer::TsMuxer;

/// Size of a transport stream cell in bytes
pub const TS_PACKET_SIZE: usize = 188;
/// Maximum section length the section writer accepts (12-bit field, first
/// two bits zero)
pub const SECTION_LENGTH: usize = 1020;
/// 27 MHz system clock frequency
pub const PCR_TIME_BASE: i64 = 27_000_000;

/// PID carrying the Program Association Table
pub const PAT_PID: u16 = 0x0000;
/// PID carrying the Network Information Table
pub const NIT_PID: u16 = 0x0010;
/// PID carrying the Service Description Table
pub const SDT_PID: u16 = 0x0011;
/// PID carrying the Event Information Table
pub const EIT_PID: u16 = 0x0012;
/// PID carrying the Time Offset Table
pub const TOT_PID: u16 = 0x0014;
/// PID of null stuffing cells
pub const NULL_PID: u16 = 0x1FFF;

/// Table id of the PAT
pub const PAT_TID: u8 = 0x00;
/// Table id of the PMT
pub const PMT_TID: u8 = 0x02;
/// Table id of the NIT (actual network)
pub const NIT_TID: u8 = 0x40;
/// Table id of the SDT (actual transport stream)
pub const SDT_TID: u8 = 0x42;
/// Table id of the EIT (actual TS, present/following)
pub const EIT_TID: u8 = 0x4E;
/// Table id of the TOT
pub const TOT_TID: u8 = 0x73;

/// Common trait for muxers that package elementary streams into a container.
#[async_trait::async_trait]
pub trait Muxer: Send {
    /// Bind the elementary streams and set up services, PIDs and timers.
    async fn write_header(&mut self, streams: &[StreamInfo]) -> Result<()>;

    /// Submit one coded packet for packetization.
    async fn write_packet(&mut self, packet: &Packet) -> Result<()>;

    /// Flush every pending payload and finalize the output.
    async fn write_trailer(&mut self) -> Result<()>;

    /// Flush pending payloads without ending the mux.
    async fn flush(&mut self) -> Result<()>;
}
