//! # Muxer Configuration
//!
//! A plain configuration record populated by the caller. Every field has a
//! default; the ISDB-Tb transmission parameters (area code, guard interval,
//! transmission mode, physical/virtual channel) only matter for the NIT and
//! the service topology.

use chrono::{DateTime, Utc};
use std::ops::BitOr;

/// Default minimum PES payload: 15 full TS cell payloads plus a partial one.
pub const DEFAULT_PES_PAYLOAD_SIZE: usize = (16 - 1) * 184 + 170;

/// Retransmission times in milliseconds, used to derive packet periods from
/// the mux rate in CBR mode.
pub const PAT_RETRANS_TIME: i64 = 100;
/// SDT retransmission time in milliseconds
pub const SDT_RETRANS_TIME: i64 = 500;
/// NIT retransmission time in milliseconds. The Brazilian standard asks for
/// the NIT every 10 s; this keeps it well within bounds.
pub const NIT_RETRANS_TIME: i64 = 50;
/// TOT retransmission time in milliseconds
pub const TOT_RETRANS_TIME: i64 = 100;
/// EIT retransmission time in milliseconds
pub const EIT_RETRANS_TIME: i64 = 500;
/// PCR retransmission time in milliseconds
pub const PCR_RETRANS_TIME: i64 = 20;

/// Muxing behavior flags.
///
/// Combined with `|`; tested with [`MuxFlags::contains`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MuxFlags(u32);

impl MuxFlags {
    /// Re-emit every SI table before the next packet is written
    pub const REEMIT_PAT_PMT: MuxFlags = MuxFlags(0x01);
    /// Signal AAC with LATM/LOAS framing (PMT stream_type 0x11)
    pub const AAC_LATM: MuxFlags = MuxFlags(0x02);
    /// Re-emit PAT and PMT at every video frame
    pub const PAT_PMT_AT_FRAMES: MuxFlags = MuxFlags(0x04);
    /// Conform to DVB System B (AC-3/E-AC-3 as private data with DVB
    /// descriptors) instead of System A
    pub const SYSTEM_B: MuxFlags = MuxFlags(0x08);

    /// Returns true when every flag in `other` is set.
    pub fn contains(self, other: MuxFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Sets the flags in `other`.
    pub fn insert(&mut self, other: MuxFlags) {
        self.0 |= other.0;
    }

    /// Clears the flags in `other`.
    pub fn remove(&mut self, other: MuxFlags) {
        self.0 &= !other.0;
    }
}

impl BitOr for MuxFlags {
    type Output = MuxFlags;

    fn bitor(self, rhs: MuxFlags) -> MuxFlags {
        MuxFlags(self.0 | rhs.0)
    }
}

/// DVB service types as defined in ETSI EN 300 468, plus the ARIB one-seg
/// service type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceType {
    /// Digital television service
    DigitalTv,
    /// Digital radio service
    DigitalRadio,
    /// Teletext service
    Teletext,
    /// Advanced codec digital radio
    AdvancedCodecDigitalRadio,
    /// MPEG-2 HD digital television
    Mpeg2DigitalHdtv,
    /// Advanced codec SD digital television
    AdvancedCodecDigitalSdtv,
    /// Advanced codec HD digital television
    AdvancedCodecDigitalHdtv,
    /// ISDB one-seg partial-reception service
    OneSeg,
}

impl ServiceType {
    /// Wire value of the service type.
    pub fn code(self) -> u8 {
        match self {
            ServiceType::DigitalTv => 0x01,
            ServiceType::DigitalRadio => 0x02,
            ServiceType::Teletext => 0x03,
            ServiceType::AdvancedCodecDigitalRadio => 0x0A,
            ServiceType::Mpeg2DigitalHdtv => 0x11,
            ServiceType::AdvancedCodecDigitalSdtv => 0x16,
            ServiceType::AdvancedCodecDigitalHdtv => 0x19,
            ServiceType::OneSeg => 0xC0,
        }
    }
}

/// ISDB-Tb multiplex layouts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransmissionProfile {
    /// A single service carrying the configured service id
    #[default]
    Single,
    /// One full-seg HD service plus a one-seg service (profile 1)
    FullSegOneSeg,
    /// Four SD services plus a one-seg service (profile 2)
    FourSdOneSeg,
    /// Two HD services plus a one-seg service (profile 3)
    TwoHdOneSeg,
}

/// OFDM guard interval fractions signaled in the terrestrial delivery
/// system descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GuardInterval {
    /// 1/32 of the symbol length
    #[default]
    G1_32,
    /// 1/16 of the symbol length
    G1_16,
    /// 1/8 of the symbol length
    G1_8,
    /// 1/4 of the symbol length
    G1_4,
}

impl GuardInterval {
    /// 2-bit wire value.
    pub fn code(self) -> u16 {
        match self {
            GuardInterval::G1_32 => 0,
            GuardInterval::G1_16 => 1,
            GuardInterval::G1_8 => 2,
            GuardInterval::G1_4 => 3,
        }
    }
}

/// ISDB-T transmission modes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransmissionMode {
    /// Mode 1 (2k carriers)
    #[default]
    Mode1,
    /// Mode 2 (4k carriers)
    Mode2,
    /// Mode 3 (8k carriers)
    Mode3,
    /// Mode not signaled
    Undefined,
}

impl TransmissionMode {
    /// 2-bit wire value.
    pub fn code(self) -> u16 {
        match self {
            TransmissionMode::Mode1 => 0,
            TransmissionMode::Mode2 => 1,
            TransmissionMode::Mode3 => 2,
            TransmissionMode::Undefined => 3,
        }
    }
}

/// Blu-ray M2TS cell prefixing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum M2tsMode {
    /// Enable when [`MuxConfig::output_name`] ends in `.m2ts`
    #[default]
    Auto,
    /// Plain 188-byte cells
    Off,
    /// Prefix every cell with a 4-byte arrival timestamp
    On,
}

/// Complete muxer configuration.
#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// transport_stream_id written in the PAT and SDT
    pub transport_stream_id: u16,
    /// original_network_id written in the SDT and NIT
    pub original_network_id: u16,
    /// Service id used by the [`TransmissionProfile::Single`] topology
    pub service_id: u16,
    /// Service type reported in the SDT for full-seg services
    pub service_type: ServiceType,
    /// First PMT PID; service `n` gets `pmt_start_pid + n`
    pub pmt_start_pid: u16,
    /// First elementary PID for automatic assignment
    pub start_pid: u16,
    /// Mux rate in bytes per second; the sentinel value 1 selects VBR
    pub mux_rate: i64,
    /// Minimum PES payload size in bytes for buffered audio
    pub pes_payload_size: usize,
    /// PCR retransmission period in milliseconds (CBR)
    pub pcr_period_ms: i64,
    /// PAT/PMT retransmission period in seconds; disables packet-count
    /// scheduling when set
    pub pat_period_s: Option<f64>,
    /// SDT retransmission period in seconds
    pub sdt_period_s: Option<f64>,
    /// NIT retransmission period in seconds
    pub nit_period_s: Option<f64>,
    /// TOT retransmission period in seconds
    pub tot_period_s: Option<f64>,
    /// EIT retransmission period in seconds
    pub eit_period_s: Option<f64>,
    /// Blu-ray M2TS cell prefixing
    pub m2ts_mode: M2tsMode,
    /// Output name consulted when `m2ts_mode` is [`M2tsMode::Auto`]
    pub output_name: Option<String>,
    /// Keep caller timestamps instead of shifting them by the mux delay
    pub copyts: bool,
    /// Version number written in every versioned table (0..=31)
    pub tables_version: u8,
    /// Write PES_packet_length 0 for video packets
    pub omit_video_pes_length: bool,
    /// Muxing delay in microseconds; bounds stream interleaving and the
    /// CBR PCR-to-DTS distance
    pub max_delay_us: i64,
    /// Behavior flags
    pub flags: MuxFlags,
    /// Provider name written in the SDT service descriptor
    pub provider_name: String,
    /// Service name used by the single-service topology
    pub service_name: String,
    /// Network name written in the NIT
    pub network_name: String,
    /// 3-letter country code for the parental rating and local time offset
    /// descriptors
    pub country_code: String,
    /// Parental rating byte written in PMT and EIT
    pub parental_rating: u8,
    /// Event name announced in the EIT short event descriptor
    pub event_name: String,
    /// Event text announced in the EIT short event descriptor
    pub event_text: String,
    /// Announced event duration as (hours, minutes, seconds)
    pub event_duration: (u8, u8, u8),
    /// Current UTC time for the TOT and EIT start time; `None` falls back to
    /// a fixed epoch
    pub utc_time: Option<DateTime<Utc>>,
    /// UTC time of the next local-time-offset change; `None` falls back to a
    /// fixed epoch
    pub time_of_change: Option<DateTime<Utc>>,
    /// Country region id in the local time offset descriptor
    pub local_time_offset_region: u8,
    /// Local time offset polarity (true = behind UTC)
    pub local_time_offset_polarity: bool,
    /// Local time offset in BCD minutes
    pub local_time_offset: u16,
    /// Local time offset after the next change, in BCD minutes
    pub next_time_offset: u16,
    /// ISDB-Tb multiplex layout
    pub transmission_profile: TransmissionProfile,
    /// Area code signaled in the terrestrial delivery system descriptor
    pub area_code: u16,
    /// OFDM guard interval
    pub guard_interval: GuardInterval,
    /// ISDB-T transmission mode
    pub transmission_mode: TransmissionMode,
    /// UHF physical channel number (14..=69)
    pub physical_channel: u16,
    /// Remote control key id signaled in the TS information descriptor
    pub virtual_channel: u8,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            transport_stream_id: 1,
            original_network_id: 1,
            service_id: 1,
            service_type: ServiceType::DigitalTv,
            pmt_start_pid: 0x1000,
            start_pid: 0x0100,
            mux_rate: 1,
            pes_payload_size: DEFAULT_PES_PAYLOAD_SIZE,
            pcr_period_ms: PCR_RETRANS_TIME,
            pat_period_s: None,
            sdt_period_s: None,
            nit_period_s: None,
            tot_period_s: None,
            eit_period_s: None,
            m2ts_mode: M2tsMode::Auto,
            output_name: None,
            copyts: false,
            tables_version: 0,
            omit_video_pes_length: true,
            max_delay_us: 700_000,
            flags: MuxFlags::default(),
            provider_name: "isdbt-mux".to_string(),
            service_name: "Service01".to_string(),
            network_name: "LaPSI TV - UFRGS".to_string(),
            country_code: "BRA".to_string(),
            parental_rating: 0x01,
            event_name: "LaPSI".to_string(),
            event_text: "N".to_string(),
            event_duration: (10, 20, 30),
            utc_time: None,
            time_of_change: None,
            local_time_offset_region: 0x03,
            local_time_offset_polarity: false,
            local_time_offset: 0x0000,
            next_time_offset: 0x0100,
            transmission_profile: TransmissionProfile::Single,
            area_code: 1,
            guard_interval: GuardInterval::default(),
            transmission_mode: TransmissionMode::default(),
            physical_channel: 20,
            virtual_channel: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pes_payload_size() {
        assert_eq!(DEFAULT_PES_PAYLOAD_SIZE, 2930);
    }

    #[test]
    fn test_flags() {
        let mut flags = MuxFlags::AAC_LATM | MuxFlags::SYSTEM_B;
        assert!(flags.contains(MuxFlags::AAC_LATM));
        assert!(flags.contains(MuxFlags::SYSTEM_B));
        assert!(!flags.contains(MuxFlags::PAT_PMT_AT_FRAMES));
        flags.remove(MuxFlags::SYSTEM_B);
        assert!(!flags.contains(MuxFlags::SYSTEM_B));
        flags.insert(MuxFlags::REEMIT_PAT_PMT);
        assert!(flags.contains(MuxFlags::REEMIT_PAT_PMT));
    }

    #[test]
    fn test_service_type_codes() {
        assert_eq!(ServiceType::DigitalTv.code(), 0x01);
        assert_eq!(ServiceType::OneSeg.code(), 0xC0);
    }
}
