//! # Elementary Stream Types
//!
//! Descriptions of the elementary streams fed to the muxer and the packets
//! that carry their payloads. A [`StreamInfo`] is handed to the muxer once at
//! header time; [`Packet`]s reference a stream by index.

/// Codec identifiers for every elementary stream the muxer can carry.
///
/// The set mirrors the stream_type table of the PMT builder: anything not in
/// this list cannot be mapped onto a transport stream program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecId {
    /// MPEG-1 video
    Mpeg1Video,
    /// MPEG-2 video
    Mpeg2Video,
    /// MPEG-4 part 2 video
    Mpeg4Video,
    /// H.264/AVC video (annex-B bitstream expected)
    H264,
    /// H.265/HEVC video (annex-B bitstream expected)
    Hevc,
    /// Chinese AVS video
    Cavs,
    /// BBC Dirac video
    Dirac,
    /// SMPTE VC-1 video
    Vc1,
    /// MPEG-1 layer II audio
    Mp2,
    /// MPEG-1 layer III audio
    Mp3,
    /// AAC audio (raw frames or ADTS)
    Aac,
    /// AAC audio in LATM/LOAS framing
    AacLatm,
    /// Dolby AC-3 audio
    Ac3,
    /// Dolby Enhanced AC-3 audio
    Eac3,
    /// DTS audio
    Dts,
    /// Dolby TrueHD audio
    TrueHd,
    /// Opus audio
    Opus,
    /// SMPTE 302M audio
    S302m,
    /// SMPTE KLV metadata
    SmpteKlv,
    /// DVB bitmap subtitles
    DvbSubtitle,
    /// DVB teletext
    DvbTeletext,
}

impl CodecId {
    /// The broad media class this codec belongs to.
    pub fn media_type(self) -> MediaType {
        match self {
            CodecId::Mpeg1Video
            | CodecId::Mpeg2Video
            | CodecId::Mpeg4Video
            | CodecId::H264
            | CodecId::Hevc
            | CodecId::Cavs
            | CodecId::Dirac
            | CodecId::Vc1 => MediaType::Video,
            CodecId::Mp2
            | CodecId::Mp3
            | CodecId::Aac
            | CodecId::AacLatm
            | CodecId::Ac3
            | CodecId::Eac3
            | CodecId::Dts
            | CodecId::TrueHd
            | CodecId::Opus
            | CodecId::S302m => MediaType::Audio,
            CodecId::DvbSubtitle | CodecId::DvbTeletext => MediaType::Subtitle,
            CodecId::SmpteKlv => MediaType::Data,
        }
    }
}

/// Media class of an elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    /// Video streams
    Video,
    /// Audio streams
    Audio,
    /// Subtitle streams (DVB subtitles, teletext)
    Subtitle,
    /// Data streams (KLV metadata)
    Data,
}

/// A rational number, used for stream time bases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    /// Numerator
    pub num: i32,
    /// Denominator
    pub den: i32,
}

impl Rational {
    /// Creates a new rational from numerator and denominator.
    pub fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }
}

/// Accessibility disposition of an audio stream, reflected in the ISO 639
/// language descriptor's audio_type byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Disposition {
    /// Audio without narration (audio_type 0x01)
    pub clean_effects: bool,
    /// Audio for the hearing impaired (audio_type 0x02)
    pub hearing_impaired: bool,
    /// Narrated audio for the visually impaired (audio_type 0x03)
    pub visual_impaired: bool,
}

/// Static description of one elementary stream, supplied at header time.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    /// Codec carried by the stream
    pub codec: CodecId,
    /// Requested PID. Values below 16 select automatic assignment
    /// (`start_pid + stream_index`); 16..0x1FFF is used verbatim.
    pub requested_pid: u16,
    /// Comma-separated 3-letter ISO 639 language codes, e.g. `"por,eng"`
    pub language: Option<String>,
    /// Accessibility disposition
    pub disposition: Disposition,
    /// Codec configuration record (SPS/PPS for H.264, AudioSpecificConfig
    /// for AAC, identification header for Opus, page ids for DVB subtitles)
    pub extradata: Option<Vec<u8>>,
    /// Time base of the source, used to derive the VBR PCR cadence for video
    pub time_base: Rational,
    /// Audio sample rate in Hz
    pub sample_rate: u32,
    /// Audio channel count
    pub channels: u8,
    /// Samples per audio frame (0 when unknown)
    pub frame_samples: u32,
    /// Decoder priming samples to trim at stream start (Opus)
    pub initial_padding: u32,
}

impl StreamInfo {
    /// Creates a stream description with automatic PID assignment and no
    /// metadata.
    pub fn new(codec: CodecId) -> Self {
        Self {
            codec,
            requested_pid: 0,
            language: None,
            disposition: Disposition::default(),
            extradata: None,
            time_base: Rational::new(1, 90_000),
            sample_rate: 0,
            channels: 0,
            frame_samples: 0,
            initial_padding: 0,
        }
    }

    /// Sets an explicit PID for the stream.
    pub fn with_pid(mut self, pid: u16) -> Self {
        self.requested_pid = pid;
        self
    }

    /// Sets the language code list.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Sets the accessibility disposition.
    pub fn with_disposition(mut self, disposition: Disposition) -> Self {
        self.disposition = disposition;
        self
    }

    /// Attaches the codec configuration record.
    pub fn with_extradata(mut self, extradata: impl Into<Vec<u8>>) -> Self {
        self.extradata = Some(extradata.into());
        self
    }

    /// Sets the source time base.
    pub fn with_time_base(mut self, time_base: Rational) -> Self {
        self.time_base = time_base;
        self
    }

    /// Sets the audio sample rate.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Sets the audio channel count.
    pub fn with_channels(mut self, channels: u8) -> Self {
        self.channels = channels;
        self
    }

    /// Sets the audio frame size in samples.
    pub fn with_frame_samples(mut self, frame_samples: u32) -> Self {
        self.frame_samples = frame_samples;
        self
    }

    /// Sets the initial padding in samples at the source rate.
    pub fn with_initial_padding(mut self, initial_padding: u32) -> Self {
        self.initial_padding = initial_padding;
        self
    }

    /// The broad media class of the stream's codec.
    pub fn media_type(&self) -> MediaType {
        self.codec.media_type()
    }
}

/// Media packet handling
pub mod packet;
pub use packet::Packet;
