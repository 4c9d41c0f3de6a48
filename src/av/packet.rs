use bytes::Bytes;

/// One coded frame (or sample group) submitted to the muxer.
///
/// Timestamps are in 90 kHz ticks. The first packet on every stream must
/// carry a PTS.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Coded payload bytes
    pub data: Bytes,
    /// Presentation timestamp in 90 kHz ticks
    pub pts: Option<i64>,
    /// Decoding timestamp in 90 kHz ticks
    pub dts: Option<i64>,
    /// Index of the stream this packet belongs to
    pub stream_index: usize,
    /// Whether this packet starts a random-access point
    pub is_key: bool,
    /// PES stream_id override for data streams (0xBD selects asynchronous
    /// KLV carriage without timestamps)
    pub stream_id: Option<u8>,
    /// Samples to trim from the end of this packet, at the source rate (Opus)
    pub trim_end: u32,
}

impl Packet {
    /// Creates a packet holding `data` with no timestamps, bound to stream 0.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pts: None,
            dts: None,
            stream_index: 0,
            is_key: false,
            stream_id: None,
            trim_end: 0,
        }
    }

    /// Sets the presentation timestamp.
    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = Some(pts);
        self
    }

    /// Sets the decoding timestamp.
    pub fn with_dts(mut self, dts: i64) -> Self {
        self.dts = Some(dts);
        self
    }

    /// Binds the packet to a stream index.
    pub fn with_stream_index(mut self, index: usize) -> Self {
        self.stream_index = index;
        self
    }

    /// Marks the packet as a random-access point.
    pub fn with_key_flag(mut self, is_key: bool) -> Self {
        self.is_key = is_key;
        self
    }

    /// Overrides the PES stream_id (data streams only).
    pub fn with_stream_id(mut self, stream_id: u8) -> Self {
        self.stream_id = Some(stream_id);
        self
    }

    /// Sets the number of samples to trim from the packet's tail.
    pub fn with_trim_end(mut self, trim_end: u32) -> Self {
        self.trim_end = trim_end;
        self
    }
}
