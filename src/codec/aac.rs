//! AAC ADTS framing.
//!
//! Raw AAC frames (as produced by MP4-style containers) carry their
//! configuration out-of-band in an AudioSpecificConfig record. Transport
//! streams need self-describing ADTS frames, so each raw frame is wrapped in
//! a 7-byte ADTS header derived from that record. Frames that already carry
//! the 0xFFF sync word pass through untouched.

use crate::{MuxError, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// ADTS frame headers are 7 bytes (no CRC).
const ADTS_HEADER_SIZE: usize = 7;
/// ADTS frame_length is a 13-bit field.
const ADTS_MAX_FRAME_BYTES: usize = (1 << 13) - 1;

/// Returns true when the buffer opens with an ADTS sync word.
pub fn is_adts(data: &[u8]) -> bool {
    data.len() >= 2 && ((data[0] as u16) << 8 | data[1] as u16) & 0xfff0 == 0xfff0
}

/// Cursor over the AudioSpecificConfig record.
///
/// The record packs a handful of 4..6-bit fields back to back, so the cursor
/// keeps one absolute bit position and assembles each field bit by bit.
struct ConfigBits<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ConfigBits<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn field(&mut self, width: usize) -> Result<u8> {
        let end = self.pos + width;
        if end > self.data.len() * 8 {
            return Err(MuxError::UnsupportedFormat(
                "AAC configuration record truncated".into(),
            ));
        }
        let mut value = 0u8;
        for bit in self.pos..end {
            value = value << 1 | (self.data[bit / 8] >> (7 - bit % 8)) & 1;
        }
        self.pos = end;
        Ok(value)
    }
}

/// Per-stream ADTS wrapping state, built from the AudioSpecificConfig.
#[derive(Debug, Clone)]
pub struct AdtsContext {
    object_type: u8,
    sample_rate_index: u8,
    channel_config: u8,
}

impl AdtsContext {
    /// Parse an AudioSpecificConfig record into ADTS header fields.
    pub fn from_extradata(extradata: &[u8]) -> Result<Self> {
        let mut bits = ConfigBits::new(extradata);

        let mut object_type = bits.field(5)?;
        if object_type == 31 {
            object_type = 32 + bits.field(6)?;
        }
        let sample_rate_index = bits.field(4)?;
        if sample_rate_index == 0x0f {
            // explicit 24-bit frequency has no index; ADTS cannot signal it
            return Err(MuxError::UnsupportedFormat(
                "AAC sample rate not expressible in ADTS".into(),
            ));
        }
        let channel_config = bits.field(4)?;

        if object_type == 0 || object_type > 4 {
            return Err(MuxError::UnsupportedFormat(format!(
                "AAC object type {} not expressible in ADTS",
                object_type
            )));
        }

        Ok(Self {
            object_type,
            sample_rate_index,
            channel_config,
        })
    }

    /// Wrap one raw AAC frame in an ADTS header.
    pub fn wrap(&self, frame: &[u8]) -> Result<Bytes> {
        let frame_length = frame.len() + ADTS_HEADER_SIZE;
        if frame_length > ADTS_MAX_FRAME_BYTES {
            return Err(MuxError::InvalidInput(format!(
                "AAC frame of {} bytes exceeds the ADTS frame length field",
                frame.len()
            )));
        }

        let profile = self.object_type - 1; // ADTS profile is object_type - 1
        let mut out = BytesMut::with_capacity(frame_length);
        out.put_u8(0xff);
        out.put_u8(0xf1); // MPEG-4, layer 0, no CRC
        out.put_u8((profile & 0x3) << 6 | (self.sample_rate_index & 0xf) << 2 | self.channel_config >> 2);
        out.put_u8((self.channel_config & 0x3) << 6 | ((frame_length >> 11) & 0x3) as u8);
        out.put_u8((frame_length >> 3) as u8);
        out.put_u8(((frame_length & 0x7) as u8) << 5 | 0x1f); // buffer fullness = 0x7ff (VBR)
        out.put_u8(0xfc);
        out.put_slice(frame);
        Ok(out.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // AAC-LC, 44.1 kHz, stereo: 00010 0100 0010 ...
    const ASC_LC_44100_STEREO: [u8; 2] = [0x12, 0x10];

    #[test]
    fn test_parse_audio_specific_config() {
        let ctx = AdtsContext::from_extradata(&ASC_LC_44100_STEREO).unwrap();
        assert_eq!(ctx.object_type, 2);
        assert_eq!(ctx.sample_rate_index, 4);
        assert_eq!(ctx.channel_config, 2);
    }

    #[test]
    fn test_truncated_extradata() {
        // 8 bits cannot hold the 13-bit object/rate/channel prefix
        assert!(AdtsContext::from_extradata(&[0x12]).is_err());
        assert!(AdtsContext::from_extradata(&[]).is_err());
    }

    #[test]
    fn test_wrap_header_bytes() {
        let ctx = AdtsContext::from_extradata(&ASC_LC_44100_STEREO).unwrap();
        let frame = vec![0xAAu8; 100];
        let wrapped = ctx.wrap(&frame).unwrap();

        assert_eq!(wrapped.len(), 107);
        assert_eq!(wrapped[0], 0xff);
        assert_eq!(wrapped[1], 0xf1);
        // profile LC (1) << 6 | rate index 4 << 2 | channels >> 2
        assert_eq!(wrapped[2], 0x50);
        // channels & 3 << 6 | frame_length high bits
        assert_eq!(wrapped[3], 0x80);
        // frame_length = 107 = 0b0_0001101_011
        assert_eq!(wrapped[4], 107 >> 3);
        assert_eq!(wrapped[5], ((107u8 & 0x7) << 5) | 0x1f);
        assert_eq!(wrapped[6], 0xfc);
        assert_eq!(&wrapped[7..], &frame[..]);
        assert!(is_adts(&wrapped));
    }

    #[test]
    fn test_adts_detection() {
        assert!(is_adts(&[0xff, 0xf1, 0x50]));
        assert!(is_adts(&[0xff, 0xf9, 0x50])); // MPEG-2 ADTS
        assert!(!is_adts(&[0x21, 0x10]));
        assert!(!is_adts(&[0xff]));
    }

    #[test]
    fn test_oversize_frame_rejected() {
        let ctx = AdtsContext::from_extradata(&ASC_LC_44100_STEREO).unwrap();
        let frame = vec![0u8; ADTS_MAX_FRAME_BYTES];
        assert!(ctx.wrap(&frame).is_err());
    }

    #[test]
    fn test_unsupported_object_type() {
        // object type 5 (SBR): 00101 ...
        let asc = [0x2a, 0x10];
        assert!(AdtsContext::from_extradata(&asc).is_err());
    }
}
