//! H.264 annex-B payload fixups.
//!
//! Receivers expect every access unit to open with an access-unit delimiter
//! (NAL type 9). When a key frame arrives without one, a synthetic AUD is
//! prepended, and the stream's extradata (SPS/PPS) is inserted behind it if
//! the frame is IDR and no in-band SPS precedes the first slice.

use crate::{MuxError, Result};
use bytes::{BufMut, Bytes, BytesMut};

const NAL_SLICE: u8 = 1;
const NAL_IDR: u8 = 5;
const NAL_SPS: u8 = 7;
const NAL_AUD: u8 = 9;

/// Verify that a payload begins with an annex-B start code.
///
/// Fails only on the first frame of a stream; afterwards a missing start
/// code is logged and the packet is passed through.
pub fn check_startcode(data: &[u8], frames_written: u64) -> Result<()> {
    if data.len() < 5 || (read_u32(data) != 0x0000_0001 && read_u24(data) != 0x00_0001) {
        if frames_written == 0 {
            return Err(MuxError::InvalidInput(
                "H.264 bitstream malformed, no startcode found; \
                 convert the stream to annex-B first"
                    .into(),
            ));
        }
        log::warn!("H.264 bitstream error, startcode missing, size {}", data.len());
    }
    Ok(())
}

/// Prepend an AUD (and, when appropriate, the stream extradata) to a key
/// frame that lacks one.
///
/// Returns `None` when the payload already opens with an AUD and can be
/// written as-is.
pub fn prepare_payload(data: &[u8], key: bool, extradata: Option<&[u8]>) -> Option<Bytes> {
    let mut extra = match extradata {
        Some(e) if key && e.len() >= 3 && read_u24(e) <= 1 => Some(e),
        _ => None,
    };

    // Walk NAL units up to the first AUD or slice; an in-band SPS makes the
    // extradata redundant.
    let mut last_type = None;
    for nal_type in nal_unit_types(data) {
        if nal_type == NAL_SPS {
            extra = None;
        }
        last_type = Some(nal_type);
        if nal_type == NAL_AUD || nal_type == NAL_IDR || nal_type == NAL_SLICE {
            break;
        }
    }

    if last_type != Some(NAL_IDR) {
        extra = None;
    }
    if last_type == Some(NAL_AUD) {
        return None;
    }

    let extra = extra.unwrap_or(&[]);
    let mut out = BytesMut::with_capacity(data.len() + 6 + extra.len());
    out.put_slice(&[0x00, 0x00, 0x00, 0x01, 0x09, 0xf0]);
    out.put_slice(extra);
    out.put_slice(data);
    Some(out.freeze())
}

/// Iterate the NAL unit types of an annex-B buffer in bitstream order.
fn nal_unit_types(data: &[u8]) -> impl Iterator<Item = u8> + '_ {
    let mut pos = 0;
    std::iter::from_fn(move || {
        while pos + 3 < data.len() {
            if data[pos] == 0x00 && data[pos + 1] == 0x00 && data[pos + 2] == 0x01 {
                let nal_type = data[pos + 3] & 0x1f;
                pos += 3;
                return Some(nal_type);
            }
            pos += 1;
        }
        None
    })
}

fn read_u24(data: &[u8]) -> u32 {
    (data[0] as u32) << 16 | (data[1] as u32) << 8 | data[2] as u32
}

fn read_u32(data: &[u8]) -> u32 {
    (data[0] as u32) << 24 | (data[1] as u32) << 16 | (data[2] as u32) << 8 | data[3] as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDR: &[u8] = &[0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84, 0x00];

    #[test]
    fn test_startcode_accepted() {
        assert!(check_startcode(IDR, 0).is_ok());
        // three-byte start code
        assert!(check_startcode(&[0x00, 0x00, 0x01, 0x65, 0x88], 0).is_ok());
    }

    #[test]
    fn test_startcode_missing_first_frame() {
        assert!(check_startcode(&[0x65, 0x88, 0x84, 0x00, 0x00], 0).is_err());
    }

    #[test]
    fn test_startcode_missing_later_frame_passes() {
        assert!(check_startcode(&[0x65, 0x88, 0x84, 0x00, 0x00], 3).is_ok());
    }

    #[test]
    fn test_aud_prepended_to_keyframe() {
        let out = prepare_payload(IDR, true, None).unwrap();
        assert_eq!(&out[..6], &[0x00, 0x00, 0x00, 0x01, 0x09, 0xf0]);
        assert_eq!(&out[6..], IDR);
    }

    #[test]
    fn test_existing_aud_left_alone() {
        let with_aud = [
            0x00, 0x00, 0x00, 0x01, 0x09, 0xf0, 0x00, 0x00, 0x00, 0x01, 0x65, 0x88,
        ];
        assert!(prepare_payload(&with_aud, true, None).is_none());
    }

    #[test]
    fn test_extradata_inserted_for_idr() {
        let sps = [0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x1e];
        let out = prepare_payload(IDR, true, Some(&sps)).unwrap();
        assert_eq!(&out[..6], &[0x00, 0x00, 0x00, 0x01, 0x09, 0xf0]);
        assert_eq!(&out[6..6 + sps.len()], &sps);
        assert_eq!(&out[6 + sps.len()..], IDR);
    }

    #[test]
    fn test_extradata_skipped_when_inband_sps() {
        let sps_then_idr = [
            0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x1e, 0x00, 0x00, 0x00, 0x01, 0x65, 0x88,
        ];
        let extra = [0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x1e];
        let out = prepare_payload(&sps_then_idr, true, Some(&extra)).unwrap();
        assert_eq!(out.len(), sps_then_idr.len() + 6);
    }

    #[test]
    fn test_extradata_skipped_for_non_idr() {
        let non_idr = [0x00, 0x00, 0x00, 0x01, 0x41, 0x9a, 0x00];
        let extra = [0x00, 0x00, 0x00, 0x01, 0x67, 0x42];
        let out = prepare_payload(&non_idr, false, Some(&extra)).unwrap();
        assert_eq!(out.len(), non_idr.len() + 6);
    }

    #[test]
    fn test_non_annexb_extradata_skipped() {
        // avcC extradata starts with a version byte, not a start code
        let avcc = [0x01, 0x42, 0x00, 0x1e, 0xff];
        let out = prepare_payload(IDR, true, Some(&avcc)).unwrap();
        assert_eq!(out.len(), IDR.len() + 6);
    }
}
