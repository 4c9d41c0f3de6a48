//! HEVC annex-B start-code verification.

use crate::{MuxError, Result};

/// Verify that an HEVC payload begins with an annex-B start code.
///
/// As with H.264, only the first frame is fatal; later malformed packets are
/// logged and passed through.
pub fn check_startcode(data: &[u8], frames_written: u64) -> Result<()> {
    let long = data.len() >= 4
        && data[0] == 0x00
        && data[1] == 0x00
        && data[2] == 0x00
        && data[3] == 0x01;
    let short = data.len() >= 3 && data[0] == 0x00 && data[1] == 0x00 && data[2] == 0x01;
    if data.len() < 5 || (!long && !short) {
        if frames_written == 0 {
            return Err(MuxError::InvalidInput(
                "HEVC bitstream malformed, no startcode found".into(),
            ));
        }
        log::warn!("HEVC bitstream error, startcode missing, size {}", data.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startcode_accepted() {
        assert!(check_startcode(&[0x00, 0x00, 0x00, 0x01, 0x40, 0x01], 0).is_ok());
        assert!(check_startcode(&[0x00, 0x00, 0x01, 0x40, 0x01], 0).is_ok());
    }

    #[test]
    fn test_startcode_missing_first_frame() {
        assert!(check_startcode(&[0x40, 0x01, 0x0c, 0x01, 0xff], 0).is_err());
    }

    #[test]
    fn test_startcode_missing_later_frame_passes() {
        assert!(check_startcode(&[0x40, 0x01, 0x0c, 0x01, 0xff], 1).is_ok());
    }
}
