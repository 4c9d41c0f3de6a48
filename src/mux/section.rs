//! PSI/SI section framing.
//!
//! A [`Section`] owns one PID's continuity counter and turns complete table
//! bodies into 188-byte cells: CRC32 trailer, payload_unit_start_indicator
//! plus pointer_field on the first cell, 0xFF padding on the last.

use super::wire::WireWriter;
use super::{SDT_TID, SECTION_LENGTH, TS_PACKET_SIZE};
use crate::utils::crc32_mpeg2;
use crate::{MuxError, Result};

/// One PID's section emission state.
#[derive(Debug)]
pub struct Section {
    /// PID the section cells are written on
    pub pid: u16,
    /// Continuity counter, incremented modulo 16 per cell
    pub cc: u8,
}

impl Section {
    /// Creates a section context. The counter starts at 15 so the first
    /// emitted cell carries cc 0.
    pub fn new(pid: u16) -> Self {
        Self { pid, cc: 15 }
    }

    /// Emit a complete section body (table_id through the last payload byte,
    /// CRC excluded) as TS cells.
    pub fn write_section(&mut self, wire: &mut WireWriter, body: &[u8]) -> Result<()> {
        if body.len() + 4 > SECTION_LENGTH + 4 {
            return Err(MuxError::InvalidLength(format!(
                "section of {} bytes exceeds the {} byte limit",
                body.len() + 4,
                SECTION_LENGTH + 4
            )));
        }

        let crc = crc32_mpeg2(body).to_be_bytes();

        let mut remaining = body.len() + 4;
        let mut offset = 0usize;
        let mut first = true;
        while remaining > 0 {
            let mut cell = [0u8; TS_PACKET_SIZE];
            let mut q = 0usize;
            cell[q] = 0x47;
            q += 1;
            let mut b = (self.pid >> 8) as u8;
            if first {
                b |= 0x40;
            }
            cell[q] = b;
            q += 1;
            cell[q] = self.pid as u8;
            q += 1;
            self.cc = (self.cc + 1) & 0xf;
            cell[q] = 0x10 | self.cc;
            q += 1;
            if first {
                cell[q] = 0; // pointer_field
                q += 1;
            }

            let len = remaining.min(TS_PACKET_SIZE - q);
            for _ in 0..len {
                cell[q] = if offset < body.len() {
                    body[offset]
                } else {
                    crc[offset - body.len()]
                };
                q += 1;
                offset += 1;
            }
            remaining -= len;

            while q < TS_PACKET_SIZE {
                cell[q] = 0xff;
                q += 1;
            }

            wire.push_cell(&cell);
            first = false;
        }

        Ok(())
    }

    /// Emit a syntax section: the common `table_id .. last_section_number`
    /// header is prepended to `payload` before framing.
    #[allow(clippy::too_many_arguments)]
    pub fn write_section_syntax(
        &mut self,
        wire: &mut WireWriter,
        tid: u8,
        id: u16,
        version: u8,
        sec_num: u8,
        last_sec_num: u8,
        payload: &[u8],
    ) -> Result<()> {
        let total = 3 + 5 + payload.len() + 4;
        if total > SECTION_LENGTH {
            return Err(MuxError::InvalidLength(format!(
                "section of {} bytes exceeds the {} byte limit",
                total, SECTION_LENGTH
            )));
        }

        // reserved_future_use must be 1 for the SDT
        let flags: u16 = if tid == SDT_TID { 0xf000 } else { 0xb000 };

        let mut section = Vec::with_capacity(total - 4);
        section.push(tid);
        let len_field = flags | (payload.len() + 5 + 4) as u16;
        section.extend_from_slice(&len_field.to_be_bytes());
        section.extend_from_slice(&id.to_be_bytes());
        section.push(0xc1 | (version << 1)); // current_next_indicator = 1
        section.push(sec_num);
        section.push(last_sec_num);
        section.extend_from_slice(payload);

        self.write_section(wire, &section)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn cells(wire: &mut WireWriter) -> Vec<Vec<u8>> {
        wire.take().chunks(TS_PACKET_SIZE).map(|c| c.to_vec()).collect()
    }

    /// Strip TS framing and reassemble the section bytes.
    fn reassemble(cells: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();
        for (i, cell) in cells.iter().enumerate() {
            let start = if i == 0 { 5 } else { 4 };
            out.extend_from_slice(&cell[start..]);
        }
        out
    }

    #[test]
    fn test_single_cell_framing() {
        let mut wire = WireWriter::new(1, 0, false);
        let mut section = Section::new(0x0011);
        section
            .write_section_syntax(&mut wire, 0x42, 1, 0, 0, 0, &[0xAA, 0xBB])
            .unwrap();
        let cells = cells(&mut wire);
        assert_eq!(cells.len(), 1);
        let cell = &cells[0];

        assert_eq!(cell.len(), TS_PACKET_SIZE);
        assert_eq!(cell[0], 0x47);
        assert_eq!(cell[1], 0x40); // PUSI + pid high
        assert_eq!(cell[2], 0x11);
        assert_eq!(cell[3], 0x10); // payload only, cc = 0
        assert_eq!(cell[4], 0); // pointer_field
        assert_eq!(cell[5], 0x42); // table_id
        // section_length covers header remainder + payload + CRC
        assert_eq!(((cell[6] as u16) << 8 | cell[7] as u16) & 0x0fff, 5 + 2 + 4);
        // SDT sets reserved_future_use
        assert_eq!(cell[6] & 0xf0, 0xf0);
        // trailing padding
        assert!(cell[5 + 3 + 5 + 2 + 4..].iter().all(|&b| b == 0xff));
    }

    #[test]
    fn test_crc_validates_to_zero() {
        let mut wire = WireWriter::new(1, 0, false);
        let mut section = Section::new(0x0000);
        let payload: Vec<u8> = (0..64).collect();
        section
            .write_section_syntax(&mut wire, 0x00, 1, 3, 0, 0, &payload)
            .unwrap();
        let cells = cells(&mut wire);
        let section_bytes = reassemble(&cells);
        let section_len = 3 + 5 + payload.len() + 4;
        assert_eq!(crc32_mpeg2(&section_bytes[..section_len]), 0);
    }

    #[test]
    fn test_continuity_counters_increment() {
        let mut wire = WireWriter::new(1, 0, false);
        let mut section = Section::new(0x0010);
        let payload = vec![0x55u8; 600];
        section
            .write_section_syntax(&mut wire, 0x40, 1, 0, 0, 0, &payload)
            .unwrap();
        section
            .write_section_syntax(&mut wire, 0x40, 1, 0, 0, 0, &payload)
            .unwrap();
        let cells = cells(&mut wire);
        assert!(cells.len() > 2);
        for (i, cell) in cells.iter().enumerate() {
            assert_eq!(cell[3] & 0x0f, (i % 16) as u8);
        }
        // only the first cell of each section has PUSI
        assert_eq!(cells[0][1] & 0x40, 0x40);
        assert_eq!(cells[1][1] & 0x40, 0x00);
    }

    #[test]
    fn test_oversize_section_rejected() {
        let mut wire = WireWriter::new(1, 0, false);
        let mut section = Section::new(0x1000);
        let payload = vec![0u8; SECTION_LENGTH];
        assert!(matches!(
            section.write_section_syntax(&mut wire, 0x02, 1, 0, 0, 0, &payload),
            Err(MuxError::InvalidLength(_))
        ));
        assert_eq!(wire.staged_len(), 0);
    }

    #[quickcheck]
    fn prop_cells_are_well_formed(len: usize) -> bool {
        let len = len % 900 + 1;
        let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();
        let mut wire = WireWriter::new(1, 0, false);
        let mut section = Section::new(0x0014);
        section
            .write_section_syntax(&mut wire, 0x73, 0, 0, 0, 0, &payload)
            .unwrap();
        let out = wire.take();
        if out.len() % TS_PACKET_SIZE != 0 {
            return false;
        }
        let cells: Vec<_> = out.chunks(TS_PACKET_SIZE).collect();
        let section_len = 3 + 5 + len + 4;
        let reassembled: Vec<u8> = cells
            .iter()
            .enumerate()
            .flat_map(|(i, c)| c[if i == 0 { 5 } else { 4 }..].to_vec())
            .collect();
        cells.iter().all(|c| c[0] == 0x47)
            && crc32_mpeg2(&reassembled[..section_len]) == 0
    }
}
