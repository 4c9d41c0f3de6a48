//! PES packetization, PCR emission and CBR stuffing.
//!
//! A complete PES payload is segmented into TS cells in one pass. The SI
//! scheduler runs before every cell, PCRs ride the adaptation field of the
//! designated PID, and in CBR mode PCR-only or null cells are injected
//! whenever the DTS runs further ahead of the wire clock than the mux delay
//! allows. The final cell of a PES is padded with an oversized adaptation
//! field.

use super::muxer::MuxState;
use super::wire::WireWriter;
use super::{NULL_PID, TS_PACKET_SIZE};
use crate::av::{CodecId, MediaType};
use crate::config::MuxFlags;
use crate::Result;

/// Set an adaptation-field flag, creating a minimal adaptation field first
/// if the cell has none.
fn set_af_flag(pkt: &mut [u8; TS_PACKET_SIZE], flag: u8) {
    if pkt[3] & 0x20 == 0 {
        pkt[3] |= 0x20;
        pkt[4] = 1; // 1 byte length, flags only
        pkt[5] = 0;
    }
    pkt[5] |= flag;
}

/// Grow the adaptation field by `size` bytes.
fn extend_af(pkt: &mut [u8; TS_PACKET_SIZE], size: u8) {
    pkt[4] += size;
}

/// Offset of the first payload byte after header and adaptation field.
fn ts_payload_start(pkt: &[u8; TS_PACKET_SIZE]) -> usize {
    if pkt[3] & 0x20 != 0 {
        5 + pkt[4] as usize
    } else {
        4
    }
}

/// Encode a PCR as 33-bit base, 6 reserved bits and 9-bit extension.
fn write_pcr_bits(buf: &mut [u8], pcr: i64) -> usize {
    let pcr_low = pcr % 300;
    let pcr_high = pcr / 300;

    buf[0] = (pcr_high >> 25) as u8;
    buf[1] = (pcr_high >> 17) as u8;
    buf[2] = (pcr_high >> 9) as u8;
    buf[3] = (pcr_high >> 1) as u8;
    buf[4] = ((pcr_high << 7) as u8) | ((pcr_low >> 8) as u8) | 0x7e;
    buf[5] = pcr_low as u8;
    6
}

/// Write a 5-byte PTS/DTS field with marker bits.
fn write_ts(buf: &mut [u8], fourbits: u8, ts: i64) {
    buf[0] = (fourbits << 4) | (((ts >> 30) & 0x07) as u8) << 1 | 1;
    let val = ((((ts >> 15) & 0x7fff) << 1) | 1) as u16;
    buf[1..3].copy_from_slice(&val.to_be_bytes());
    let val = (((ts & 0x7fff) << 1) | 1) as u16;
    buf[3..5].copy_from_slice(&val.to_be_bytes());
}

impl MuxState {
    /// Evaluate every table timer and emit whatever is due. PAT and the
    /// PMTs always travel together, PAT first.
    pub(crate) fn retransmit_si_info(
        &mut self,
        wire: &mut WireWriter,
        force_pat: bool,
        dts: Option<i64>,
    ) -> Result<()> {
        if self.pat_timer.tick(dts, force_pat) {
            self.write_pat(wire)?;
            for i in 0..self.services.len() {
                self.write_pmt(wire, i)?;
            }
        }
        if self.sdt_timer.tick(dts, false) {
            self.write_sdt(wire)?;
        }
        if self.nit_timer.tick(dts, false) {
            self.write_nit(wire)?;
        }
        if self.tot_timer.tick(dts, false) {
            self.write_tot(wire)?;
        }
        if self.eit_timer.tick(dts, false) {
            self.write_eit(wire)?;
        }
        Ok(())
    }

    /// Write a single null cell (PID 0x1FFF).
    fn insert_null_packet(wire: &mut WireWriter) {
        let mut buf = [0xffu8; TS_PACKET_SIZE];
        buf[0] = 0x47;
        buf[1] = (NULL_PID >> 8) as u8;
        buf[2] = NULL_PID as u8;
        buf[3] = 0x10;
        wire.push_cell(&buf);
    }

    /// Write an adaptation-only cell carrying just a PCR. The continuity
    /// counter does not increment on cells without payload
    /// (ISO 13818-1 2.4.3.3).
    fn insert_pcr_only(&self, wire: &mut WireWriter, stream_index: usize) {
        let stream = &self.streams[stream_index];
        let mut buf = [0u8; TS_PACKET_SIZE];
        buf[0] = 0x47;
        buf[1] = (stream.pid >> 8) as u8;
        buf[2] = stream.pid as u8;
        buf[3] = 0x20 | stream.cc; // adaptation only
        buf[4] = (TS_PACKET_SIZE - 5) as u8;
        buf[5] = 0x10; // PCR present
        let n = write_pcr_bits(&mut buf[6..], wire.pcr());
        for b in &mut buf[6 + n..] {
            *b = 0xff;
        }
        wire.push_cell(&buf);
    }

    /// Wrap a payload in a PES header and segment it into TS cells.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn write_pes(
        &mut self,
        wire: &mut WireWriter,
        stream_index: usize,
        payload: &[u8],
        pts: Option<i64>,
        dts: Option<i64>,
        key: bool,
        stream_id: Option<u8>,
    ) -> Result<()> {
        let (pid, service_index, codec) = {
            let s = &self.streams[stream_index];
            (s.pid, s.service_index, s.info.codec)
        };
        let media = codec.media_type();
        let cbr = self.mux_rate > 1;
        let delay = self.max_delay_90k;

        let mut force_pat =
            media == MediaType::Video && key && !self.streams[stream_index].prev_payload_key;
        if self.cfg.flags.contains(MuxFlags::PAT_PMT_AT_FRAMES) && media == MediaType::Video {
            force_pat = true;
        }

        let is_dvb_subtitle = codec == CodecId::DvbSubtitle;
        let is_dvb_teletext = codec == CodecId::DvbTeletext;

        let mut pts = pts;
        let mut dts = dts;
        let stream_id_byte = match media {
            MediaType::Video => {
                if codec == CodecId::Dirac {
                    0xfd
                } else {
                    0xe0
                }
            }
            MediaType::Audio
                if matches!(codec, CodecId::Mp2 | CodecId::Mp3 | CodecId::Aac) =>
            {
                0xc0
            }
            MediaType::Audio if codec == CodecId::Ac3 && self.m2ts => 0xfd,
            MediaType::Data => {
                let id = stream_id.unwrap_or(0xfc);
                if id == 0xbd {
                    // asynchronous KLV rides without timestamps
                    pts = None;
                    dts = None;
                }
                id
            }
            _ => 0xbd,
        };

        // DVB subtitle PES payloads get the data_identifier/stream_id prefix
        // and an end-of-data marker.
        let subtitle_payload;
        let payload: &[u8] = if is_dvb_subtitle {
            let mut v = Vec::with_capacity(payload.len() + 3);
            v.extend_from_slice(&[0x20, 0x00]);
            v.extend_from_slice(payload);
            v.push(0xff);
            subtitle_payload = v;
            &subtitle_payload
        } else {
            payload
        };

        let mut is_start = true;
        let mut remaining = payload;
        while !remaining.is_empty() {
            self.retransmit_si_info(wire, force_pat, dts)?;
            force_pat = false;

            let mut write_pcr = false;
            if pid == self.services[service_index].pcr_pid {
                let service = &mut self.services[service_index];
                // VBR paces the PCR per frame, CBR per cell
                if cbr || is_start {
                    service.pcr_packet_count += 1;
                }
                if service.pcr_packet_count >= service.pcr_packet_period {
                    service.pcr_packet_count = 0;
                    write_pcr = true;
                }
            }

            if cbr {
                if let Some(d) = dts {
                    if d - wire.pcr() / 300 > delay {
                        // the DTS runs ahead of the wire clock: pad time out,
                        // PCR insertion taking priority over null stuffing
                        if write_pcr {
                            self.insert_pcr_only(wire, stream_index);
                        } else {
                            Self::insert_null_packet(wire);
                        }
                        continue;
                    }
                }
            }

            let mut buf = [0u8; TS_PACKET_SIZE];
            buf[0] = 0x47;
            let mut b = (pid >> 8) as u8;
            if is_start {
                b |= 0x40;
            }
            buf[1] = b;
            buf[2] = pid as u8;
            {
                let stream = &mut self.streams[stream_index];
                stream.cc = (stream.cc + 1) & 0xf;
                buf[3] = 0x10 | stream.cc;
            }

            if key && is_start && pts.is_some() {
                if pid == self.services[service_index].pcr_pid {
                    write_pcr = true;
                }
                set_af_flag(&mut buf, 0x40); // random access indicator
            }
            if write_pcr {
                set_af_flag(&mut buf, 0x10);
                let q = ts_payload_start(&buf);
                let pcr = if cbr {
                    wire.pcr()
                } else {
                    (dts.unwrap_or(delay) - delay) * 300
                };
                if let Some(d) = dts {
                    if d < pcr / 300 {
                        log::warn!("dts < pcr, TS is invalid");
                    }
                }
                let n = write_pcr_bits(&mut buf[q..], pcr);
                extend_af(&mut buf, n as u8);
            }

            let mut q = ts_payload_start(&buf);
            if is_start {
                buf[q] = 0x00;
                buf[q + 1] = 0x00;
                buf[q + 2] = 0x01;
                buf[q + 3] = stream_id_byte;
                q += 4;

                let mut header_len = 0usize;
                let mut flags = 0u8;
                if pts.is_some() {
                    header_len += 5;
                    flags |= 0x80;
                }
                let write_dts = dts.is_some() && pts.is_some() && dts != pts;
                if write_dts {
                    header_len += 5;
                    flags |= 0x40;
                }
                let dirac_extension = codec == CodecId::Dirac;
                // Blu-ray players need the AC-3 sub-stream id extension
                let bluray_ac3_extension = self.m2ts && codec == CodecId::Ac3;
                if dirac_extension || bluray_ac3_extension {
                    flags |= 0x01;
                    header_len += 3;
                }
                let mut header_stuffing = 0usize;
                if is_dvb_teletext {
                    header_stuffing = 0x24 - header_len;
                    header_len = 0x24;
                }

                let mut len = remaining.len() + header_len + 3;
                if len > 0xffff {
                    len = 0;
                }
                if self.cfg.omit_video_pes_length && media == MediaType::Video {
                    len = 0;
                }
                buf[q] = (len >> 8) as u8;
                buf[q + 1] = len as u8;
                q += 2;

                let mut val = 0x80u8;
                // data alignment is required for subtitle and data streams
                if media == MediaType::Subtitle || media == MediaType::Data {
                    val |= 0x04;
                }
                buf[q] = val;
                buf[q + 1] = flags;
                buf[q + 2] = header_len as u8;
                q += 3;

                if let Some(p) = pts {
                    write_ts(&mut buf[q..], flags >> 6, p);
                    q += 5;
                }
                if write_dts {
                    write_ts(&mut buf[q..], 0x01, dts.unwrap_or(0));
                    q += 5;
                }
                if dirac_extension {
                    // PES_extension_flag_2, one byte of extended stream id
                    buf[q] = 0x01;
                    buf[q + 1] = 0x81;
                    buf[q + 2] = 0x60;
                    q += 3;
                }
                if bluray_ac3_extension {
                    buf[q] = 0x01;
                    buf[q + 1] = 0x81;
                    buf[q + 2] = 0x71;
                    q += 3;
                }
                if is_dvb_teletext {
                    for b in &mut buf[q..q + header_stuffing] {
                        *b = 0xff;
                    }
                    q += header_stuffing;
                }
                is_start = false;
            }

            let header_len = q;
            let len = remaining.len().min(TS_PACKET_SIZE - header_len);
            let stuffing_len = TS_PACKET_SIZE - header_len - len;
            if stuffing_len > 0 {
                if buf[3] & 0x20 != 0 {
                    // adaptation field present: widen it
                    let afc_len = buf[4] as usize + 1;
                    buf.copy_within(4 + afc_len..header_len, 4 + afc_len + stuffing_len);
                    buf[4] += stuffing_len as u8;
                    for b in &mut buf[4 + afc_len..4 + afc_len + stuffing_len] {
                        *b = 0xff;
                    }
                } else {
                    buf.copy_within(4..header_len, 4 + stuffing_len);
                    buf[3] |= 0x20;
                    buf[4] = (stuffing_len - 1) as u8;
                    if stuffing_len >= 2 {
                        buf[5] = 0x00;
                        for b in &mut buf[6..4 + stuffing_len] {
                            *b = 0xff;
                        }
                    }
                }
            }
            buf[TS_PACKET_SIZE - len..].copy_from_slice(&remaining[..len]);
            remaining = &remaining[len..];

            wire.push_cell(&buf);
        }

        self.streams[stream_index].prev_payload_key = key;
        Ok(())
    }
}
