//! PAT/PMT/SDT/NIT/TOT/EIT table builders.
//!
//! Each builder assembles its body into a [`SectionBuffer`] and hands it to
//! the owning [`Section`](super::section::Section) for CRC framing. Length
//! fields that cover trailing loops are reserved with marks and patched once
//! the loop closes.

use super::buffer::SectionBuffer;
use super::muxer::MuxState;
use super::wire::WireWriter;
use super::{EIT_TID, NIT_TID, PAT_TID, PMT_TID, SDT_TID, TOT_TID};
use crate::av::{CodecId, MediaType};
use crate::codec::opus;
use crate::config::MuxFlags;
use crate::Result;
use chrono::{DateTime, NaiveDate, Timelike, Utc};

/// PMT stream_type for private data carriage.
const STREAM_TYPE_PRIVATE_DATA: u8 = 0x06;

/// Map a codec onto its PMT stream_type.
pub(crate) fn stream_type(codec: CodecId, flags: MuxFlags) -> u8 {
    match codec {
        CodecId::Mpeg1Video | CodecId::Mpeg2Video => 0x02,
        CodecId::Mpeg4Video => 0x10,
        CodecId::H264 => 0x1b,
        CodecId::Hevc => 0x24,
        CodecId::Cavs => 0x42,
        CodecId::Dirac => 0xd1,
        CodecId::Vc1 => 0xea,
        CodecId::Mp2 | CodecId::Mp3 => 0x03,
        CodecId::Aac => {
            if flags.contains(MuxFlags::AAC_LATM) {
                0x11
            } else {
                0x0f
            }
        }
        CodecId::AacLatm => 0x11,
        CodecId::Ac3 => {
            if flags.contains(MuxFlags::SYSTEM_B) {
                STREAM_TYPE_PRIVATE_DATA
            } else {
                0x81
            }
        }
        CodecId::Eac3 => {
            if flags.contains(MuxFlags::SYSTEM_B) {
                STREAM_TYPE_PRIVATE_DATA
            } else {
                0x87
            }
        }
        CodecId::Dts => 0x8a,
        CodecId::TrueHd => 0x83,
        CodecId::Opus
        | CodecId::S302m
        | CodecId::SmpteKlv
        | CodecId::DvbSubtitle
        | CodecId::DvbTeletext => STREAM_TYPE_PRIVATE_DATA,
    }
}

fn bcd(v: u8) -> u8 {
    (v / 10) << 4 | (v % 10)
}

/// Encode a UTC instant as the DVB 5-byte MJD + BCD local time, shifted to
/// UTC-3 as the Brazilian profile requires.
fn mjd_utc3(dt: DateTime<Utc>) -> [u8; 5] {
    let local = dt - chrono::Duration::hours(3);
    let epoch = NaiveDate::from_ymd_opt(1858, 11, 17).expect("valid MJD epoch");
    let mjd = local.date_naive().signed_duration_since(epoch).num_days() as u16;
    [
        (mjd >> 8) as u8,
        mjd as u8,
        bcd(local.hour() as u8),
        bcd(local.minute() as u8),
        bcd(local.second() as u8),
    ]
}

/// Fixed announcement time used when no clock is configured.
const DEFAULT_TIME: [u8; 5] = [0xDD, 0xE2, 0x10, 0x20, 0x30];
/// Fixed fallback for the local-time-offset change date.
const DEFAULT_TIME_OF_CHANGE: [u8; 5] = [0xDE, 0x7B, 0x00, 0x00, 0x00];

fn country_bytes(code: &str) -> [u8; 3] {
    let mut out = [b' '; 3];
    for (dst, src) in out.iter_mut().zip(code.bytes()) {
        *dst = src;
    }
    out
}

impl MuxState {
    /// Emit the Program Association Table.
    pub(crate) fn write_pat(&mut self, wire: &mut WireWriter) -> Result<()> {
        let mut sec = SectionBuffer::new();
        for service in &self.services {
            sec.put_u16(service.sid)?;
            sec.put_u16(0xe000 | service.pmt.pid)?;
        }
        self.pat.write_section_syntax(
            wire,
            PAT_TID,
            self.cfg.transport_stream_id,
            self.cfg.tables_version,
            0,
            0,
            sec.bytes(),
        )
    }

    /// Emit one service's Program Map Table.
    pub(crate) fn write_pmt(&mut self, wire: &mut WireWriter, service_index: usize) -> Result<()> {
        let mut sec = SectionBuffer::new();
        let service = &self.services[service_index];
        sec.put_u16(0xe000 | service.pcr_pid)?;

        let program_info_mark = sec.skip(2)?;
        sec.put_u8(0x55)?; // parental rating descriptor
        let rating_mark = sec.skip(1)?;
        sec.put_slice(&country_bytes(&self.cfg.country_code))?;
        sec.put_u8(self.cfg.parental_rating)?;
        sec.patch_u8(rating_mark, (sec.written_since(rating_mark) - 1) as u8);
        sec.patch_u16(
            program_info_mark,
            0xf000 | (sec.written_since(program_info_mark) - 2) as u16,
        );

        let mut overflowed = None;
        for (i, stream) in self.streams.iter().enumerate() {
            if stream.service_index != service_index {
                continue;
            }
            if sec.remaining() < 32 {
                overflowed = Some(i);
                break;
            }

            sec.put_u8(stream_type(stream.info.codec, self.cfg.flags))?;
            sec.put_u16(0xe000 | stream.pid)?;
            let desc_mark = sec.skip(2)?;

            match stream.info.media_type() {
                MediaType::Audio => {
                    let system_b = self.cfg.flags.contains(MuxFlags::SYSTEM_B);
                    if stream.info.codec == CodecId::Ac3 && system_b {
                        sec.put_slice(&[0x6a, 1, 0])?; // AC-3 descriptor, all flags clear
                    }
                    if stream.info.codec == CodecId::Eac3 && system_b {
                        sec.put_slice(&[0x7a, 1, 0])?;
                    }
                    if stream.info.codec == CodecId::S302m {
                        sec.put_slice(&[0x05, 4])?;
                        sec.put_slice(b"BSSD")?;
                    }
                    let mut descriptors_cut = false;
                    if stream.info.codec == CodecId::Opus {
                        if sec.remaining() < 6 + 4 {
                            overflowed = Some(i);
                            descriptors_cut = true;
                        } else {
                            sec.put_slice(&[0x05, 4])?;
                            sec.put_slice(b"Opus")?;
                            sec.put_slice(&[0x7f, 2, 0x80])?; // DVB extension descriptor
                            sec.put_u8(opus::dvb_channel_config(
                                stream.info.extradata.as_deref(),
                                stream.info.channels,
                            ))?;
                        }
                    }
                    if let (Some(lang), false) = (&stream.info.language, descriptors_cut) {
                        sec.put_u8(0x0a)?; // ISO 639 language descriptor
                        let len_mark = sec.skip(1)?;
                        let mut entries = 0u8;
                        for code in lang.split(',') {
                            if code.len() != 3 || entries as usize >= 255 / 4 {
                                continue;
                            }
                            sec.put_slice(code.as_bytes())?;
                            let d = stream.info.disposition;
                            sec.put_u8(if d.clean_effects {
                                0x01
                            } else if d.hearing_impaired {
                                0x02
                            } else if d.visual_impaired {
                                0x03
                            } else {
                                0x00
                            })?;
                            entries += 1;
                        }
                        if entries == 0 {
                            sec.truncate(len_mark - 1);
                        } else {
                            sec.patch_u8(len_mark, entries * 4);
                        }
                    }
                }
                MediaType::Subtitle => {
                    self.put_subtitle_descriptors(&mut sec, stream)?;
                }
                MediaType::Video => {
                    if stream.info.codec == CodecId::Dirac {
                        sec.put_slice(&[0x05, 4])?;
                        sec.put_slice(b"drac")?;
                    } else if stream.info.codec == CodecId::Vc1 {
                        sec.put_slice(&[0x05, 4])?;
                        sec.put_slice(b"VC-1")?;
                    }
                }
                MediaType::Data => {
                    if stream.info.codec == CodecId::SmpteKlv {
                        sec.put_slice(&[0x05, 4])?;
                        sec.put_slice(b"KLVA")?;
                    }
                }
            }

            sec.patch_u16(desc_mark, 0xf000 | (sec.written_since(desc_mark) - 2) as u16);
        }

        if let Some(i) = overflowed {
            log::error!(
                "The PMT section cannot fit stream {} and all following streams. \
                 Try reducing the number of languages in the audio streams \
                 or the total number of streams.",
                i
            );
        }

        let (sid, version) = (service.sid, self.cfg.tables_version);
        self.services[service_index].pmt.write_section_syntax(
            wire,
            PMT_TID,
            sid,
            version,
            0,
            0,
            sec.bytes(),
        )
    }

    fn put_subtitle_descriptors(
        &self,
        sec: &mut SectionBuffer,
        stream: &super::muxer::StreamState,
    ) -> Result<()> {
        let language = stream
            .info
            .language
            .as_deref()
            .filter(|l| l.len() >= 3)
            .unwrap_or("und");
        let extradata = stream.info.extradata.as_deref().unwrap_or(&[]);

        match stream.info.codec {
            CodecId::DvbSubtitle => {
                sec.put_u8(0x59)?; // subtitling_descriptor
                let len_mark = sec.skip(1)?;
                let mut copied = 0usize;
                for code in language.split(',') {
                    if code.len() < 3 || sec.remaining() < 8 {
                        continue;
                    }
                    sec.put_slice(&code.as_bytes()[..3])?;
                    if extradata.len() - copied >= 5 {
                        sec.put_u8(extradata[copied + 4])?; // subtitling_type
                        sec.put_slice(&extradata[copied..copied + 4])?;
                        copied += 5;
                    } else {
                        // 0x10: normal, 0x20: hard-of-hearing; both without
                        // monitor aspect ratio criticality
                        sec.put_u8(if stream.info.disposition.hearing_impaired {
                            0x20
                        } else {
                            0x10
                        })?;
                        if extradata.len() == 4 && copied == 0 {
                            sec.put_slice(extradata)?;
                            copied = 4;
                        } else {
                            sec.put_u16(1)?; // composition_page_id
                            sec.put_u16(1)?; // ancillary_page_id
                        }
                    }
                }
                sec.patch_u8(len_mark, (sec.written_since(len_mark) - 1) as u8);
            }
            CodecId::DvbTeletext => {
                sec.put_u8(0x56)?; // teletext_descriptor
                let len_mark = sec.skip(1)?;
                let mut copied = 0usize;
                for code in language.split(',') {
                    if code.len() < 3 || sec.remaining() < 6 {
                        continue;
                    }
                    sec.put_slice(&code.as_bytes()[..3])?;
                    if extradata.len() > copied + 1 {
                        sec.put_slice(&extradata[copied..copied + 2])?;
                        copied += 2;
                    } else {
                        // initial teletext page, magazine 0, page 0
                        sec.put_slice(&[0x08, 0x00])?;
                    }
                }
                sec.patch_u8(len_mark, (sec.written_since(len_mark) - 1) as u8);
            }
            _ => {}
        }
        Ok(())
    }

    /// Emit the Service Description Table.
    pub(crate) fn write_sdt(&mut self, wire: &mut WireWriter) -> Result<()> {
        let mut sec = SectionBuffer::new();
        sec.put_u16(self.cfg.original_network_id)?;
        sec.put_u8(0xff)?;
        for service in &self.services {
            sec.put_u16(service.sid)?;
            sec.put_u8(0xfc)?; // no EIT schedule info
            let loop_mark = sec.skip(2)?;

            sec.put_u8(0x48)?; // service_descriptor
            let len_mark = sec.skip(1)?;
            sec.put_u8(if service.is_one_seg() {
                crate::config::ServiceType::OneSeg.code()
            } else {
                self.cfg.service_type.code()
            })?;
            sec.put_str8(&service.provider_name)?;
            sec.put_str8(&service.name)?;
            sec.patch_u8(len_mark, (sec.written_since(len_mark) - 1) as u8);

            let running_status = 4u16; // running
            let free_ca_mode = 0u16;
            sec.patch_u16(
                loop_mark,
                running_status << 13
                    | free_ca_mode << 12
                    | (sec.written_since(loop_mark) - 2) as u16,
            );
        }
        self.sdt.write_section_syntax(
            wire,
            SDT_TID,
            self.cfg.transport_stream_id,
            self.cfg.tables_version,
            0,
            0,
            sec.bytes(),
        )
    }

    /// Emit the Network Information Table with the ISDB-Tb descriptors.
    pub(crate) fn write_nit(&mut self, wire: &mut WireWriter) -> Result<()> {
        let mut sec = SectionBuffer::new();
        let network_name = self.cfg.network_name.as_bytes();

        let network_desc_mark = sec.skip(2)?;
        sec.put_u8(0x40)?; // network_name_descriptor
        sec.put_str8(&self.cfg.network_name)?;
        sec.put_u8(0xfe)?; // system_management_descriptor
        let sm_mark = sec.skip(1)?;
        sec.put_u8(0x03)?; // broadcast flag: open TV
        sec.put_u8(0x01)?;
        sec.patch_u8(sm_mark, (sec.written_since(sm_mark) - 1) as u8);
        sec.patch_u16(
            network_desc_mark,
            0xf000 | (sec.written_since(network_desc_mark) - 2) as u16,
        );

        let ts_loop_mark = sec.skip(2)?;
        sec.put_u16(self.cfg.transport_stream_id)?;
        sec.put_u16(self.cfg.original_network_id)?;
        let transport_desc_mark = sec.skip(2)?;

        // TS information descriptor
        sec.put_u8(0xcd)?;
        let ts_info_mark = sec.skip(1)?;
        sec.put_u8(self.cfg.virtual_channel)?; // remote control key id
        sec.put_u8((network_name.len() as u8) << 2 | 0x2)?;
        sec.put_slice(network_name)?;
        for service in &self.services {
            // transmission type: 0xAF = layer C (one-seg), 0x0F = layer A
            sec.put_u8(if service.is_one_seg() { 0xaf } else { 0x0f })?;
            sec.put_u8(0x01)?;
            sec.put_u16(service.sid)?;
        }
        sec.patch_u8(ts_info_mark, (sec.written_since(ts_info_mark) - 1) as u8);

        // service list descriptor
        sec.put_u8(0x41)?;
        let list_mark = sec.skip(1)?;
        for service in &self.services {
            sec.put_u16(service.sid)?;
            sec.put_u8(0x01)?; // digital TV service
        }
        sec.patch_u8(list_mark, (sec.written_since(list_mark) - 1) as u8);

        // partial reception descriptor per one-seg service
        for service in &self.services {
            if service.is_one_seg() {
                sec.put_u8(0xfb)?;
                let pr_mark = sec.skip(1)?;
                sec.put_u16(service.sid)?;
                sec.patch_u8(pr_mark, (sec.written_since(pr_mark) - 1) as u8);
            }
        }

        // terrestrial delivery system descriptor
        sec.put_u8(0xfa)?;
        let tds_mark = sec.skip(1)?;
        sec.put_u16(
            self.cfg.area_code << 4
                | self.cfg.guard_interval.code() << 2
                | self.cfg.transmission_mode.code(),
        )?;
        sec.put_u16(terrestrial_frequency(self.cfg.physical_channel))?;
        sec.patch_u8(tds_mark, (sec.written_since(tds_mark) - 1) as u8);

        sec.patch_u16(
            transport_desc_mark,
            0xf000 | (sec.written_since(transport_desc_mark) - 2) as u16,
        );
        sec.patch_u16(
            ts_loop_mark,
            0xf000 | (sec.written_since(ts_loop_mark) - 2) as u16,
        );

        self.nit.write_section_syntax(
            wire,
            NIT_TID,
            self.cfg.original_network_id,
            self.cfg.tables_version,
            0,
            0,
            sec.bytes(),
        )
    }

    /// Emit the Time Offset Table. The TOT carries no extended syntax
    /// header, so the section is framed by hand and only CRC'd.
    pub(crate) fn write_tot(&mut self, wire: &mut WireWriter) -> Result<()> {
        let mut sec = SectionBuffer::new();
        sec.put_u8(TOT_TID)?;
        let len_mark = sec.skip(2)?;

        let now = self.cfg.utc_time.map(mjd_utc3).unwrap_or(DEFAULT_TIME);
        sec.put_slice(&now)?;

        let desc_mark = sec.skip(2)?;
        sec.put_u8(0x58)?; // local_time_offset_descriptor
        let lto_mark = sec.skip(1)?;
        sec.put_slice(&country_bytes(&self.cfg.country_code))?;
        sec.put_u8(
            self.cfg.local_time_offset_region << 2
                | 0x2
                | self.cfg.local_time_offset_polarity as u8,
        )?;
        sec.put_u16(self.cfg.local_time_offset)?;
        let change = self
            .cfg
            .time_of_change
            .map(mjd_utc3)
            .unwrap_or(DEFAULT_TIME_OF_CHANGE);
        sec.put_slice(&change)?;
        sec.put_u16(self.cfg.next_time_offset)?;
        sec.patch_u8(lto_mark, (sec.written_since(lto_mark) - 1) as u8);
        sec.patch_u16(desc_mark, 0xf000 | (sec.written_since(desc_mark) - 2) as u16);

        // section_length runs from after its own field through the CRC
        let body_after_len = sec.written_since(len_mark) - 2 + 4;
        sec.patch_u16(len_mark, 0xb000 | body_after_len as u16);

        self.tot.write_section(wire, sec.bytes())
    }

    /// Emit the Event Information Table: one present-event entry per
    /// service, with full component signaling for full-seg services.
    pub(crate) fn write_eit(&mut self, wire: &mut WireWriter) -> Result<()> {
        let mut sec = SectionBuffer::new();
        sec.put_u16(self.cfg.transport_stream_id)?;
        sec.put_u16(self.cfg.original_network_id)?;
        sec.put_u8(0)?; // segment_last_section_number
        sec.put_u8(EIT_TID)?; // last_table_id

        let start_time = self.cfg.utc_time.map(mjd_utc3).unwrap_or(DEFAULT_TIME);
        let (h, m, s) = self.cfg.event_duration;

        for service in &self.services {
            sec.put_u16(service.sid)?; // event_id
            sec.put_slice(&start_time)?;
            sec.put_slice(&[bcd(h), bcd(m), bcd(s)])?;
            let loop_mark = sec.skip(2)?;

            // short event descriptor
            sec.put_u8(0x4d)?;
            let se_mark = sec.skip(1)?;
            sec.put_slice(b"por")?;
            sec.put_str8(&self.cfg.event_name)?;
            sec.put_str8(&self.cfg.event_text)?;
            sec.patch_u8(se_mark, (sec.written_since(se_mark) - 1) as u8);

            // parental rating descriptor
            sec.put_u8(0x55)?;
            let pr_mark = sec.skip(1)?;
            sec.put_slice(&country_bytes(&self.cfg.country_code))?;
            sec.put_u8(self.cfg.parental_rating)?;
            sec.patch_u8(pr_mark, (sec.written_since(pr_mark) - 1) as u8);

            if !service.is_one_seg() {
                // component descriptor
                sec.put_u8(0x50)?;
                let comp_mark = sec.skip(1)?;
                sec.put_slice(&[0x05, 0xb3, 0x00])?;
                sec.put_slice(b"por")?;
                sec.put_slice(b"Video")?;
                sec.patch_u8(comp_mark, (sec.written_since(comp_mark) - 1) as u8);

                // audio component descriptor
                sec.put_u8(0xc4)?;
                let ac_mark = sec.skip(1)?;
                sec.put_slice(&[0x06, 0x03, 0x10, 0x53, 0xff, 0x00, 0x01, 0x01, 0x2f])?;
                sec.put_slice(b"por")?;
                sec.put_slice(b"Audio")?;
                sec.patch_u8(ac_mark, (sec.written_since(ac_mark) - 1) as u8);

                // content descriptor
                sec.put_u8(0x54)?;
                let cd_mark = sec.skip(1)?;
                sec.put_slice(&[0x02, 0xee])?;
                sec.patch_u8(cd_mark, (sec.written_since(cd_mark) - 1) as u8);
            }

            let running_status = 4u16;
            let free_ca_mode = 0u16;
            sec.patch_u16(
                loop_mark,
                running_status << 13
                    | free_ca_mode << 12
                    | (sec.written_since(loop_mark) - 2) as u16,
            );
        }

        // per-service EIT schedule: the table id extension carries a service
        // id rather than the tsid
        let ext = self.services.last().map(|s| s.sid).unwrap_or(0);
        self.eit.write_section_syntax(
            wire,
            EIT_TID,
            ext,
            self.cfg.tables_version,
            0,
            0,
            sec.bytes(),
        )
    }
}

/// ISDB-T UHF center frequency in 1/7 MHz units:
/// `(473 + 6 * (channel - 14) + 1/7) * 7`.
fn terrestrial_frequency(physical_channel: u16) -> u16 {
    (473 + 6 * (physical_channel - 14)) * 7 + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::StreamInfo;
    use crate::config::{MuxConfig, TransmissionProfile};
    use crate::mux::TS_PACKET_SIZE;
    use chrono::TimeZone;

    fn state(cfg: MuxConfig, streams: &[StreamInfo]) -> MuxState {
        MuxState::configure(cfg, streams).unwrap()
    }

    fn wire() -> WireWriter {
        WireWriter::new(1, 0, false)
    }

    /// Reassemble the section carried by consecutive cells of one table.
    fn section_bytes(out: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        for (i, cell) in out.chunks(TS_PACKET_SIZE).enumerate() {
            body.extend_from_slice(&cell[if i == 0 { 5 } else { 4 }..]);
        }
        body
    }

    #[test]
    fn test_stream_type_mapping() {
        let none = MuxFlags::default();
        assert_eq!(stream_type(CodecId::H264, none), 0x1b);
        assert_eq!(stream_type(CodecId::Hevc, none), 0x24);
        assert_eq!(stream_type(CodecId::Mp2, none), 0x03);
        assert_eq!(stream_type(CodecId::Aac, none), 0x0f);
        assert_eq!(stream_type(CodecId::Aac, MuxFlags::AAC_LATM), 0x11);
        assert_eq!(stream_type(CodecId::Ac3, none), 0x81);
        assert_eq!(stream_type(CodecId::Ac3, MuxFlags::SYSTEM_B), 0x06);
        assert_eq!(stream_type(CodecId::Opus, none), 0x06);
        assert_eq!(stream_type(CodecId::Dirac, none), 0xd1);
    }

    #[test]
    fn test_pat_lists_every_service() {
        let cfg = MuxConfig {
            transmission_profile: TransmissionProfile::FullSegOneSeg,
            original_network_id: 0x0640,
            ..MuxConfig::default()
        };
        let mut st = state(cfg, &[StreamInfo::new(CodecId::H264)]);
        let mut w = wire();
        st.write_pat(&mut w).unwrap();
        let body = section_bytes(&w.take());

        assert_eq!(body[0], 0x00); // table_id
        // program loop starts after the 8-byte header
        assert_eq!(&body[8..10], &0xC800u16.to_be_bytes());
        assert_eq!(&body[10..12], &(0xe000u16 | 0x1000).to_be_bytes());
        assert_eq!(&body[12..14], &0xC809u16.to_be_bytes());
        assert_eq!(&body[14..16], &(0xe000u16 | 0x1001).to_be_bytes());
    }

    #[test]
    fn test_pmt_stream_types_and_parental_rating() {
        let mut st = state(
            MuxConfig::default(),
            &[
                StreamInfo::new(CodecId::H264).with_pid(0x100),
                StreamInfo::new(CodecId::Mp2).with_pid(0x101),
            ],
        );
        let mut w = wire();
        st.write_pmt(&mut w, 0).unwrap();
        let body = section_bytes(&w.take());

        assert_eq!(body[0], 0x02); // table_id
        // PCR PID is the video stream
        assert_eq!(((body[8] as u16) << 8 | body[9] as u16) & 0x1fff, 0x100);
        // program descriptors hold the parental rating
        let program_info_len = ((body[10] as usize) << 8 | body[11] as usize) & 0xfff;
        let program_info = &body[12..12 + program_info_len];
        assert_eq!(program_info[0], 0x55);
        assert_eq!(program_info[1], 4);
        assert_eq!(&program_info[2..5], b"BRA");
        assert_eq!(program_info[5], 0x01);
        // stream loop
        let es = &body[12 + program_info_len..];
        assert_eq!(es[0], 0x1b);
        assert_eq!(((es[1] as u16) << 8 | es[2] as u16) & 0x1fff, 0x100);
        let es_info = ((es[3] as usize) << 8 | es[4] as usize) & 0xfff;
        let next = &es[5 + es_info..];
        assert_eq!(next[0], 0x03);
        assert_eq!(((next[1] as u16) << 8 | next[2] as u16) & 0x1fff, 0x101);
    }

    #[test]
    fn test_pmt_opus_descriptors() {
        let mut extra = vec![0u8; 19];
        extra[18] = 0; // RTP mapping family
        let mut st = state(
            MuxConfig::default(),
            &[StreamInfo::new(CodecId::Opus)
                .with_pid(0x100)
                .with_channels(2)
                .with_sample_rate(48_000)
                .with_extradata(extra)],
        );
        let mut w = wire();
        st.write_pmt(&mut w, 0).unwrap();
        let body = section_bytes(&w.take());

        let pos = body
            .windows(6)
            .position(|win| win == [0x05, 4, b'O', b'p', b'u', b's'])
            .expect("registration descriptor");
        assert_eq!(&body[pos + 6..pos + 10], &[0x7f, 2, 0x80, 2]);
    }

    #[test]
    fn test_pmt_language_descriptor() {
        let mut st = state(
            MuxConfig::default(),
            &[StreamInfo::new(CodecId::Aac)
                .with_pid(0x100)
                .with_language("por,eng")],
        );
        let mut w = wire();
        st.write_pmt(&mut w, 0).unwrap();
        let body = section_bytes(&w.take());

        let pos = body
            .windows(2)
            .position(|win| win == [0x0a, 8])
            .expect("language descriptor");
        assert_eq!(&body[pos + 2..pos + 5], b"por");
        assert_eq!(body[pos + 5], 0x00);
        assert_eq!(&body[pos + 6..pos + 9], b"eng");
    }

    #[test]
    fn test_sdt_service_types() {
        let cfg = MuxConfig {
            transmission_profile: TransmissionProfile::FullSegOneSeg,
            original_network_id: 0x0640,
            ..MuxConfig::default()
        };
        let mut st = state(cfg, &[StreamInfo::new(CodecId::H264)]);
        let mut w = wire();
        st.write_sdt(&mut w).unwrap();
        let body = section_bytes(&w.take());

        assert_eq!(body[0], 0x42);
        // reserved_future_use set in the length field
        assert_eq!(body[1] & 0xf0, 0xf0);
        assert_eq!(&body[8..10], &0x0640u16.to_be_bytes());
        assert_eq!(body[10], 0xff);

        // first service entry: full seg, type 0x01
        assert_eq!(&body[11..13], &0xC800u16.to_be_bytes());
        assert_eq!(body[16], 0x48);
        assert_eq!(body[18], 0x01);

        // second entry follows the first loop
        let loop_len = ((body[14] as usize) << 8 | body[15] as usize) & 0xfff;
        let second = &body[16 + loop_len..];
        assert_eq!(&second[0..2], &0xC809u16.to_be_bytes());
        assert_eq!(second[7], 0xC0); // one-seg service type
    }

    #[test]
    fn test_nit_partial_reception_only_for_one_seg() {
        let cfg = MuxConfig {
            transmission_profile: TransmissionProfile::TwoHdOneSeg,
            original_network_id: 0x0640,
            ..MuxConfig::default()
        };
        let mut st = state(cfg, &[StreamInfo::new(CodecId::H264)]);
        let mut w = wire();
        st.write_nit(&mut w).unwrap();
        let body = section_bytes(&w.take());

        assert_eq!(body[0], 0x40);
        assert_eq!(&body[3..5], &0x0640u16.to_be_bytes()); // network id

        // exactly one partial reception descriptor, for the one-seg sid
        let positions: Vec<usize> = body
            .windows(4)
            .enumerate()
            .filter(|(_, win)| win[0] == 0xfb && win[1] == 2)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(positions.len(), 1);
        let p = positions[0];
        assert_eq!(&body[p + 2..p + 4], &0xC80Cu16.to_be_bytes());
    }

    #[test]
    fn test_nit_terrestrial_frequency() {
        // channel 14 is 473 + 1/7 MHz
        assert_eq!(terrestrial_frequency(14), 473 * 7 + 1);
        // channel 20: 509.142857 MHz
        assert_eq!(terrestrial_frequency(20), (473 + 36) * 7 + 1);
    }

    #[test]
    fn test_tot_time_encoding() {
        let cfg = MuxConfig {
            // 2026-08-01 15:30:45 UTC is 12:30:45 UTC-3, MJD 61253
            utc_time: Utc.with_ymd_and_hms(2026, 8, 1, 15, 30, 45).single(),
            ..MuxConfig::default()
        };
        let mut st = state(cfg, &[StreamInfo::new(CodecId::H264)]);
        let mut w = wire();
        st.write_tot(&mut w).unwrap();
        let body = section_bytes(&w.take());

        assert_eq!(body[0], 0x73);
        let mjd = (body[3] as u16) << 8 | body[4] as u16;
        assert_eq!(mjd, 61253);
        assert_eq!(&body[5..8], &[0x12, 0x30, 0x45]);
        // local time offset descriptor with BRA
        assert_eq!(body[10], 0x58);
        assert_eq!(&body[12..15], b"BRA");
    }

    #[test]
    fn test_tot_crc_is_valid() {
        let mut st = state(MuxConfig::default(), &[StreamInfo::new(CodecId::H264)]);
        let mut w = wire();
        st.write_tot(&mut w).unwrap();
        let body = section_bytes(&w.take());
        let section_len = ((body[1] as usize) << 8 | body[2] as usize) & 0xfff;
        assert_eq!(crate::utils::crc32_mpeg2(&body[..3 + section_len]), 0);
    }

    #[test]
    fn test_eit_full_seg_gets_component_descriptors() {
        let cfg = MuxConfig {
            transmission_profile: TransmissionProfile::FullSegOneSeg,
            original_network_id: 0x0640,
            ..MuxConfig::default()
        };
        let mut st = state(cfg, &[StreamInfo::new(CodecId::H264)]);
        let mut w = wire();
        st.write_eit(&mut w).unwrap();
        let body = section_bytes(&w.take());

        assert_eq!(body[0], 0x4e);
        // table id extension carries a service id
        assert_eq!(&body[3..5], &0xC809u16.to_be_bytes());

        let count = |tag: u8, len: u8| {
            body.windows(2)
                .filter(|win| win[0] == tag && win[1] == len)
                .count()
        };
        // one component + one audio component + one content descriptor,
        // for the full-seg service only
        assert_eq!(count(0x50, 11), 1);
        assert_eq!(count(0xc4, 17), 1);
        assert_eq!(count(0x54, 2), 1);
    }

    #[test]
    fn test_mjd_reference_date() {
        // ETSI EN 300 468 annex C example: 1993-10-13 12:45:00 -> MJD 0xC079
        let dt = Utc.with_ymd_and_hms(1993, 10, 13, 15, 45, 0).unwrap();
        let bytes = mjd_utc3(dt);
        assert_eq!((bytes[0] as u16) << 8 | bytes[1] as u16, 0xC079);
        assert_eq!(&bytes[2..], &[0x12, 0x45, 0x00]);
    }
}
