//! Muxer state and the async byte-sink shell.
//!
//! [`MuxState`] holds every service, stream and timer and performs all cell
//! assembly synchronously against a [`WireWriter`]; [`TsMuxer`] wraps it
//! with the buffered async writer the caller hands in. Splitting the two
//! keeps the packetization logic testable without a runtime.

use super::scheduler::TableTimer;
use super::section::Section;
use super::topology::{self, Service};
use super::wire::WireWriter;
use super::{Muxer, EIT_PID, NIT_PID, PAT_PID, SDT_PID, TOT_PID, TS_PACKET_SIZE};
use crate::av::{CodecId, MediaType, Packet, StreamInfo};
use crate::codec::{aac, h264, hevc, opus, AdtsContext};
use crate::config::{M2tsMode, MuxConfig, MuxFlags};
use crate::utils::rescale;
use crate::{MuxError, Result};
use bytes::Bytes;
use tokio::io::{self, AsyncWrite, AsyncWriteExt};

/// Per-stream muxing state.
#[derive(Debug)]
pub(crate) struct StreamState {
    pub info: StreamInfo,
    pub service_index: usize,
    pub pid: u16,
    pub cc: u8,
    pub payload: Vec<u8>,
    pub payload_pts: Option<i64>,
    pub payload_dts: Option<i64>,
    pub payload_key: bool,
    pub first_pts_check: bool,
    pub prev_payload_key: bool,
    pub frames_written: u64,
    pub adts: Option<AdtsContext>,
    pub opus_queued_samples: u32,
    pub opus_pending_trim_start: u32,
}

/// Complete muxing state, independent of the byte sink.
pub(crate) struct MuxState {
    pub cfg: MuxConfig,
    pub mux_rate: i64,
    pub max_delay_90k: i64,
    pub m2ts: bool,
    pub services: Vec<Service>,
    pub streams: Vec<StreamState>,
    pub pat: Section,
    pub sdt: Section,
    pub nit: Section,
    pub tot: Section,
    pub eit: Section,
    pub pat_timer: TableTimer,
    pub sdt_timer: TableTimer,
    pub nit_timer: TableTimer,
    pub tot_timer: TableTimer,
    pub eit_timer: TableTimer,
}

fn resolve_m2ts(cfg: &MuxConfig) -> bool {
    match cfg.m2ts_mode {
        M2tsMode::On => true,
        M2tsMode::Off => false,
        M2tsMode::Auto => cfg
            .output_name
            .as_deref()
            .is_some_and(|name| name.ends_with(".m2ts")),
    }
}

impl MuxState {
    /// Build services, bind streams, assign PIDs and derive every
    /// retransmission period.
    pub fn configure(cfg: MuxConfig, streams: &[StreamInfo]) -> Result<Self> {
        let mux_rate = cfg.mux_rate.max(1);
        let m2ts = resolve_m2ts(&cfg);
        let mut services = topology::build_services(&cfg);

        let mut stream_states: Vec<StreamState> = Vec::with_capacity(streams.len());
        for (i, info) in streams.iter().enumerate() {
            let pid = if info.requested_pid < 16 {
                cfg.start_pid + i as u16
            } else if info.requested_pid < 0x1fff {
                info.requested_pid
            } else {
                return Err(MuxError::InvalidInput(format!(
                    "invalid stream pid {:#x}, must be less than 8191",
                    info.requested_pid
                )));
            };
            let service_index = i % services.len();
            if pid == services[service_index].pmt.pid {
                return Err(MuxError::InvalidInput(format!(
                    "stream pid {:#x} collides with a PMT pid",
                    pid
                )));
            }
            if stream_states.iter().any(|s| s.pid == pid) {
                return Err(MuxError::InvalidInput(format!("duplicate stream pid {:#x}", pid)));
            }

            let adts = match (info.codec, &info.extradata) {
                (CodecId::Aac, Some(extra)) if !extra.is_empty() => {
                    Some(AdtsContext::from_extradata(extra)?)
                }
                _ => None,
            };

            let opus_pending_trim_start = if info.codec == CodecId::Opus && info.sample_rate > 0 {
                (info.initial_padding as u64 * 48_000 / info.sample_rate as u64) as u32
            } else {
                0
            };

            stream_states.push(StreamState {
                info: info.clone(),
                service_index,
                pid,
                cc: 15,
                payload: Vec::with_capacity(cfg.pes_payload_size),
                payload_pts: None,
                payload_dts: None,
                payload_key: false,
                first_pts_check: true,
                prev_payload_key: false,
                frames_written: 0,
                adts,
                opus_queued_samples: 0,
                opus_pending_trim_start,
            });
        }

        // Designate the PCR carrier per service: first video stream wins,
        // else the first stream bound to the service.
        for stream in &stream_states {
            let service = &mut services[stream.service_index];
            if stream.info.media_type() == MediaType::Video && service.pcr_pid == 0x1fff {
                service.pcr_pid = stream.pid;
            }
        }
        for stream in &stream_states {
            let service = &mut services[stream.service_index];
            if service.pcr_pid == 0x1fff {
                service.pcr_pid = stream.pid;
            }
        }

        let bits_per_cell = (TS_PACKET_SIZE * 8) as i64;
        let (pat_period, sdt_period, nit_period, tot_period, eit_period);
        if mux_rate > 1 {
            let period = |ms: i64| (mux_rate * ms / (bits_per_cell * 1000)) as i32;
            for service in &mut services {
                service.pcr_packet_period = period(cfg.pcr_period_ms).max(1);
            }
            sdt_period = period(crate::config::SDT_RETRANS_TIME);
            pat_period = period(crate::config::PAT_RETRANS_TIME);
            nit_period = period(crate::config::NIT_RETRANS_TIME);
            tot_period = period(crate::config::TOT_RETRANS_TIME);
            eit_period = period(crate::config::EIT_RETRANS_TIME);
        } else {
            // VBR: fixed packet cadences, PAT/PMT also ride on key frames.
            sdt_period = 200;
            pat_period = 40;
            nit_period = 200;
            tot_period = 200;
            eit_period = 200;
            for (si, service) in services.iter_mut().enumerate() {
                let pcr_stream = stream_states
                    .iter()
                    .find(|s| s.service_index == si && s.pid == service.pcr_pid);
                service.pcr_packet_period = match pcr_stream {
                    Some(s) if s.info.media_type() == MediaType::Audio => {
                        // target at most one PCR gap of 100 ms
                        let frame = if s.info.frame_samples == 0 {
                            log::warn!("frame size not set");
                            512
                        } else {
                            s.info.frame_samples
                        };
                        (s.info.sample_rate / (10 * frame)) as i32
                    }
                    Some(s) => s.info.time_base.den / (10 * s.info.time_base.num),
                    None => 1,
                };
                if service.pcr_packet_period == 0 {
                    service.pcr_packet_period = 1;
                }
            }
        }

        // Emit a PCR as soon as possible.
        for service in &mut services {
            service.pcr_packet_count = service.pcr_packet_period;
        }

        let mut state = Self {
            mux_rate,
            max_delay_90k: rescale(cfg.max_delay_us, 90_000, 1_000_000),
            m2ts,
            services,
            streams: stream_states,
            pat: Section::new(PAT_PID),
            sdt: Section::new(SDT_PID),
            nit: Section::new(NIT_PID),
            tot: Section::new(TOT_PID),
            eit: Section::new(EIT_PID),
            pat_timer: TableTimer::default(),
            sdt_timer: TableTimer::default(),
            nit_timer: TableTimer::default(),
            tot_timer: TableTimer::default(),
            eit_timer: TableTimer::default(),
            cfg,
        };
        state.pat_timer.configure(pat_period, state.cfg.pat_period_s);
        state.sdt_timer.configure(sdt_period, state.cfg.sdt_period_s);
        state.nit_timer.configure(nit_period, state.cfg.nit_period_s);
        state.tot_timer.configure(tot_period, state.cfg.tot_period_s);
        state.eit_timer.configure(eit_period, state.cfg.eit_period_s);
        Ok(state)
    }

    /// The 27 MHz tick of the first wire byte in CBR mode.
    pub fn first_pcr(&self) -> i64 {
        if self.mux_rate > 1 && !self.cfg.copyts {
            rescale(self.cfg.max_delay_us, super::PCR_TIME_BASE, 1_000_000)
        } else {
            0
        }
    }

    /// Route one packet: preprocess, interleave, flush, buffer or emit.
    pub fn write_packet_internal(&mut self, wire: &mut WireWriter, pkt: &Packet) -> Result<()> {
        let idx = pkt.stream_index;
        if idx >= self.streams.len() {
            return Err(MuxError::InvalidInput(format!(
                "stream index {} out of range",
                idx
            )));
        }

        if self.cfg.flags.contains(MuxFlags::REEMIT_PAT_PMT) {
            self.pat_timer.force();
            self.sdt_timer.force();
            self.nit_timer.force();
            self.tot_timer.force();
            self.eit_timer.force();
            self.cfg.flags.remove(MuxFlags::REEMIT_PAT_PMT);
        }

        let delay2 = self.max_delay_90k * 2;
        let mut pts = pkt.pts;
        let mut dts = pkt.dts;
        if !self.cfg.copyts {
            pts = pts.map(|v| v + delay2);
            dts = dts.map(|v| v + delay2);
        }

        if self.streams[idx].first_pts_check && pts.is_none() {
            return Err(MuxError::InvalidInput("first pts value must be set".into()));
        }
        self.streams[idx].first_pts_check = false;

        let mut opus_samples = 0u32;
        let payload: Bytes = {
            let stream = &mut self.streams[idx];
            let data = &pkt.data;
            match stream.info.codec {
                CodecId::H264 => {
                    h264::check_startcode(data, stream.frames_written)?;
                    match h264::prepare_payload(data, pkt.is_key, stream.info.extradata.as_deref())
                    {
                        Some(fixed) => fixed,
                        None => data.clone(),
                    }
                }
                CodecId::Hevc => {
                    hevc::check_startcode(data, stream.frames_written)?;
                    data.clone()
                }
                CodecId::Aac => {
                    if data.len() < 2 {
                        return Err(MuxError::InvalidInput("AAC packet too short".into()));
                    }
                    if aac::is_adts(data) {
                        data.clone()
                    } else {
                        match &stream.adts {
                            Some(ctx) => ctx.wrap(data)?,
                            None => {
                                return Err(MuxError::UnsupportedFormat(
                                    "AAC bitstream not in ADTS format and extradata missing"
                                        .into(),
                                ))
                            }
                        }
                    }
                }
                CodecId::Opus => {
                    if data.len() < 2 {
                        return Err(MuxError::UnsupportedFormat("Opus packet too short".into()));
                    }
                    if opus::is_control_prefixed(data) {
                        log::warn!("got TS-formatted Opus data, unhandled");
                        data.clone()
                    } else {
                        opus_samples = opus::packet_samples(data);
                        let trim_end = if pkt.trim_end > 0 && stream.info.sample_rate > 0 {
                            (pkt.trim_end as u64 * 48_000 / stream.info.sample_rate as u64) as u32
                        } else {
                            pkt.trim_end
                        };
                        opus::control_header(
                            data,
                            opus_samples,
                            &mut stream.opus_pending_trim_start,
                            trim_end,
                        )
                    }
                }
                _ => data.clone(),
            }
        };

        // Age out sibling payloads that would fall behind the mux delay.
        if let Some(d) = dts {
            for j in 0..self.streams.len() {
                let stale = {
                    let s = &self.streams[j];
                    !s.payload.is_empty()
                        && s.payload_dts.map_or(true, |pd| d - pd > delay2 / 2)
                };
                if stale {
                    self.flush_stream(wire, j, pkt.stream_id)?;
                }
            }
        }

        let flush_current = {
            let s = &self.streams[idx];
            !s.payload.is_empty()
                && (s.payload.len() + payload.len() > self.cfg.pes_payload_size
                    || matches!((dts, s.payload_dts), (Some(d), Some(pd))
                        if d - pd >= self.max_delay_90k)
                    || s.opus_queued_samples + opus_samples >= opus::MAX_QUEUED_SAMPLES)
        };
        if flush_current {
            self.flush_stream(wire, idx, pkt.stream_id)?;
        }

        if self.streams[idx].info.media_type() != MediaType::Audio
            || payload.len() > self.cfg.pes_payload_size
        {
            // video, subtitle and oversize audio go out as one PES each
            self.write_pes(wire, idx, &payload, pts, dts, pkt.is_key, pkt.stream_id)?;
            self.streams[idx].opus_queued_samples = 0;
        } else {
            let stream = &mut self.streams[idx];
            if stream.payload.is_empty() {
                stream.payload_pts = pts;
                stream.payload_dts = dts;
                stream.payload_key = pkt.is_key;
            }
            stream.payload.extend_from_slice(&payload);
            stream.opus_queued_samples += opus_samples;
        }

        self.streams[idx].frames_written += 1;
        Ok(())
    }

    /// Emit a stream's buffered payload as one PES and reset the buffer.
    fn flush_stream(
        &mut self,
        wire: &mut WireWriter,
        index: usize,
        stream_id: Option<u8>,
    ) -> Result<()> {
        let stream = &mut self.streams[index];
        let payload = std::mem::take(&mut stream.payload);
        let (pts, dts, key) = (stream.payload_pts, stream.payload_dts, stream.payload_key);
        self.write_pes(wire, index, &payload, pts, dts, key, stream_id)?;
        let stream = &mut self.streams[index];
        stream.payload = payload;
        stream.payload.clear();
        stream.opus_queued_samples = 0;
        Ok(())
    }

    /// Flush every pending payload.
    pub fn flush_all(&mut self, wire: &mut WireWriter) -> Result<()> {
        for j in 0..self.streams.len() {
            if !self.streams[j].payload.is_empty() {
                self.flush_stream(wire, j, None)?;
            }
        }
        Ok(())
    }
}

/// MPEG-TS muxer writing to an async byte sink.
///
/// ```rust,no_run
/// use isdbt_mux::{MuxConfig, Muxer, TsMuxer};
/// use isdbt_mux::av::{CodecId, Packet, StreamInfo};
///
/// # async fn example() -> isdbt_mux::Result<()> {
/// let sink: Vec<u8> = Vec::new();
/// let mut muxer = TsMuxer::new(sink, MuxConfig::default());
/// muxer
///     .write_header(&[StreamInfo::new(CodecId::H264)])
///     .await?;
/// let frame = vec![0x00, 0x00, 0x00, 0x01, 0x65, 0x88];
/// muxer
///     .write_packet(&Packet::new(frame).with_pts(0).with_key_flag(true))
///     .await?;
/// muxer.write_trailer().await?;
/// # Ok(())
/// # }
/// ```
pub struct TsMuxer<W: AsyncWrite + Unpin + Send> {
    stream_writer: io::BufWriter<W>,
    cfg: Option<MuxConfig>,
    inner: Option<(WireWriter, MuxState)>,
}

impl<W: AsyncWrite + Unpin + Send> TsMuxer<W> {
    /// Creates a muxer over `writer` with the given configuration.
    pub fn new(writer: W, cfg: MuxConfig) -> Self {
        Self {
            stream_writer: io::BufWriter::new(writer),
            cfg: Some(cfg),
            inner: None,
        }
    }

    /// Consume the muxer and return the underlying writer.
    ///
    /// Call [`Muxer::write_trailer`] first so buffered cells are flushed.
    pub fn into_inner(self) -> W {
        self.stream_writer.into_inner()
    }

    fn parts(&mut self) -> Result<(&mut WireWriter, &mut MuxState)> {
        match &mut self.inner {
            Some((wire, state)) => Ok((wire, state)),
            None => Err(MuxError::InvalidInput(
                "write_header must be called first".into(),
            )),
        }
    }

    async fn drain(&mut self) -> Result<()> {
        let staged = match &mut self.inner {
            Some((wire, _)) => wire.take(),
            None => return Ok(()),
        };
        if !staged.is_empty() {
            self.stream_writer.write_all(&staged).await?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl<W: AsyncWrite + Unpin + Send> Muxer for TsMuxer<W> {
    async fn write_header(&mut self, streams: &[StreamInfo]) -> Result<()> {
        let cfg = self
            .cfg
            .take()
            .ok_or_else(|| MuxError::InvalidInput("write_header already called".into()))?;
        let state = MuxState::configure(cfg, streams)?;
        let wire = WireWriter::new(state.mux_rate, state.first_pcr(), state.m2ts);

        if state.mux_rate == 1 {
            log::debug!("muxrate VBR");
        } else {
            log::debug!("muxrate {}", state.mux_rate);
        }

        self.inner = Some((wire, state));
        Ok(())
    }

    async fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        let (wire, state) = self.parts()?;
        state.write_packet_internal(wire, packet)?;
        self.drain().await?;
        self.stream_writer.flush().await?;
        Ok(())
    }

    async fn write_trailer(&mut self) -> Result<()> {
        if let Ok((wire, state)) = self.parts() {
            state.flush_all(wire)?;
        }
        self.drain().await?;
        self.stream_writer.flush().await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if let Ok((wire, state)) = self.parts() {
            state.flush_all(wire)?;
        }
        self.drain().await?;
        self.stream_writer.flush().await?;
        Ok(())
    }
}
