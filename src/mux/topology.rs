//! ISDB-Tb service topology.
//!
//! Services are instantiated from the transmission profile. Service ids pack
//! the network id, a segment-type tag and a program index:
//! `sid = (onid & 0x7FF) << 5 | type_bits << 3 | index`, where the type bits
//! tag one-seg partial-reception services. Bits 3..4 of a sid therefore
//! identify one-seg services for the SDT, NIT and EIT builders.

use super::section::Section;
use crate::config::{MuxConfig, TransmissionProfile};

/// One broadcast service (program) in the multiplex.
#[derive(Debug)]
pub struct Service {
    /// Service id
    pub sid: u16,
    /// Service name announced in the SDT
    pub name: String,
    /// Provider name announced in the SDT
    pub provider_name: String,
    /// PMT section context (PID + continuity counter)
    pub pmt: Section,
    /// PID carrying this service's PCR; 0x1FFF until a stream is designated
    pub pcr_pid: u16,
    /// Cells since the last PCR on the PCR PID
    pub pcr_packet_count: i32,
    /// Cells between PCRs on the PCR PID
    pub pcr_packet_period: i32,
}

impl Service {
    fn new(sid: u16, provider_name: &str, name: &str, pmt_pid: u16) -> Self {
        Self {
            sid,
            name: name.to_string(),
            provider_name: provider_name.to_string(),
            pmt: Section::new(pmt_pid),
            pcr_pid: 0x1fff,
            pcr_packet_count: 0,
            pcr_packet_period: 0,
        }
    }

    /// Whether this is a one-seg partial-reception service.
    pub fn is_one_seg(&self) -> bool {
        is_one_seg_sid(self.sid)
    }
}

/// One-seg services carry a non-zero segment-type tag in sid bits 3..4.
pub fn is_one_seg_sid(sid: u16) -> bool {
    sid & 0x18 != 0
}

fn full_seg_sid(onid: u16, index: u16) -> u16 {
    (onid & 0x7ff) << 5 | index
}

fn one_seg_sid(onid: u16, index: u16) -> u16 {
    (onid & 0x7ff) << 5 | 0x1 << 3 | index
}

/// Instantiate the services of the configured transmission profile, with
/// PMT PIDs assigned sequentially from `pmt_start_pid`.
pub fn build_services(cfg: &MuxConfig) -> Vec<Service> {
    let onid = cfg.original_network_id;
    let provider = cfg.provider_name.as_str();
    let mut services = Vec::new();
    let add = |services: &mut Vec<Service>, sid, name: &str| {
        let pmt_pid = cfg.pmt_start_pid + services.len() as u16;
        services.push(Service::new(sid, provider, name, pmt_pid));
    };

    match cfg.transmission_profile {
        TransmissionProfile::FullSegOneSeg => {
            add(&mut services, full_seg_sid(onid, 0), "SVC HD Full Seg");
            add(&mut services, one_seg_sid(onid, 1), "SVC LD 1-Seg");
        }
        TransmissionProfile::FourSdOneSeg => {
            for i in 0..4 {
                add(&mut services, full_seg_sid(onid, i), &format!("SVC SD - {}", i + 1));
            }
            add(&mut services, one_seg_sid(onid, 4), "SVC LD 1-Seg");
        }
        TransmissionProfile::TwoHdOneSeg => {
            for i in 0..2 {
                add(&mut services, full_seg_sid(onid, i), &format!("SVC HD - {}", i + 1));
            }
            add(&mut services, one_seg_sid(onid, 4), "SVC LD 1-Seg");
        }
        TransmissionProfile::Single => {
            add(&mut services, cfg.service_id, &cfg.service_name);
        }
    }

    services
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(profile: TransmissionProfile, onid: u16) -> MuxConfig {
        MuxConfig {
            transmission_profile: profile,
            original_network_id: onid,
            ..MuxConfig::default()
        }
    }

    #[test]
    fn test_profile_full_seg_plus_one_seg() {
        let services = build_services(&cfg(TransmissionProfile::FullSegOneSeg, 0x0640));
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].sid, 0xC800);
        assert_eq!(services[1].sid, 0xC809);
        assert!(!services[0].is_one_seg());
        assert!(services[1].is_one_seg());
    }

    #[test]
    fn test_profile_two_hd_plus_one_seg() {
        let services = build_services(&cfg(TransmissionProfile::TwoHdOneSeg, 0x0640));
        let sids: Vec<u16> = services.iter().map(|s| s.sid).collect();
        assert_eq!(sids, vec![0xC800, 0xC801, 0xC80C]);
        assert_eq!(
            services.iter().filter(|s| s.is_one_seg()).count(),
            1
        );
    }

    #[test]
    fn test_profile_four_sd_plus_one_seg() {
        let services = build_services(&cfg(TransmissionProfile::FourSdOneSeg, 0x0640));
        assert_eq!(services.len(), 5);
        let sids: Vec<u16> = services.iter().map(|s| s.sid).collect();
        assert_eq!(sids, vec![0xC800, 0xC801, 0xC802, 0xC803, 0xC80C]);
        // pairwise distinct
        let mut dedup = sids.clone();
        dedup.sort_unstable();
        dedup.dedup();
        assert_eq!(dedup.len(), sids.len());
    }

    #[test]
    fn test_single_profile_uses_configured_sid() {
        let mut c = cfg(TransmissionProfile::Single, 1);
        c.service_id = 0x4242;
        c.service_name = "My Service".into();
        let services = build_services(&c);
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].sid, 0x4242);
        assert_eq!(services[0].name, "My Service");
        assert!(!services[0].is_one_seg());
    }

    #[test]
    fn test_pmt_pids_are_sequential() {
        let services = build_services(&cfg(TransmissionProfile::FourSdOneSeg, 0x0640));
        for (i, service) in services.iter().enumerate() {
            assert_eq!(service.pmt.pid, 0x1000 + i as u16);
        }
    }
}
