use std::collections::VecDeque;

use super::rbds;
use super::uecp::{
    UecpDataFrame, MEC_DI, MEC_MS, MEC_ODA_DATA, MEC_PI, MEC_PS, MEC_PTY, MEC_RT, MEC_TA_TP, MEC_TMC,
};
use super::RdsGroup;

/// RadioText+ application id
pub const AID_RTPLUS: u16 = 0x4BD7;
/// Traffic Message Channel application ids
pub const AID_TMC: u16 = 0xCD46;
pub const AID_TMC_ALT: u16 = 0xCD47;

/// Data set / program service numbers; 0 means "current"
const DSN: u8 = 0;
const PSN: u8 = 0;

const PS_LEN: usize = 8;
const PS_COMPLETE: u8 = 0b1111;
const RT_LEN: usize = 64;
const CR: u8 = 0x0D;

/// Pending packets beyond this are dropped oldest-first
const MAX_PENDING_PACKETS: usize = 64;

/// Decoder state accumulated across groups
struct RdsState {
    pi: Option<u16>,
    pty: Option<u8>,
    callsign: Option<String>,
    ta_tp: Option<u8>,
    ms: Option<u8>,
    di: u8,
    di_ready: u8,
    last_di: Option<u8>,

    ps: [u8; PS_LEN],
    ps_ready: u8,

    rt: [u8; RT_LEN],
    rt_ready: u16,
    rt_ab: Option<u8>,
    rt_version_b: bool,

    /// Group type code (type << 1 | version) carrying each ODA, once announced
    rtplus_group: Option<u8>,
    tmc_group: Option<u8>,
}

impl RdsState {
    fn new() -> Self {
        Self {
            pi: None,
            pty: None,
            callsign: None,
            ta_tp: None,
            ms: None,
            di: 0,
            di_ready: 0,
            last_di: None,
            ps: [b' '; PS_LEN],
            ps_ready: 0,
            rt: [0; RT_LEN],
            rt_ready: 0,
            rt_ab: None,
            rt_version_b: false,
            rtplus_group: None,
            tmc_group: None,
        }
    }

    fn clear_text(&mut self) {
        self.ps = [b' '; PS_LEN];
        self.ps_ready = 0;
        self.rt = [0; RT_LEN];
        self.rt_ready = 0;
        self.rt_ab = None;
        self.di_ready = 0;
    }
}

/// Turns RDS groups into a FIFO of UECP packets.
///
/// Packets are produced purely as a side effect of [`decode_group`]; the
/// consumer pops them without blocking.
///
/// [`decode_group`]: RdsUecpEncoder::decode_group
pub struct RdsUecpEncoder {
    rbds: bool,
    state: RdsState,
    packets: VecDeque<Vec<u8>>,
}

impl RdsUecpEncoder {
    /// `rbds` enables North American call sign derivation from the PI code
    pub fn new(rbds: bool) -> Self {
        Self {
            rbds,
            state: RdsState::new(),
            packets: VecDeque::new(),
        }
    }

    pub fn decode_group(&mut self, group: &RdsGroup) {
        let [block_a, block_b, block_c, block_d] = *group;
        let group_type = ((block_b >> 12) & 0x0F) as u8;
        let version_b = (block_b >> 11) & 0x01 == 1;
        let group_code = (group_type << 1) | u8::from(version_b);

        // PI and PTY are carried by every group
        self.decode_pi(block_a);
        self.decode_pty(block_b);

        if self.state.rtplus_group == Some(group_code) {
            return self.decode_rtplus(block_b, block_c, block_d);
        }
        if self.state.tmc_group == Some(group_code) {
            return self.decode_tmc(block_b, block_c, block_d);
        }

        match (group_type, version_b) {
            (0, _) => self.decode_basic_tuning(block_b, block_d),
            (2, _) => self.decode_radiotext(block_b, block_c, block_d, version_b),
            (3, false) => self.decode_oda_identification(block_b, block_d),
            _ => {}
        }
    }

    /// Next completed UECP packet, if any
    pub fn pop_packet(&mut self) -> Option<Vec<u8>> {
        self.packets.pop_front()
    }

    pub fn program_identification(&self) -> Option<u16> {
        self.state.pi
    }

    /// RBDS call sign for the current PI, when it falls in a mapped range
    pub fn callsign(&self) -> Option<&str> {
        self.state.callsign.as_deref()
    }

    fn emit(&mut self, message: Vec<u8>) {
        if self.packets.len() >= MAX_PENDING_PACKETS {
            self.packets.pop_front();
        }
        self.packets.push_back(UecpDataFrame::new(message).encode());
    }

    fn decode_pi(&mut self, pi: u16) {
        if self.state.pi == Some(pi) {
            return;
        }
        if self.state.pi.is_some() {
            // New station; partially received text belongs to the old one
            self.state.clear_text();
        }
        self.state.pi = Some(pi);

        if self.rbds {
            self.state.callsign = rbds::callsign(pi);
            if let Some(call) = &self.state.callsign {
                log::debug!("RBDS PI {:04X} -> {}", pi, call);
            }
        }

        let [hi, lo] = pi.to_be_bytes();
        self.emit(vec![MEC_PI, DSN, PSN, hi, lo]);
    }

    fn decode_pty(&mut self, block_b: u16) {
        let pty = ((block_b >> 5) & 0x1F) as u8;
        if self.state.pty != Some(pty) {
            self.state.pty = Some(pty);
            self.emit(vec![MEC_PTY, DSN, PSN, pty]);
        }
    }

    /// Group 0: program service name plus TA/TP, MS and DI flags
    fn decode_basic_tuning(&mut self, block_b: u16, block_d: u16) {
        let ta_tp = (((block_b >> 10) & 0x01) << 1 | ((block_b >> 4) & 0x01)) as u8;
        if self.state.ta_tp != Some(ta_tp) {
            self.state.ta_tp = Some(ta_tp);
            self.emit(vec![MEC_TA_TP, DSN, PSN, ta_tp]);
        }

        let ms = ((block_b >> 3) & 0x01) as u8;
        if self.state.ms != Some(ms) {
            self.state.ms = Some(ms);
            self.emit(vec![MEC_MS, DSN, PSN, ms]);
        }

        let address = (block_b & 0x03) as usize;

        // DI bit d3 arrives with segment 0, d0 with segment 3
        let di_bit = ((block_b >> 2) & 0x01) as u8;
        let shift = 3 - address;
        self.state.di = (self.state.di & !(1 << shift)) | (di_bit << shift);
        self.state.di_ready |= 1 << address;
        if self.state.di_ready == PS_COMPLETE {
            self.state.di_ready = 0;
            if self.state.last_di != Some(self.state.di) {
                self.state.last_di = Some(self.state.di);
                self.emit(vec![MEC_DI, DSN, PSN, self.state.di]);
            }
        }

        let [first, second] = block_d.to_be_bytes();
        self.state.ps[address * 2] = first;
        self.state.ps[address * 2 + 1] = second;
        self.state.ps_ready |= 1 << address;

        if self.state.ps_ready == PS_COMPLETE {
            self.state.ps_ready = 0;
            let mut message = vec![MEC_PS, DSN, PSN];
            message.extend_from_slice(&self.state.ps);
            self.emit(message);
        }
    }

    /// Group 2: RadioText
    fn decode_radiotext(&mut self, block_b: u16, block_c: u16, block_d: u16, version_b: bool) {
        let ab = ((block_b >> 4) & 0x01) as u8;

        // A toggled A/B flag (or a switch between 2A and 2B) announces new text
        if self.state.rt_ab != Some(ab) || self.state.rt_version_b != version_b {
            self.state.rt = [0; RT_LEN];
            self.state.rt_ready = 0;
            self.state.rt_ab = Some(ab);
            self.state.rt_version_b = version_b;
        }

        let (segment_count, segment_len): (usize, usize) = if version_b { (8, 2) } else { (16, 4) };
        let address = (block_b & 0x0F) as usize;
        if address >= segment_count {
            return;
        }

        let [c_hi, c_lo] = block_c.to_be_bytes();
        let [d_hi, d_lo] = block_d.to_be_bytes();
        let received = [c_hi, c_lo, d_hi, d_lo];
        // 2B carries two characters in block D only
        let chars = if version_b { &received[2..] } else { &received[..] };

        let start = address * segment_len;
        self.state.rt[start..start + segment_len].copy_from_slice(chars);
        self.state.rt_ready |= 1 << address;

        // A carriage return ends the text early: segments after it will never
        // arrive, so mark the ones still missing as complete and blank
        if chars.contains(&CR) {
            for segment in address + 1..segment_count {
                if self.state.rt_ready & (1 << segment) == 0 {
                    let slot = segment * segment_len;
                    self.state.rt[slot..slot + segment_len].fill(0);
                    self.state.rt_ready |= 1 << segment;
                }
            }
        }

        let complete: u16 = if segment_count == 16 { 0xFFFF } else { (1 << segment_count) - 1 };
        if self.state.rt_ready == complete {
            self.state.rt_ready = 0;

            let text_len = segment_count * segment_len;
            let text = &self.state.rt[..text_len];
            let end = text.iter().position(|&b| b == CR || b == 0).unwrap_or(text_len);

            let mut message = Vec::with_capacity(5 + end);
            message.extend_from_slice(&[MEC_RT, DSN, PSN, (end + 1) as u8, ab]);
            message.extend_from_slice(&text[..end]);
            self.emit(message);
        }
    }

    /// Group 3A: announces which group type carries an open data application
    fn decode_oda_identification(&mut self, block_b: u16, block_d: u16) {
        let app_group = (block_b & 0x1F) as u8;
        if app_group == 0 {
            return;
        }

        match block_d {
            AID_RTPLUS => {
                if self.state.rtplus_group != Some(app_group) {
                    log::debug!("RT+ carried in group {}{}", app_group >> 1, group_version(app_group));
                    self.state.rtplus_group = Some(app_group);
                }
            }
            AID_TMC | AID_TMC_ALT => {
                if self.state.tmc_group != Some(app_group) {
                    log::debug!("TMC carried in group {}{}", app_group >> 1, group_version(app_group));
                    self.state.tmc_group = Some(app_group);
                }
            }
            _ => {}
        }
    }

    fn decode_rtplus(&mut self, block_b: u16, block_c: u16, block_d: u16) {
        let [aid_hi, aid_lo] = AID_RTPLUS.to_be_bytes();
        let [c_hi, c_lo] = block_c.to_be_bytes();
        let [d_hi, d_lo] = block_d.to_be_bytes();
        self.emit(vec![
            MEC_ODA_DATA,
            aid_hi,
            aid_lo,
            5,
            (block_b & 0x1F) as u8,
            c_hi,
            c_lo,
            d_hi,
            d_lo,
        ]);
    }

    fn decode_tmc(&mut self, block_b: u16, block_c: u16, block_d: u16) {
        let [c_hi, c_lo] = block_c.to_be_bytes();
        let [d_hi, d_lo] = block_d.to_be_bytes();
        self.emit(vec![MEC_TMC, 5, (block_b & 0x1F) as u8, c_hi, c_lo, d_hi, d_lo]);
    }
}

fn group_version(code: u8) -> char {
    if code & 0x01 == 0 {
        'A'
    } else {
        'B'
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rds::uecp::decode_packet;

    const PI: u16 = 0x354E;

    fn block_b(group_type: u16, version_b: bool, low: u16) -> u16 {
        (group_type << 12) | (u16::from(version_b) << 11) | (low & 0x07FF)
    }

    fn ps_group(address: u16, text: &[u8; 2]) -> RdsGroup {
        [PI, block_b(0, false, address), 0, u16::from_be_bytes(*text)]
    }

    fn rt_group(address: u16, ab: u16, text: &[u8; 4]) -> RdsGroup {
        [
            PI,
            block_b(2, false, (ab << 4) | address),
            u16::from_be_bytes([text[0], text[1]]),
            u16::from_be_bytes([text[2], text[3]]),
        ]
    }

    fn drain(encoder: &mut RdsUecpEncoder) -> Vec<UecpDataFrame> {
        std::iter::from_fn(|| encoder.pop_packet())
            .map(|p| decode_packet(&p).unwrap())
            .collect()
    }

    fn with_mec(frames: &[UecpDataFrame], mec: u8) -> Vec<&UecpDataFrame> {
        frames.iter().filter(|f| f.mec() == Some(mec)).collect()
    }

    #[test]
    fn test_ps_assembles_in_any_order() {
        let quadrants: [(u16, &[u8; 2]); 4] = [(0, b"KO"), (1, b"DI"), (2, b"  "), (3, b"  ")];
        let orders = [[0, 1, 2, 3], [3, 2, 1, 0], [2, 0, 3, 1], [1, 3, 0, 2]];

        for order in orders {
            let mut encoder = RdsUecpEncoder::new(false);
            for idx in order {
                let (address, text) = quadrants[idx];
                encoder.decode_group(&ps_group(address, text));
            }
            let frames = drain(&mut encoder);
            let ps = with_mec(&frames, MEC_PS);
            assert_eq!(ps.len(), 1, "order {:?}", order);
            assert_eq!(&ps[0].message[3..], b"KODI    ");
        }
    }

    #[test]
    fn test_ps_incomplete_emits_nothing() {
        let mut encoder = RdsUecpEncoder::new(false);
        encoder.decode_group(&ps_group(0, b"KO"));
        encoder.decode_group(&ps_group(1, b"DI"));
        encoder.decode_group(&ps_group(1, b"DI"));
        encoder.decode_group(&ps_group(3, b"  "));
        let frames = drain(&mut encoder);
        assert!(with_mec(&frames, MEC_PS).is_empty());
    }

    #[test]
    fn test_pi_and_pty_are_edge_triggered() {
        let mut encoder = RdsUecpEncoder::new(false);
        let group = [PI, block_b(15, true, 10 << 5), 0, 0];
        encoder.decode_group(&group);
        encoder.decode_group(&group);
        encoder.decode_group(&group);

        let frames = drain(&mut encoder);
        let pi = with_mec(&frames, MEC_PI);
        assert_eq!(pi.len(), 1);
        assert_eq!(&pi[0].message[3..], &[0x35, 0x4E]);
        let pty = with_mec(&frames, MEC_PTY);
        assert_eq!(pty.len(), 1);
        assert_eq!(pty[0].message[3], 10);

        encoder.decode_group(&[PI, block_b(15, true, 11 << 5), 0, 0]);
        let frames = drain(&mut encoder);
        assert_eq!(with_mec(&frames, MEC_PTY).len(), 1);
        assert!(with_mec(&frames, MEC_PI).is_empty());
    }

    #[test]
    fn test_rt_full_sixteen_segments() {
        let text = b"Now playing: Radiohead - Paranoid Android on the best radio stn!";
        let mut encoder = RdsUecpEncoder::new(false);
        for address in 0..16u16 {
            let seg = &text[address as usize * 4..address as usize * 4 + 4];
            encoder.decode_group(&rt_group(address, 0, &[seg[0], seg[1], seg[2], seg[3]]));
        }
        let frames = drain(&mut encoder);
        let rt = with_mec(&frames, MEC_RT);
        assert_eq!(rt.len(), 1);
        assert_eq!(rt[0].message[3] as usize, text.len() + 1);
        assert_eq!(rt[0].message[4], 0);
        assert_eq!(&rt[0].message[5..], &text[..]);
    }

    #[test]
    fn test_rt_carriage_return_completes_early() {
        let mut encoder = RdsUecpEncoder::new(false);
        encoder.decode_group(&rt_group(0, 1, b"Hell"));
        encoder.decode_group(&rt_group(1, 1, b"o wo"));
        encoder.decode_group(&rt_group(2, 1, b"rld "));
        assert!(with_mec(&drain(&mut encoder), MEC_RT).is_empty());

        encoder.decode_group(&rt_group(3, 1, b"ok\r\0"));
        let frames = drain(&mut encoder);
        let rt = with_mec(&frames, MEC_RT);
        assert_eq!(rt.len(), 1);
        assert_eq!(rt[0].message[4], 1);
        assert_eq!(&rt[0].message[5..], b"Hello world ok");
    }

    #[test]
    fn test_rt_carriage_return_zero_fills_later_segments() {
        let mut encoder = RdsUecpEncoder::new(false);
        encoder.decode_group(&rt_group(3, 0, b"d\r  "));
        assert_eq!(encoder.state.rt_ready, 0xFFF8);
        assert!(encoder.state.rt[16..].iter().all(|&b| b == 0));
        assert_eq!(&encoder.state.rt[12..16], b"d\r  ");

        encoder.decode_group(&rt_group(0, 0, b"Lore"));
        encoder.decode_group(&rt_group(1, 0, b"m ip"));
        encoder.decode_group(&rt_group(2, 0, b"sum "));
        let frames = drain(&mut encoder);
        let rt = with_mec(&frames, MEC_RT);
        assert_eq!(rt.len(), 1);
        assert_eq!(&rt[0].message[5..], b"Lorem ipsum d");
    }

    #[test]
    fn test_rt_ab_toggle_discards_partial_text() {
        let mut encoder = RdsUecpEncoder::new(false);
        for address in 0..8u16 {
            encoder.decode_group(&rt_group(address, 0, b"xxxx"));
        }
        // Flag flips: everything so far is stale
        for address in 8..16u16 {
            encoder.decode_group(&rt_group(address, 1, b"yyyy"));
        }
        assert!(with_mec(&drain(&mut encoder), MEC_RT).is_empty());

        for address in 0..8u16 {
            encoder.decode_group(&rt_group(address, 1, b"zzzz"));
        }
        let frames = drain(&mut encoder);
        let rt = with_mec(&frames, MEC_RT);
        assert_eq!(rt.len(), 1);
        assert_eq!(&rt[0].message[5..37], &[b'z'; 32][..]);
        assert_eq!(&rt[0].message[37..], &[b'y'; 32][..]);
    }

    #[test]
    fn test_rt_group_b_uses_eight_segments() {
        let mut encoder = RdsUecpEncoder::new(false);
        for address in 0..8u16 {
            let group = [PI, block_b(2, true, address), PI, u16::from_be_bytes(*b"ab")];
            encoder.decode_group(&group);
        }
        let frames = drain(&mut encoder);
        let rt = with_mec(&frames, MEC_RT);
        assert_eq!(rt.len(), 1);
        assert_eq!(&rt[0].message[5..], b"abababababababab");
    }

    #[test]
    fn test_oda_registration_redirects_groups() {
        let mut encoder = RdsUecpEncoder::new(false);
        // 3A announcing RT+ in group 11A (code 22)
        encoder.decode_group(&[PI, block_b(3, false, 22), 0, AID_RTPLUS]);
        encoder.decode_group(&[PI, block_b(11, false, 0x0012), 0x1234, 0x5678]);

        let frames = drain(&mut encoder);
        let oda = with_mec(&frames, MEC_ODA_DATA);
        assert_eq!(oda.len(), 1);
        assert_eq!(&oda[0].message[1..], &[0x4B, 0xD7, 5, 0x12, 0x12, 0x34, 0x56, 0x78]);

        // TMC announced in 8A (code 16)
        encoder.decode_group(&[PI, block_b(3, false, 16), 0, AID_TMC]);
        encoder.decode_group(&[PI, block_b(8, false, 0x0005), 0xAAAA, 0x5555]);
        let frames = drain(&mut encoder);
        let tmc = with_mec(&frames, MEC_TMC);
        assert_eq!(tmc.len(), 1);
        assert_eq!(&tmc[0].message[1..], &[5, 0x05, 0xAA, 0xAA, 0x55, 0x55]);
    }

    #[test]
    fn test_rbds_callsign() {
        let mut encoder = RdsUecpEncoder::new(true);
        encoder.decode_group(&ps_group(0, b"KO"));
        assert_eq!(encoder.callsign(), Some("KODI"));

        let mut plain = RdsUecpEncoder::new(false);
        plain.decode_group(&ps_group(0, b"KO"));
        assert_eq!(plain.callsign(), None);
        assert_eq!(plain.program_identification(), Some(PI));
    }

    #[test]
    fn test_ta_tp_and_di() {
        let mut encoder = RdsUecpEncoder::new(false);
        // TP=1, TA=1, DI bit set only on segment 0 (d3)
        let flags = (1 << 10) | (1 << 4);
        for address in 0..4u16 {
            let di = if address == 0 { 1 << 2 } else { 0 };
            encoder.decode_group(&[PI, block_b(0, false, flags | di | address), 0, 0x2020]);
        }
        let frames = drain(&mut encoder);
        let ta_tp = with_mec(&frames, MEC_TA_TP);
        assert_eq!(ta_tp.len(), 1);
        assert_eq!(ta_tp[0].message[3], 0b11);
        let di = with_mec(&frames, MEC_DI);
        assert_eq!(di.len(), 1);
        assert_eq!(di[0].message[3], 0b1000);
    }
}
