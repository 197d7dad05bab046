//! UECP framing: data frame layout, CRC, byte stuffing and packet decoding.
//!
//! A packet on the wire is `0xFE`, the byte-stuffed frame
//! `addr(2) seq(1) msg_len(1) message(msg_len) crc(2)`, then `0xFF`.
//! The CRC covers the unescaped `addr..message` bytes.

use crate::error::{RadioError, Result};

pub const UECP_DATA_START: u8 = 0xFE;
pub const UECP_DATA_STOP: u8 = 0xFF;
pub const UECP_STUFFING: u8 = 0xFD;
pub const UECP_MSG_LEN_MAX: usize = 255;

// Message element codes
pub const MEC_PI: u8 = 0x01;
pub const MEC_PS: u8 = 0x02;
pub const MEC_TA_TP: u8 = 0x03;
pub const MEC_DI: u8 = 0x04;
pub const MEC_MS: u8 = 0x05;
pub const MEC_PTY: u8 = 0x07;
pub const MEC_RT: u8 = 0x0A;
pub const MEC_TMC: u8 = 0x30;
pub const MEC_ODA_DATA: u8 = 0x46;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UecpDataFrame {
    /// Site/encoder address; 0 addresses every encoder
    pub addr: u16,
    pub seq: u8,
    /// Message element code followed by its payload
    pub message: Vec<u8>,
}

impl UecpDataFrame {
    pub fn new(message: Vec<u8>) -> Self {
        debug_assert!(message.len() <= UECP_MSG_LEN_MAX);
        Self { addr: 0, seq: 0, message }
    }

    pub fn mec(&self) -> Option<u8> {
        self.message.first().copied()
    }

    /// Unescaped `addr seq msg_len message` bytes, without the CRC
    pub fn to_bytes(&self) -> Vec<u8> {
        let msg_len = self.message.len().min(UECP_MSG_LEN_MAX);
        let mut bytes = Vec::with_capacity(4 + msg_len);
        bytes.extend_from_slice(&self.addr.to_be_bytes());
        bytes.push(self.seq);
        bytes.push(msg_len as u8);
        bytes.extend_from_slice(&self.message[..msg_len]);
        bytes
    }

    /// Complete wire packet: CRC appended, stuffed, delimited
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = self.to_bytes();
        let crc = crc16_ccitt(&frame);
        frame.extend_from_slice(&crc.to_be_bytes());

        let mut packet = Vec::with_capacity(frame.len() + 8);
        packet.push(UECP_DATA_START);
        stuff(&frame, &mut packet);
        packet.push(UECP_DATA_STOP);
        packet
    }
}

/// CRC16-CCITT (polynomial 0x1021, initial value 0xFFFF, result inverted)
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    !crc
}

/// Escape every byte >= 0xFD as `0xFD, byte - 0xFD`
pub fn stuff(bytes: &[u8], out: &mut Vec<u8>) {
    for &byte in bytes {
        if byte >= UECP_STUFFING {
            out.push(UECP_STUFFING);
            out.push(byte - UECP_STUFFING);
        } else {
            out.push(byte);
        }
    }
}

/// Reverse of [`stuff`]
pub fn unstuff(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter();
    while let Some(&byte) = iter.next() {
        match byte {
            UECP_STUFFING => match iter.next() {
                Some(&escaped) if escaped <= 0x02 => out.push(UECP_STUFFING + escaped),
                Some(_) => return Err(RadioError::Uecp("invalid escape sequence")),
                None => return Err(RadioError::Uecp("truncated escape sequence")),
            },
            UECP_DATA_START | UECP_DATA_STOP => {
                return Err(RadioError::Uecp("unescaped delimiter inside frame"))
            }
            _ => out.push(byte),
        }
    }
    Ok(out)
}

/// Parse and verify one delimited packet
pub fn decode_packet(packet: &[u8]) -> Result<UecpDataFrame> {
    if packet.len() < 2 || packet[0] != UECP_DATA_START || packet[packet.len() - 1] != UECP_DATA_STOP {
        return Err(RadioError::Uecp("missing start/stop delimiter"));
    }

    let frame = unstuff(&packet[1..packet.len() - 1])?;
    if frame.len() < 6 {
        return Err(RadioError::Uecp("frame too short"));
    }

    let msg_len = frame[3] as usize;
    if frame.len() != 4 + msg_len + 2 {
        return Err(RadioError::Uecp("message length does not match frame"));
    }

    let body = &frame[..4 + msg_len];
    let crc = u16::from_be_bytes([frame[4 + msg_len], frame[5 + msg_len]]);
    if crc != crc16_ccitt(body) {
        return Err(RadioError::Uecp("CRC mismatch"));
    }

    Ok(UecpDataFrame {
        addr: u16::from_be_bytes([frame[0], frame[1]]),
        seq: frame[2],
        message: frame[4..4 + msg_len].to_vec(),
    })
}
