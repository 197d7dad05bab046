//! RDS group decoding into UECP packets.

pub mod decoder;
pub mod rbds;
pub mod uecp;

pub use decoder::RdsUecpEncoder;
pub use uecp::{decode_packet, UecpDataFrame};

/// One RDS group: blocks A, B, C (or C') and D.
pub type RdsGroup = [u16; 4];
