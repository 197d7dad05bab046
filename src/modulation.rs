use std::fmt;
use std::time::Duration;

use crate::ring_buffer::{NARROWBAND_CAPACITY, WIDEBAND_CAPACITY};

/// Bounded waits used by modulations that do not produce audio on every block.
pub const HD_RADIO_READ_TIMEOUT: Duration = Duration::from_millis(100);
pub const DAB_UNLOCKED_READ_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modulation {
    /// Wideband FM broadcast
    Fm,
    /// HD Radio hybrid digital
    HdRadio,
    /// DAB / DAB+
    Dab,
    /// Narrowband FM weather band
    Wx,
}

/// How the consumer waits for the next block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadWait {
    /// Wait until data arrives or the worker stops
    Blocking,
    /// Give up after the timeout and return an empty packet
    Timeout(Duration),
}

impl Modulation {
    pub fn name(&self) -> &'static str {
        match self {
            Modulation::Fm => "FM",
            Modulation::HdRadio => "HD Radio",
            Modulation::Dab => "DAB",
            Modulation::Wx => "WX",
        }
    }

    /// Whether the channel also carries an RDS metadata stream
    pub fn has_rds(&self) -> bool {
        matches!(self, Modulation::Fm)
    }

    /// Capacity of the engine's staging ring buffer
    pub fn ring_capacity(&self) -> usize {
        match self {
            Modulation::Wx => NARROWBAND_CAPACITY,
            _ => WIDEBAND_CAPACITY,
        }
    }

    /// FM, WX and locked DAB produce data continuously; HD Radio and
    /// unlocked DAB may legitimately have nothing for a while.
    pub fn read_wait(&self, locked: bool) -> ReadWait {
        match self {
            Modulation::Fm | Modulation::Wx => ReadWait::Blocking,
            Modulation::HdRadio => ReadWait::Timeout(HD_RADIO_READ_TIMEOUT),
            Modulation::Dab if locked => ReadWait::Blocking,
            Modulation::Dab => ReadWait::Timeout(DAB_UNLOCKED_READ_TIMEOUT),
        }
    }
}

impl fmt::Display for Modulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
