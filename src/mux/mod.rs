//! Multiplex (DAB ensemble / HD Radio station) scanning.

pub mod scanner;

pub use scanner::{MultiplexKind, MultiplexScanner, DAB_SAMPLE_RATE, HD_RADIO_SAMPLE_RATE};

use crossbeam::channel::{Sender, TrySendError};

use crate::error::Result;
use crate::input::IqSample;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subchannel {
    pub number: u32,
    pub name: String,
}

/// Consolidated view of a multiplex, published only when it changes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiplexStatus {
    pub sync: bool,
    /// Ensemble label (DAB) or station name (HD Radio SIS)
    pub name: String,
    /// Ordered by subchannel number
    pub subchannels: Vec<Subchannel>,
}

impl MultiplexStatus {
    /// Apply one event; returns whether anything observable changed
    pub fn apply(&mut self, event: MuxEvent) -> bool {
        match event {
            MuxEvent::Sync(sync) => {
                let changed = self.sync != sync;
                self.sync = sync;
                changed
            }
            MuxEvent::ServiceDetected(number) => match self.find(number) {
                Ok(_) => false,
                Err(pos) => {
                    self.subchannels.insert(
                        pos,
                        Subchannel {
                            number,
                            name: String::new(),
                        },
                    );
                    true
                }
            },
            MuxEvent::EnsembleLabel(label) => {
                let label = label.trim_end().to_string();
                let changed = self.name != label;
                self.name = label;
                changed
            }
            MuxEvent::ServiceLabel { number, label } => {
                let label = label.trim_end().to_string();
                match self.find(number) {
                    Ok(pos) if self.subchannels[pos].name == label => false,
                    Ok(pos) => {
                        self.subchannels[pos].name = label;
                        true
                    }
                    Err(pos) => {
                        self.subchannels.insert(pos, Subchannel { number, name: label });
                        true
                    }
                }
            }
        }
    }

    fn find(&self, number: u32) -> std::result::Result<usize, usize> {
        self.subchannels.binary_search_by_key(&number, |s| s.number)
    }
}

/// Notifications raised by a multiplex demodulator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuxEvent {
    /// Sync acquired (`true`) or lost (`false`)
    Sync(bool),
    ServiceDetected(u32),
    /// DAB ensemble label or HD Radio SIS station name
    EnsembleLabel(String),
    /// DAB service label or HD Radio SIG program name
    ServiceLabel { number: u32, label: String },
}

/// Write end of the scanner's event channel.
///
/// Posting never blocks; when the channel is full the event is dropped.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<MuxEvent>,
}

impl EventSink {
    pub(crate) fn new(tx: Sender<MuxEvent>) -> Self {
        Self { tx }
    }

    pub fn post(&self, event: MuxEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => log::warn!("Multiplex event queue full, dropping {:?}", event),
            Err(TrySendError::Disconnected(_)) => log::debug!("Multiplex scanner gone, event dropped"),
        }
    }
}

/// Standard-specific demodulator driven by [`MultiplexScanner`].
///
/// Implementations report what they find through the sink (which may be
/// cloned into their own threads) and must not call back into the scanner.
pub trait MuxDemodulator: Send {
    /// The only sample rate the demodulator accepts
    fn sample_rate(&self) -> u32;

    /// I/Q samples per `process` call
    fn input_block_len(&self) -> usize;

    fn process(&mut self, samples: &[IqSample], events: &EventSink) -> Result<()>;
}
