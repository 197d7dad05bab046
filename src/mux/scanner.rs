use crossbeam::channel::{bounded, Receiver};

use super::{EventSink, MultiplexStatus, MuxDemodulator, MuxEvent};
use crate::error::{RadioError, Result};
use crate::input::{normalize_samples, IqSample};
use crate::ring_buffer::{RingBuffer, WIDEBAND_CAPACITY};

pub const DAB_SAMPLE_RATE: u32 = 2_048_000;
pub const HD_RADIO_SAMPLE_RATE: u32 = 1_488_375;

/// Events buffered between two drains
const EVENT_QUEUE_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiplexKind {
    Dab,
    HdRadio,
}

impl MultiplexKind {
    pub fn sample_rate(&self) -> u32 {
        match self {
            MultiplexKind::Dab => DAB_SAMPLE_RATE,
            MultiplexKind::HdRadio => HD_RADIO_SAMPLE_RATE,
        }
    }
}

pub type StatusCallback = Box<dyn FnMut(&MultiplexStatus) + Send>;

/// Feeds raw samples to a multiplex demodulator and republishes its
/// findings as [`MultiplexStatus`] snapshots.
///
/// Runs entirely on the caller's thread. Demodulator events go through a
/// bounded channel and are applied only after `process` has returned, so the
/// status callback never runs inside a demodulator frame.
pub struct MultiplexScanner<M: MuxDemodulator> {
    kind: MultiplexKind,
    demodulator: M,
    sink: EventSink,
    events: Receiver<MuxEvent>,
    ring: RingBuffer,
    staging: Vec<u8>,
    samples: Vec<IqSample>,
    status: MultiplexStatus,
    published: Option<MultiplexStatus>,
    callback: StatusCallback,
}

impl<M: MuxDemodulator> MultiplexScanner<M> {
    pub fn new(kind: MultiplexKind, demodulator: M, callback: StatusCallback) -> Result<Self> {
        if demodulator.sample_rate() != kind.sample_rate() {
            return Err(RadioError::config(format!(
                "{:?} scanning requires {} Hz, demodulator runs at {} Hz",
                kind,
                kind.sample_rate(),
                demodulator.sample_rate()
            )));
        }

        let block_bytes = demodulator.input_block_len() * 2;
        if block_bytes == 0 || block_bytes > WIDEBAND_CAPACITY {
            return Err(RadioError::config(format!(
                "demodulator block of {} bytes does not fit the {} byte ring",
                block_bytes, WIDEBAND_CAPACITY
            )));
        }

        let (tx, rx) = bounded(EVENT_QUEUE_DEPTH);
        Ok(Self {
            kind,
            demodulator,
            sink: EventSink::new(tx),
            events: rx,
            ring: RingBuffer::new(WIDEBAND_CAPACITY),
            staging: vec![0u8; block_bytes],
            samples: Vec::with_capacity(block_bytes / 2),
            status: MultiplexStatus::default(),
            published: None,
            callback,
        })
    }

    /// Sample rate the device must be tuned to
    pub fn sample_rate(&self) -> u32 {
        self.kind.sample_rate()
    }

    /// Latest status, published or not
    pub fn status(&self) -> &MultiplexStatus {
        &self.status
    }

    /// Sink for demodulators that post events from their own threads
    pub fn event_sink(&self) -> EventSink {
        self.sink.clone()
    }

    /// Consume raw unsigned 8-bit I/Q bytes of any length
    pub fn input_samples(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let count = data.len().min(self.ring.free());
            self.ring.put(&data[..count])?;
            data = &data[count..];

            while self.ring.len() >= self.staging.len() {
                self.ring.get(&mut self.staging);
                self.samples.clear();
                normalize_samples(&self.staging, 1.0, &mut self.samples);
                self.demodulator.process(&self.samples, &self.sink)?;
                self.drain_events();
            }
        }

        // Events posted from demodulator threads between blocks
        self.drain_events();
        Ok(())
    }

    fn drain_events(&mut self) {
        let pending: Vec<MuxEvent> = self.events.try_iter().collect();
        if pending.is_empty() {
            return;
        }

        for event in pending {
            log::trace!("{:?}", event);
            self.status.apply(event);
        }

        if self.published.as_ref() != Some(&self.status) {
            log::debug!(
                "{:?} status: sync={} name='{}' {} subchannels",
                self.kind,
                self.status.sync,
                self.status.name,
                self.status.subchannels.len()
            );
            (self.callback)(&self.status);
            self.published = Some(self.status.clone());
        }
    }
}
