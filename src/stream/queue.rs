//! Bounded hand-off between the device callback (single writer) and the
//! demux reader (single consumer).

use std::collections::VecDeque;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::error::RadioError;
use crate::modulation::ReadWait;

/// Default queue bound, in blocks
pub const MAX_PACKET_QUEUE: usize = 200;

/// What `push` did with the block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Appended,
    /// The queue was full and has been replaced by a single resync placeholder
    Resynced,
    /// The queue is stopped
    Rejected,
}

/// Result of a consumer read
#[derive(Debug)]
pub enum QueueRead<T> {
    Block(T),
    /// Discontinuity placeholder
    Resync,
    /// Bounded wait elapsed with nothing queued
    TimedOut,
    /// Producer has stopped and the queue is drained. Carries the producer's
    /// error the first time it is reported, `None` afterwards.
    Stopped(Option<RadioError>),
}

struct QueueState<T> {
    /// `None` entries are resync placeholders
    items: VecDeque<Option<T>>,
    stopped: bool,
    error: Option<RadioError>,
    resyncs: u64,
}

pub struct DemuxQueue<T> {
    state: Mutex<QueueState<T>>,
    cond: Condvar,
    max_len: usize,
}

impl<T> DemuxQueue<T> {
    pub fn new(max_len: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(max_len.max(1)),
                stopped: false,
                error: None,
                resyncs: 0,
            }),
            cond: Condvar::new(),
            max_len: max_len.max(1),
        }
    }

    /// Append a block, or a resync placeholder when `item` is `None`.
    ///
    /// Never waits on the condition variable. When the queue already holds
    /// `max_len` entries the whole backlog (and `item`) is discarded in
    /// favour of one resync placeholder: catching up block by block would
    /// only stretch the audible desync.
    pub fn push(&self, item: Option<T>) -> PushOutcome {
        let mut state = self.state.lock();
        if state.stopped {
            return PushOutcome::Rejected;
        }

        let outcome = if state.items.len() >= self.max_len {
            state.items.clear();
            state.items.push_back(None);
            state.resyncs += 1;
            PushOutcome::Resynced
        } else {
            if item.is_none() {
                state.resyncs += 1;
            }
            state.items.push_back(item);
            PushOutcome::Appended
        };

        drop(state);
        self.cond.notify_all();
        outcome
    }

    /// Mark the producer as finished; nothing more will be appended
    pub fn stop(&self) {
        self.state.lock().stopped = true;
        self.cond.notify_all();
    }

    /// Stop with an error for the consumer. Only the first error is kept.
    pub fn fail(&self, error: RadioError) {
        let mut state = self.state.lock();
        if state.error.is_none() && !state.stopped {
            state.error = Some(error);
        } else {
            log::debug!("Discarding secondary producer error: {}", error);
        }
        state.stopped = true;
        drop(state);
        self.cond.notify_all();
    }

    /// Next item. A bounded wait covers the whole call, however many
    /// wakeups it takes.
    pub fn pop(&self, wait: ReadWait) -> QueueRead<T> {
        let deadline = match wait {
            ReadWait::Blocking => None,
            ReadWait::Timeout(timeout) => Some(Instant::now() + timeout),
        };
        let mut state = self.state.lock();

        while state.items.is_empty() && !state.stopped {
            match deadline {
                None => self.cond.wait(&mut state),
                Some(deadline) => {
                    if self.cond.wait_until(&mut state, deadline).timed_out()
                        && state.items.is_empty()
                        && !state.stopped
                    {
                        return QueueRead::TimedOut;
                    }
                }
            }
        }

        match state.items.pop_front() {
            Some(Some(block)) => QueueRead::Block(block),
            Some(None) => QueueRead::Resync,
            None => QueueRead::Stopped(state.error.take()),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of resync placeholders queued so far
    pub fn resyncs(&self) -> u64 {
        self.state.lock().resyncs
    }
}
