//! Fixed-capacity circular byte buffer.
//!
//! Bridges a bursty producer (device blocks) and a consumer that pulls in
//! its own block size. Storage is allocated once; `put` never grows it.

use crate::error::{RadioError, Result};

/// 256 KiB, sized for narrowband streams.
pub const NARROWBAND_CAPACITY: usize = 256 * 1024;

/// 4 MiB, enough for more than a second of 8-bit I/Q at 2.048 MHz.
pub const WIDEBAND_CAPACITY: usize = 4 * 1024 * 1024;

pub struct RingBuffer {
    buffer: Box<[u8]>,
    /// Next write position
    head: usize,
    /// Next read position
    tail: usize,
    len: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            tail: 0,
            len: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of bytes that can be written before an overrun.
    #[inline]
    pub fn free(&self) -> usize {
        self.capacity() - self.len
    }

    /// Copy all of `data` in at the head.
    ///
    /// Fails without writing anything if `data` does not fit; callers size the
    /// buffer for their largest burst.
    pub fn put(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > self.free() {
            return Err(RadioError::RingBufferOverrun {
                requested: data.len(),
                free: self.free(),
            });
        }
        if data.is_empty() {
            return Ok(());
        }

        let first = data.len().min(self.capacity() - self.head);
        self.buffer[self.head..self.head + first].copy_from_slice(&data[..first]);
        let rest = data.len() - first;
        if rest > 0 {
            self.buffer[..rest].copy_from_slice(&data[first..]);
        }

        self.head = self.advance(self.head, data.len());
        self.len += data.len();
        Ok(())
    }

    /// Copy up to `out.len()` bytes from the tail into `out`.
    ///
    /// Returns the number of bytes copied, which is less than requested only
    /// when the buffer holds fewer bytes.
    pub fn get(&mut self, out: &mut [u8]) -> usize {
        let count = out.len().min(self.len);
        if count == 0 {
            return 0;
        }

        let first = count.min(self.capacity() - self.tail);
        out[..first].copy_from_slice(&self.buffer[self.tail..self.tail + first]);
        let rest = count - first;
        if rest > 0 {
            out[first..count].copy_from_slice(&self.buffer[..rest]);
        }

        self.tail = self.advance(self.tail, count);
        self.len -= count;
        count
    }

    /// Drop up to `count` bytes from the tail without copying them.
    pub fn skip(&mut self, count: usize) -> usize {
        let count = count.min(self.len);
        self.tail = self.advance(self.tail, count);
        self.len -= count;
        count
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.len = 0;
    }

    #[inline]
    fn advance(&self, index: usize, count: usize) -> usize {
        let next = index + count;
        if next >= self.capacity() {
            next - self.capacity()
        } else {
            next
        }
    }
}
