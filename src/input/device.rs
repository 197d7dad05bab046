//! Tuner device contract consumed by the streaming engine.

use crate::error::Result;

/// Receives each raw block of unsigned 8-bit interleaved I/Q from `read_async`.
pub type BlockCallback<'a> = dyn FnMut(&[u8]) + 'a;

/// Common interface for tuner devices.
///
/// Every method takes `&self`: the engine's worker thread sits inside
/// `read_async` while the owning thread calls `cancel_async` (and, at run
/// time, the gain setters), so implementations synchronise internally.
pub trait DeviceSource: Send + Sync {
    /// Get device name/description
    fn name(&self) -> &str;

    /// Prepare the device for streaming (e.g. reset its sample buffer)
    fn begin_stream(&self) -> Result<()>;

    /// Unblock a running `read_async`.
    ///
    /// Must be safe to call while the callback is executing and when no
    /// stream is active.
    fn cancel_async(&self);

    /// Synchronous read; returns the number of bytes written into `buffer`
    fn read(&self, buffer: &mut [u8]) -> Result<usize>;

    /// Stream blocks of `block_len` bytes into `callback` until cancelled.
    ///
    /// Blocks the calling thread. Returns `Ok(())` after `cancel_async`, or
    /// the first device error.
    fn read_async(&self, block_len: usize, callback: &mut BlockCallback<'_>) -> Result<()>;

    fn set_center_frequency(&self, hz: u32) -> Result<()>;

    fn set_sample_rate(&self, hz: u32) -> Result<()>;

    /// Frequency correction in parts per million
    fn set_frequency_correction(&self, ppm: i32) -> Result<()>;

    /// Manual tuner gain in tenths of a dB; should be a value from `valid_gains`
    fn set_gain(&self, tenth_db: i32) -> Result<()>;

    fn set_automatic_gain_control(&self, enable: bool) -> Result<()>;

    /// Gains supported by the tuner, ascending, in tenths of a dB
    fn valid_gains(&self) -> Vec<i32>;
}

/// Find the table entry closest to `requested`.
///
/// Linear scan in table order; on a tie the earlier entry wins. An empty
/// table leaves the request unchanged.
pub fn nearest_gain(gains: &[i32], requested: i32) -> i32 {
    gains
        .iter()
        .min_by_key(|&&g| (g - requested).abs())
        .copied()
        .unwrap_or(requested)
}

#[cfg(test)]
mod tests {
    use super::*;

    const R820T: &[i32] = &[0, 9, 14, 27, 37, 77, 87, 125, 144, 157];

    #[test]
    fn test_nearest_gain_exact_and_between() {
        assert_eq!(nearest_gain(R820T, 37), 37);
        assert_eq!(nearest_gain(R820T, 80), 77);
        assert_eq!(nearest_gain(R820T, 1000), 157);
        assert_eq!(nearest_gain(R820T, -50), 0);
    }

    #[test]
    fn test_nearest_gain_tie_prefers_earlier_entry() {
        assert_eq!(nearest_gain(&[10, 20], 15), 10);
        assert_eq!(nearest_gain(&[20, 10], 15), 20);
    }

    #[test]
    fn test_nearest_gain_empty_table() {
        assert_eq!(nearest_gain(&[], 42), 42);
    }
}
