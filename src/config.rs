//! Channel settings validated before any thread is spawned.

use crate::error::{RadioError, Result};
use crate::stream::queue::MAX_PACKET_QUEUE;

/// librtlsdr accepts 225.001-300 kHz and 900.001 kHz-3.2 MHz
const SAMPLE_RATE_RANGES: [(u32, u32); 2] = [(225_001, 300_000), (900_001, 3_200_000)];
const MIN_FREQUENCY_HZ: u32 = 24_000_000;
const MAX_FREQUENCY_HZ: u32 = 1_766_000_000;
const MAX_PPM: i32 = 1000;

/// Tuner parameters applied once when a channel is opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunerSettings {
    pub frequency_hz: u32,
    pub sample_rate_hz: u32,
    /// Automatic gain control; `manual_gain` is ignored when set
    pub autogain: bool,
    /// Tenths of a dB, snapped to the device's gain table
    pub manual_gain: i32,
    pub freq_correction_ppm: i32,
}

impl Default for TunerSettings {
    fn default() -> Self {
        Self {
            frequency_hz: 99_100_000,
            sample_rate_hz: 1_920_000,
            autogain: true,
            manual_gain: 0,
            freq_correction_ppm: 0,
        }
    }
}

impl TunerSettings {
    pub fn validate(&self) -> Result<()> {
        if !(MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ).contains(&self.frequency_hz) {
            return Err(RadioError::config(format!(
                "frequency {} Hz outside tuner range {}-{} Hz",
                self.frequency_hz, MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ
            )));
        }

        if !SAMPLE_RATE_RANGES
            .iter()
            .any(|&(lo, hi)| (lo..=hi).contains(&self.sample_rate_hz))
        {
            return Err(RadioError::config(format!(
                "unsupported sample rate {} Hz",
                self.sample_rate_hz
            )));
        }

        if !self.autogain && self.manual_gain < 0 {
            return Err(RadioError::config(format!(
                "manual gain {} must not be negative",
                self.manual_gain
            )));
        }

        if self.freq_correction_ppm.abs() > MAX_PPM {
            return Err(RadioError::config(format!(
                "frequency correction {} ppm outside +/-{} ppm",
                self.freq_correction_ppm, MAX_PPM
            )));
        }

        Ok(())
    }
}

/// Engine sizing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Bytes per device callback (unsigned 8-bit I/Q, so always even)
    pub device_block_len: usize,
    /// Staging ring capacity in bytes; `None` picks the modulation's default
    pub ring_capacity: Option<usize>,
    /// Blocks held before the queue resynchronises
    pub max_queue_len: usize,
    /// Decode PI codes as North American call signs
    pub rbds: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device_block_len: 128 * 1024,
            ring_capacity: None,
            max_queue_len: MAX_PACKET_QUEUE,
            rbds: false,
        }
    }
}

impl EngineConfig {
    /// Check sizing against the DSP's input block (in bytes) and the ring
    /// capacity that will actually be used.
    pub fn validate(&self, dsp_block_bytes: usize, ring_capacity: usize) -> Result<()> {
        if self.device_block_len == 0 || self.device_block_len % 2 != 0 {
            return Err(RadioError::config(format!(
                "device block length {} must be a positive even byte count",
                self.device_block_len
            )));
        }

        if dsp_block_bytes == 0 {
            return Err(RadioError::config("DSP input block length is zero"));
        }

        // Worst case the ring holds one device block plus an incomplete DSP block
        let required = self.device_block_len + dsp_block_bytes;
        if ring_capacity < required {
            return Err(RadioError::config(format!(
                "ring capacity {} bytes below the {} bytes one device block needs",
                ring_capacity, required
            )));
        }

        if self.max_queue_len == 0 {
            return Err(RadioError::config("packet queue length must be at least 1"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        assert!(TunerSettings::default().validate().is_ok());
        assert!(EngineConfig::default().validate(96_000, 4 * 1024 * 1024).is_ok());
    }

    #[test]
    fn test_rejects_bad_sample_rate() {
        for rate in [0, 250_000 + 60_000, 900_000, 3_200_001] {
            let settings = TunerSettings {
                sample_rate_hz: rate,
                ..Default::default()
            };
            assert!(matches!(settings.validate(), Err(RadioError::Config(_))), "{}", rate);
        }
    }

    #[test]
    fn test_manual_gain_only_checked_without_agc() {
        let mut settings = TunerSettings {
            manual_gain: -10,
            ..Default::default()
        };
        assert!(settings.validate().is_ok());
        settings.autogain = false;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_engine_sizing() {
        let config = EngineConfig {
            device_block_len: 1000,
            ..Default::default()
        };
        assert!(config.validate(500, 1500).is_ok());
        assert!(config.validate(501, 1500).is_err());
        assert!(config.validate(0, 1500).is_err());

        let odd = EngineConfig {
            device_block_len: 1001,
            ..Default::default()
        };
        assert!(odd.validate(500, 4096).is_err());
    }
}
