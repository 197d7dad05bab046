//! Demodulator/resampler contract.
//!
//! The streaming engine treats every modulation's numeric pipeline as an
//! opaque stage behind [`DspStage`]; only the plain FM stages used by the
//! command line tool live in this crate.

pub mod filter;
pub mod fm;

pub use filter::{blackman_window, FirFilter};
pub use fm::FmDemodulator;

use crate::error::Result;
use crate::input::IqSample;
use crate::modulation::Modulation;
use crate::rds::RdsGroup;

/// Signal quality as reported by a demodulator
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SignalLevels {
    /// 0-100
    pub quality: i32,
    /// dB
    pub snr: i32,
}

/// Modulation policy plugged into `StreamEngine`.
pub trait DspStage: Send {
    fn modulation(&self) -> Modulation;

    /// Number of I/Q samples handed to each `process` call
    fn input_block_len(&self) -> usize;

    /// Normalised samples span `[-sample_scale, sample_scale]`
    fn sample_scale(&self) -> f32 {
        1.0
    }

    /// Demodulate one block, appending interleaved PCM to `output`.
    ///
    /// Returns the number of frames (samples per channel) produced, which may
    /// be zero for modulations that buffer internally.
    fn process(&mut self, input: &[IqSample], output: &mut Vec<i16>) -> Result<usize>;

    /// Fixed PCM output rate in Hz
    fn output_rate(&self) -> u32;

    fn output_channels(&self) -> u16 {
        1
    }

    fn signal_levels(&self) -> SignalLevels;

    /// DAB reports whether the ensemble is synchronised; others are always locked
    fn is_locked(&self) -> bool {
        true
    }

    /// Move any RDS groups decoded since the last call into `out`
    fn take_rds_groups(&mut self, _out: &mut Vec<RdsGroup>) {}
}
