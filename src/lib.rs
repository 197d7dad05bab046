//! Real-time RTL-SDR radio streaming.
//!
//! Raw 8-bit I/Q from a tuner is staged, normalised and demodulated into
//! timestamped PCM packets behind a pull-based demux interface, alongside
//! RDS metadata re-encoded as UECP, multiplex scanning for DAB / HD Radio,
//! and an FFT signal meter.

pub mod config;
pub mod dsp;
pub mod error;
pub mod input;
pub mod modulation;
pub mod mux;
pub mod output;
pub mod packet;
pub mod rds;
pub mod ring_buffer;
pub mod signal_meter;
pub mod stream;

pub use config::{EngineConfig, TunerSettings};
pub use error::{RadioError, Result};
pub use modulation::{Modulation, ReadWait};
pub use packet::{DemuxPacket, StreamProperties};
pub use ring_buffer::RingBuffer;
pub use signal_meter::{SignalMeter, SignalPlotProps, SignalStatus};
pub use stream::{EngineState, RadioStream, StreamEngine};
