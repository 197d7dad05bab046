//! Demux consumer contract and the engine behind it.

pub mod engine;
pub mod queue;

pub use engine::{EngineState, StreamEngine};
pub use queue::{DemuxQueue, PushOutcome, QueueRead, MAX_PACKET_QUEUE};

use crate::dsp::{FmDemodulator, SignalLevels};
use crate::error::Result;
use crate::packet::{DemuxPacket, StreamProperties};

/// Wideband FM with RDS
pub type FmStream = StreamEngine<FmDemodulator>;

/// Pull interface offered to the player.
///
/// Radio streams are live, so seeking is unsupported and the reset, flush
/// and abort hooks default to no-ops.
pub trait RadioStream {
    fn can_seek(&self) -> bool {
        false
    }

    fn demux_read(&mut self) -> Result<Option<DemuxPacket>>;

    fn demux_reset(&mut self) {}

    fn demux_flush(&mut self) {}

    fn demux_abort(&mut self) {}

    /// Report every elementary stream the demuxer produces
    fn enum_properties(&self, callback: &mut dyn FnMut(&StreamProperties));

    fn signal_quality(&self) -> SignalLevels;

    fn close(&mut self);
}
