//! Demultiplexed packets and stream descriptors handed to the player.

/// Timestamp units per second.
pub const STREAM_TIME_BASE: i64 = 1_000_000;

/// DTS/PTS of the first packet and of every packet following a discontinuity.
pub const BASE_EPOCH: i64 = 0;

pub const STREAM_ID_AUDIO: i32 = 1;
pub const STREAM_ID_UECP: i32 = 2;
/// Reserved id of the discontinuity marker.
pub const STREAM_ID_STREAMCHANGE: i32 = -11;
/// Id carried by empty "nothing yet" packets.
pub const STREAM_ID_NONE: i32 = 0;

#[derive(Debug, Clone, PartialEq)]
pub struct DemuxPacket {
    pub stream_id: i32,
    /// Playback duration in `STREAM_TIME_BASE` units
    pub duration: i64,
    pub dts: i64,
    pub pts: i64,
    pub data: Vec<u8>,
}

impl DemuxPacket {
    /// Interleaved 16-bit little-endian PCM.
    ///
    /// `frames` is the per-channel sample count; duration is derived from it
    /// and the channel's fixed output rate.
    pub fn audio(samples: &[i16], frames: usize, sample_rate: u32, dts: i64) -> Self {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            data.extend_from_slice(&sample.to_le_bytes());
        }
        Self {
            stream_id: STREAM_ID_AUDIO,
            duration: frames_to_duration(frames, sample_rate),
            dts,
            pts: dts,
            data,
        }
    }

    pub fn uecp(packet: Vec<u8>, dts: i64) -> Self {
        Self {
            stream_id: STREAM_ID_UECP,
            duration: 0,
            dts,
            pts: dts,
            data: packet,
        }
    }

    /// Discontinuity marker; the consumer resets its clock to `BASE_EPOCH`.
    pub fn stream_change() -> Self {
        Self {
            stream_id: STREAM_ID_STREAMCHANGE,
            duration: 0,
            dts: BASE_EPOCH,
            pts: BASE_EPOCH,
            data: Vec::new(),
        }
    }

    /// No data available this call
    pub fn empty() -> Self {
        Self {
            stream_id: STREAM_ID_NONE,
            duration: 0,
            dts: BASE_EPOCH,
            pts: BASE_EPOCH,
            data: Vec::new(),
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_stream_change(&self) -> bool {
        self.stream_id == STREAM_ID_STREAMCHANGE
    }

    pub fn is_empty(&self) -> bool {
        self.stream_id == STREAM_ID_NONE && self.data.is_empty()
    }
}

pub fn frames_to_duration(frames: usize, sample_rate: u32) -> i64 {
    if sample_rate == 0 {
        return 0;
    }
    (frames as i64 * STREAM_TIME_BASE) / sample_rate as i64
}

/// Elementary stream descriptor reported through `enum_properties`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamProperties {
    pub codec: &'static str,
    pub stream_id: i32,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl StreamProperties {
    pub fn pcm_audio(channels: u16, sample_rate: u32) -> Self {
        Self {
            codec: "pcm_s16le",
            stream_id: STREAM_ID_AUDIO,
            channels,
            sample_rate,
            bits_per_sample: 16,
        }
    }

    pub fn rds() -> Self {
        Self {
            codec: "rds",
            stream_id: STREAM_ID_UECP,
            channels: 0,
            sample_rate: 0,
            bits_per_sample: 0,
        }
    }
}
