use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use chrono::{DateTime, Duration, Local};
use hound::{SampleFormat, WavSpec, WavWriter};

use crate::error::{RadioError, Result};
use crate::modulation::Modulation;
use crate::packet::{DemuxPacket, StreamProperties, STREAM_ID_AUDIO};

/// Writes the demuxer's `pcm_s16le` audio packets to a WAV file
pub struct PcmRecorder {
    writer: WavWriter<BufWriter<File>>,
    channels: u16,
    sample_rate: u32,
    frames: u64,
}

impl PcmRecorder {
    pub fn create<P: AsRef<Path>>(path: P, audio: &StreamProperties) -> Result<Self> {
        if audio.stream_id != STREAM_ID_AUDIO || audio.bits_per_sample != 16 || audio.channels == 0 {
            return Err(RadioError::config(format!("cannot record '{}' stream", audio.codec)));
        }

        let spec = WavSpec {
            channels: audio.channels,
            sample_rate: audio.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        Ok(Self {
            writer: WavWriter::create(path, spec)?,
            channels: audio.channels,
            sample_rate: audio.sample_rate,
            frames: 0,
        })
    }

    /// Append an audio packet; other streams and markers are ignored
    pub fn write_packet(&mut self, packet: &DemuxPacket) -> Result<()> {
        if packet.stream_id != STREAM_ID_AUDIO {
            return Ok(());
        }

        for bytes in packet.data.chunks_exact(2) {
            self.writer.write_sample(i16::from_le_bytes([bytes[0], bytes[1]]))?;
        }
        self.frames += (packet.data.len() / 2 / self.channels as usize) as u64;
        Ok(())
    }

    /// Frames written so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }

    pub fn finalize(self) -> Result<()> {
        self.writer.finalize()?;
        Ok(())
    }
}

/// Recording file name for a channel, stamped `offset_secs` after `base_time`
pub fn generate_filename(
    modulation: Modulation,
    frequency_hz: u32,
    base_time: DateTime<Local>,
    offset_secs: f64,
) -> String {
    let start = base_time + Duration::milliseconds((offset_secs * 1000.0) as i64);

    format!(
        "{}_{:.3}MHz_{}.wav",
        modulation.name().to_lowercase().replace(' ', ""),
        frequency_hz as f64 / 1e6,
        start.format("%Y-%m-%d_%H-%M-%S")
    )
}
