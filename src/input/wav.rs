use hound::{SampleFormat, WavReader};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::device::{BlockCallback, DeviceSource};
use crate::error::{RadioError, Result};

/// Replays an SDR++ I/Q WAV recording as if it were a tuner.
///
/// SDR++ saves IQ as stereo: I=left channel, Q=right channel. The whole
/// recording is quantised to unsigned 8-bit pairs on open, which is what a
/// real RTL-SDR delivers.
pub struct WavDevice {
    name: String,
    samples: Vec<u8>,
    sample_rate: u32,
    position: Mutex<usize>,
    realtime: bool,
    looped: bool,
    cancelled: AtomicBool,
}

impl WavDevice {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = WavReader::open(path)?;
        let spec = reader.spec();

        if spec.channels != 2 {
            return Err(RadioError::config(format!(
                "expected stereo WAV (I/Q), got {} channels",
                spec.channels
            )));
        }

        let samples = match spec.sample_format {
            SampleFormat::Float => read_float_samples(reader)?,
            SampleFormat::Int => read_int_samples(reader, spec.bits_per_sample)?,
        };

        log::info!(
            "Loaded {} I/Q samples at {} Hz from {}",
            samples.len() / 2,
            spec.sample_rate,
            path.display()
        );

        Ok(Self {
            name: format!("wav {}", path.display()),
            samples,
            sample_rate: spec.sample_rate,
            position: Mutex::new(0),
            realtime: true,
            looped: false,
            cancelled: AtomicBool::new(false),
        })
    }

    /// Deliver blocks as fast as the consumer takes them instead of at the recording's rate
    pub fn unpaced(mut self) -> Self {
        self.realtime = false;
        self
    }

    /// Restart from the beginning at end of file instead of ending the stream
    pub fn looped(mut self) -> Self {
        self.looped = true;
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl DeviceSource for WavDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn begin_stream(&self) -> Result<()> {
        self.cancelled.store(false, Ordering::SeqCst);
        *self.position.lock() = 0;
        Ok(())
    }

    fn cancel_async(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn read(&self, buffer: &mut [u8]) -> Result<usize> {
        let mut position = self.position.lock();
        let count = buffer.len().min(self.samples.len() - *position);
        buffer[..count].copy_from_slice(&self.samples[*position..*position + count]);
        *position += count;
        Ok(count)
    }

    fn read_async(&self, block_len: usize, callback: &mut BlockCallback<'_>) -> Result<()> {
        if block_len == 0 {
            return Err(RadioError::config("block length must be non-zero"));
        }
        let block_time = Duration::from_secs_f64(block_len as f64 / 2.0 / self.sample_rate as f64);
        let mut block = vec![0u8; block_len];
        let mut deadline = Instant::now();

        while !self.cancelled.load(Ordering::SeqCst) {
            let count = self.read(&mut block)?;
            if count < block_len {
                if !self.looped {
                    // A trailing partial block is not a device block
                    log::info!("{}: end of recording ({} trailing bytes dropped)", self.name, count);
                    break;
                }
                *self.position.lock() = 0;
                let rest = self.read(&mut block[count..])?;
                if count + rest < block_len {
                    return Err(RadioError::config("recording is shorter than one block"));
                }
            }

            callback(&block);

            if self.realtime {
                deadline += block_time;
                let now = Instant::now();
                if deadline > now {
                    std::thread::sleep(deadline - now);
                }
            }
        }
        Ok(())
    }

    fn set_center_frequency(&self, _hz: u32) -> Result<()> {
        Ok(())
    }

    fn set_sample_rate(&self, hz: u32) -> Result<()> {
        if hz != self.sample_rate {
            log::warn!(
                "{}: recording is {} Hz, requested {} Hz; replaying at the recorded rate",
                self.name,
                self.sample_rate,
                hz
            );
        }
        Ok(())
    }

    fn set_frequency_correction(&self, _ppm: i32) -> Result<()> {
        Ok(())
    }

    fn set_gain(&self, _tenth_db: i32) -> Result<()> {
        Ok(())
    }

    fn set_automatic_gain_control(&self, _enable: bool) -> Result<()> {
        Ok(())
    }

    fn valid_gains(&self) -> Vec<i32> {
        Vec::new()
    }
}

#[inline]
fn quantize(value: f32) -> u8 {
    (value * 127.5 + 127.5).round().clamp(0.0, 255.0) as u8
}

fn read_float_samples(mut reader: WavReader<std::io::BufReader<std::fs::File>>) -> Result<Vec<u8>> {
    let mut samples = Vec::new();
    let mut iter = reader.samples::<f32>();

    while let (Some(i_result), Some(q_result)) = (iter.next(), iter.next()) {
        samples.push(quantize(i_result?));
        samples.push(quantize(q_result?));
    }

    Ok(samples)
}

fn read_int_samples(mut reader: WavReader<std::io::BufReader<std::fs::File>>, bits: u16) -> Result<Vec<u8>> {
    let mut samples = Vec::new();
    let max_val = (1i64 << (bits - 1)) as f32;

    let mut iter = reader.samples::<i32>();

    while let (Some(i_result), Some(q_result)) = (iter.next(), iter.next()) {
        samples.push(quantize(i_result? as f32 / max_val));
        samples.push(quantize(q_result? as f32 / max_val));
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    fn write_recording(path: &Path, pairs: &[(f32, f32)]) {
        let spec = WavSpec {
            channels: 2,
            sample_rate: 48_000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for &(i, q) in pairs {
            writer.write_sample(i).unwrap();
            writer.write_sample(q).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_quantize_endpoints() {
        assert_eq!(quantize(-1.0), 0);
        assert_eq!(quantize(1.0), 255);
        assert_eq!(quantize(4.0), 255);
        assert_eq!(quantize(0.0), 128);
    }

    #[test]
    fn test_replay_blocks_then_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iq.wav");
        write_recording(&path, &[(-1.0, 1.0), (1.0, -1.0), (0.0, 0.0)]);

        let device = WavDevice::open(&path).unwrap().unpaced();
        assert_eq!(device.sample_rate(), 48_000);
        device.begin_stream().unwrap();

        let mut blocks = Vec::new();
        device.read_async(4, &mut |b| blocks.push(b.to_vec())).unwrap();
        assert_eq!(blocks, vec![vec![0, 255, 255, 0]]);
    }

    #[test]
    fn test_rejects_mono_recording() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        writer.write_sample(0i16).unwrap();
        writer.finalize().unwrap();

        assert!(matches!(WavDevice::open(&path), Err(RadioError::Config(_))));
    }
}
