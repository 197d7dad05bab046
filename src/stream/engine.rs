//! Generic per-channel streaming engine.
//!
//! The device drives a named worker thread through `read_async`. Its callback
//! stages raw bytes, cuts them into DSP-sized blocks of normalised I/Q and
//! hands them to the [`DemuxQueue`]. Demodulation and packet stamping happen
//! on the consumer's thread inside [`StreamEngine::demux_read`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, Sender};

use super::queue::{DemuxQueue, PushOutcome, QueueRead};
use super::RadioStream;
use crate::config::{EngineConfig, TunerSettings};
use crate::dsp::{DspStage, SignalLevels};
use crate::error::{RadioError, Result};
use crate::input::{nearest_gain, normalize_samples, DeviceSource, IqSample};
use crate::packet::{DemuxPacket, StreamProperties, BASE_EPOCH};
use crate::rds::{RdsGroup, RdsUecpEncoder};
use crate::ring_buffer::RingBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Created,
    Streaming,
    Stopping,
    Stopped,
}

/// Values copied into the worker before it starts
struct WorkerParams {
    device_block_len: usize,
    dsp_block_bytes: usize,
    ring_capacity: usize,
    sample_scale: f32,
}

pub struct StreamEngine<D: DspStage> {
    state: EngineState,
    device: Option<Arc<dyn DeviceSource>>,
    dsp: Option<D>,
    queue: Arc<DemuxQueue<Vec<IqSample>>>,
    stopping: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,

    dts: i64,
    error_delivered: bool,
    audio: Vec<i16>,

    rds: Option<RdsUecpEncoder>,
    groups: Vec<RdsGroup>,
    pending: VecDeque<DemuxPacket>,
}

impl<D: DspStage> StreamEngine<D> {
    /// Configure `device` and start streaming.
    ///
    /// Returns once the worker has started the device, so the queue is
    /// live before the first `demux_read`.
    pub fn open(
        device: Arc<dyn DeviceSource>,
        dsp: D,
        settings: &TunerSettings,
        config: &EngineConfig,
    ) -> Result<Self> {
        settings.validate()?;

        let modulation = dsp.modulation();
        let dsp_block_bytes = dsp.input_block_len() * 2;
        let ring_capacity = config.ring_capacity.unwrap_or_else(|| modulation.ring_capacity());
        config.validate(dsp_block_bytes, ring_capacity)?;

        configure_device(device.as_ref(), settings)?;

        let mut engine = Self {
            state: EngineState::Created,
            device: Some(Arc::clone(&device)),
            dsp: None,
            queue: Arc::new(DemuxQueue::new(config.max_queue_len)),
            stopping: Arc::new(AtomicBool::new(false)),
            worker: None,
            dts: BASE_EPOCH,
            error_delivered: false,
            audio: Vec::with_capacity(dsp.input_block_len()),
            rds: modulation.has_rds().then(|| RdsUecpEncoder::new(config.rbds)),
            groups: Vec::new(),
            pending: VecDeque::new(),
        };

        let params = WorkerParams {
            device_block_len: config.device_block_len,
            dsp_block_bytes,
            ring_capacity,
            sample_scale: dsp.sample_scale(),
        };
        let (started_tx, started_rx) = bounded(1);
        let queue = Arc::clone(&engine.queue);
        let stopping = Arc::clone(&engine.stopping);

        let handle = thread::Builder::new()
            .name(format!("{}-stream", modulation.name().to_lowercase().replace(' ', "-")))
            .spawn(move || run_worker(device, queue, stopping, started_tx, params))
            .map_err(|e| RadioError::Thread(format!("failed to spawn stream worker: {}", e)))?;
        engine.worker = Some(handle);

        match started_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                engine.close();
                return Err(e);
            }
            Err(_) => {
                engine.close();
                return Err(RadioError::Thread("stream worker exited before starting".into()));
            }
        }

        engine.dsp = Some(dsp);
        engine.state = EngineState::Streaming;
        log::info!(
            "{} stream open at {} Hz ({} Hz sample rate, {})",
            modulation,
            settings.frequency_hz,
            settings.sample_rate_hz,
            if settings.autogain { "autogain" } else { "manual gain" }
        );

        Ok(engine)
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Number of discontinuities queued so far
    pub fn resync_count(&self) -> u64 {
        self.queue.resyncs()
    }

    /// Blocks waiting in the queue
    pub fn queued_blocks(&self) -> usize {
        self.queue.len()
    }

    /// Call sign or PI decoded from RDS, FM only
    pub fn station_id(&self) -> Option<String> {
        let encoder = self.rds.as_ref()?;
        encoder
            .callsign()
            .map(str::to_string)
            .or_else(|| encoder.program_identification().map(|pi| format!("{:04X}", pi)))
    }

    fn read_packet(&mut self) -> Result<Option<DemuxPacket>> {
        if let Some(packet) = self.pending.pop_front() {
            return Ok(Some(packet));
        }

        let dsp = match self.dsp.as_mut() {
            Some(dsp) => dsp,
            None => return Ok(None),
        };

        let wait = dsp.modulation().read_wait(dsp.is_locked());
        let samples = match self.queue.pop(wait) {
            QueueRead::Block(samples) => samples,
            QueueRead::Resync => {
                log::debug!("Stream discontinuity, timestamps reset");
                self.dts = BASE_EPOCH;
                return Ok(Some(DemuxPacket::stream_change()));
            }
            QueueRead::TimedOut => return Ok(Some(DemuxPacket::empty())),
            QueueRead::Stopped(Some(e)) => {
                self.error_delivered = true;
                return Err(e);
            }
            QueueRead::Stopped(None) if self.error_delivered => return Ok(Some(DemuxPacket::empty())),
            QueueRead::Stopped(None) => return Ok(None),
        };

        self.audio.clear();
        let frames = dsp.process(&samples, &mut self.audio)?;
        let dts = self.dts;

        if let Some(encoder) = self.rds.as_mut() {
            self.groups.clear();
            dsp.take_rds_groups(&mut self.groups);
            for group in &self.groups {
                encoder.decode_group(group);
            }
            while let Some(packet) = encoder.pop_packet() {
                self.pending.push_back(DemuxPacket::uecp(packet, dts));
            }
        }

        if frames == 0 {
            return Ok(Some(self.pending.pop_front().unwrap_or_else(DemuxPacket::empty)));
        }

        let channels = dsp.output_channels().max(1) as usize;
        let used = (frames * channels).min(self.audio.len());
        let packet = DemuxPacket::audio(&self.audio[..used], frames, dsp.output_rate(), dts);
        self.dts += packet.duration;
        Ok(Some(packet))
    }
}

impl<D: DspStage> RadioStream for StreamEngine<D> {
    /// Next packet: audio, UECP, a `STREAMCHANGE` marker, or an empty packet
    /// when a bounded wait elapsed. `Ok(None)` once the stream has ended.
    fn demux_read(&mut self) -> Result<Option<DemuxPacket>> {
        if self.state != EngineState::Streaming {
            return Ok(None);
        }
        self.read_packet()
    }

    fn enum_properties(&self, callback: &mut dyn FnMut(&StreamProperties)) {
        let dsp = match self.dsp.as_ref() {
            Some(dsp) => dsp,
            None => return,
        };
        callback(&StreamProperties::pcm_audio(dsp.output_channels(), dsp.output_rate()));
        if dsp.modulation().has_rds() {
            callback(&StreamProperties::rds());
        }
    }

    fn signal_quality(&self) -> SignalLevels {
        self.dsp.as_ref().map(|dsp| dsp.signal_levels()).unwrap_or_default()
    }

    /// Stop the worker and release the device. Safe to call repeatedly.
    fn close(&mut self) {
        if self.state == EngineState::Stopped {
            return;
        }
        self.state = EngineState::Stopping;

        // Order matters: flag, cancel, then join
        self.stopping.store(true, Ordering::SeqCst);
        self.queue.stop();
        if let Some(device) = self.device.as_ref() {
            device.cancel_async();
        }
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                log::error!("Stream worker panicked");
            }
        }

        self.device = None;
        self.dsp = None;
        self.rds = None;
        self.pending.clear();
        self.state = EngineState::Stopped;
        log::debug!("Stream closed ({} resyncs)", self.queue.resyncs());
    }
}

impl<D: DspStage> Drop for StreamEngine<D> {
    fn drop(&mut self) {
        self.close();
    }
}

fn configure_device(device: &dyn DeviceSource, settings: &TunerSettings) -> Result<()> {
    device.set_sample_rate(settings.sample_rate_hz)?;
    device.set_center_frequency(settings.frequency_hz)?;
    if settings.freq_correction_ppm != 0 {
        device.set_frequency_correction(settings.freq_correction_ppm)?;
    }

    if settings.autogain {
        device.set_automatic_gain_control(true)?;
    } else {
        device.set_automatic_gain_control(false)?;
        let gain = nearest_gain(&device.valid_gains(), settings.manual_gain);
        if gain != settings.manual_gain {
            log::debug!(
                "Manual gain {:.1} dB snapped to {:.1} dB",
                settings.manual_gain as f32 / 10.0,
                gain as f32 / 10.0
            );
        }
        device.set_gain(gain)?;
    }

    log::debug!("Configured {}", device.name());
    Ok(())
}

fn run_worker(
    device: Arc<dyn DeviceSource>,
    queue: Arc<DemuxQueue<Vec<IqSample>>>,
    stopping: Arc<AtomicBool>,
    started: Sender<Result<()>>,
    params: WorkerParams,
) {
    if let Err(e) = device.begin_stream() {
        queue.stop();
        let _ = started.send(Err(e));
        return;
    }
    let _ = started.send(Ok(()));

    let mut ring = RingBuffer::new(params.ring_capacity);
    let mut staging = vec![0u8; params.dsp_block_bytes];

    let mut callback = |block: &[u8]| {
        if stopping.load(Ordering::Relaxed) {
            return;
        }

        if block.len() != params.device_block_len {
            log::warn!(
                "Discarding {} byte block (expected {})",
                block.len(),
                params.device_block_len
            );
            ring.clear();
            queue.push(None);
            return;
        }

        if let Err(e) = ring.put(block) {
            log::warn!("{}", e);
            ring.clear();
            queue.push(None);
            return;
        }

        while ring.len() >= params.dsp_block_bytes {
            ring.get(&mut staging);
            let mut samples = Vec::with_capacity(staging.len() / 2);
            normalize_samples(&staging, params.sample_scale, &mut samples);

            match queue.push(Some(samples)) {
                PushOutcome::Appended => {}
                PushOutcome::Resynced => log::warn!("Packet queue full, resynchronising"),
                PushOutcome::Rejected => {
                    ring.clear();
                    return;
                }
            }
        }
    };

    match device.read_async(params.device_block_len, &mut callback) {
        Ok(()) => queue.stop(),
        Err(e) if stopping.load(Ordering::SeqCst) => {
            log::debug!("Device error during shutdown: {}", e);
            queue.stop();
        }
        Err(e) => {
            log::error!("{}: {}", device.name(), e);
            // The consumer sees a discontinuity, then the error
            queue.push(None);
            queue.fail(e);
        }
    }
}
