//! FFT-based signal strength meter fed from its own sample stream.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::dsp::{blackman_window, FirFilter};
use crate::error::{RadioError, Result};
use crate::input::{normalize_samples, IqSample};
use crate::ring_buffer::{RingBuffer, WIDEBAND_CAPACITY};

/// Weight of the previous average in the power/noise smoothing
const SMOOTHING: f32 = 0.85;

/// Floor applied before taking logs
const MIN_POWER: f32 = 1e-20;

/// Plot layout and refresh settings
#[derive(Debug, Clone, PartialEq)]
pub struct SignalPlotProps {
    /// Requested number of plot points; the FFT size is the next power of two
    pub width: usize,
    /// Status callbacks per second
    pub rate_hz: u32,
    /// Channel bandwidth, centred on the tuned frequency
    pub bandwidth_hz: u32,
    /// Band-limit the input to the channel bandwidth before the FFT
    pub filter: bool,
    pub filter_taps: usize,
}

impl Default for SignalPlotProps {
    fn default() -> Self {
        Self {
            width: 512,
            rate_hz: 10,
            bandwidth_hz: 200_000,
            filter: false,
            filter_taps: 65,
        }
    }
}

/// One meter reading. `plot` is borrowed for the duration of the callback.
#[derive(Debug, Clone, Copy)]
pub struct SignalStatus<'a> {
    /// Smoothed dB at the centre bin
    pub power: f32,
    /// Smoothed dB averaged from the low and high cut bins
    pub noise: f32,
    pub snr: f32,
    /// The window contained saturated input samples
    pub overload: bool,
    pub lowcut_index: usize,
    pub highcut_index: usize,
    /// dB per bin, negative frequencies first
    pub plot: &'a [f32],
}

pub type SignalCallback = Box<dyn FnMut(&SignalStatus<'_>) + Send>;

pub struct SignalMeter {
    props: SignalPlotProps,
    sample_rate: u32,
    fft_size: usize,
    fft_min_bytes: usize,
    lowcut_index: usize,
    highcut_index: usize,

    ring: RingBuffer,
    raw: Vec<u8>,
    samples: Vec<IqSample>,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    plot: Vec<f32>,
    filter: Option<FirFilter>,

    avg_power: f32,
    avg_noise: f32,
    callback: SignalCallback,
}

impl SignalMeter {
    pub fn new(props: SignalPlotProps, sample_rate: u32, callback: SignalCallback) -> Result<Self> {
        if props.width == 0 || props.rate_hz == 0 {
            return Err(RadioError::config("signal plot width and rate must be non-zero"));
        }
        if sample_rate == 0 || props.bandwidth_hz == 0 || props.bandwidth_hz >= sample_rate {
            return Err(RadioError::config(format!(
                "signal bandwidth {} Hz must be below the {} Hz sample rate",
                props.bandwidth_hz, sample_rate
            )));
        }

        let fft_size = props.width.next_power_of_two();
        if fft_size * 2 > WIDEBAND_CAPACITY / 2 {
            return Err(RadioError::config(format!("signal plot width {} too large", props.width)));
        }

        let mut planner = FftPlanner::new();
        let mut meter = Self {
            sample_rate,
            fft_size,
            fft_min_bytes: 0,
            lowcut_index: 0,
            highcut_index: 0,
            ring: RingBuffer::new(WIDEBAND_CAPACITY),
            raw: vec![0u8; fft_size * 2],
            samples: Vec::with_capacity(fft_size),
            window: blackman_window(fft_size),
            fft: planner.plan_fft_forward(fft_size),
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            plot: vec![0.0; fft_size],
            filter: None,
            avg_power: f32::NAN,
            avg_noise: f32::NAN,
            callback,
            props,
        };
        meter.set_sample_rate(sample_rate)?;
        Ok(meter)
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Bytes consumed per status update
    pub fn fft_min_bytes(&self) -> usize {
        self.fft_min_bytes
    }

    /// Retune the meter for a new device rate.
    ///
    /// The band-limit filter is redesigned for the new rate and bytes still
    /// buffered from the old rate are discarded, as is the smoothed history.
    pub fn set_sample_rate(&mut self, sample_rate: u32) -> Result<()> {
        if sample_rate == 0 || self.props.bandwidth_hz >= sample_rate {
            return Err(RadioError::config(format!(
                "signal bandwidth {} Hz must be below the {} Hz sample rate",
                self.props.bandwidth_hz, sample_rate
            )));
        }
        self.filter = if self.props.filter {
            let cutoff = self.props.bandwidth_hz as f32 / 2.0;
            Some(FirFilter::lowpass(self.props.filter_taps, cutoff, sample_rate)?)
        } else {
            None
        };
        self.sample_rate = sample_rate;
        self.ring.clear();
        self.avg_power = f32::NAN;
        self.avg_noise = f32::NAN;

        let window_bytes = self.fft_size * 2;
        let per_update = (sample_rate as usize * 2) / self.props.rate_hz as usize;
        self.fft_min_bytes = (per_update / window_bytes).max(1) * window_bytes;
        if self.fft_min_bytes > WIDEBAND_CAPACITY / 2 {
            self.fft_min_bytes = (WIDEBAND_CAPACITY / 2 / window_bytes) * window_bytes;
        }

        let center = self.fft_size / 2;
        let half_bins = (self.props.bandwidth_hz as u64 * self.fft_size as u64 / sample_rate as u64 / 2) as usize;
        self.lowcut_index = center.saturating_sub(half_bins);
        self.highcut_index = (center + half_bins).min(self.fft_size - 1);
        Ok(())
    }

    /// Consume raw unsigned 8-bit I/Q bytes, emitting one status per full window
    pub fn input_samples(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let count = data.len().min(self.ring.free());
            self.ring.put(&data[..count])?;
            data = &data[count..];

            while self.ring.len() >= self.fft_min_bytes {
                self.ring.get(&mut self.raw);
                self.ring.skip(self.fft_min_bytes - self.raw.len());
                self.process_window();
            }
        }
        Ok(())
    }

    fn process_window(&mut self) {
        let overload = self.raw.iter().any(|&b| b == 0 || b == 255);

        self.samples.clear();
        normalize_samples(&self.raw, 1.0, &mut self.samples);
        if let Some(filter) = self.filter.as_mut() {
            filter.process(&mut self.samples);
        }

        for ((out, sample), w) in self.buffer.iter_mut().zip(&self.samples).zip(&self.window) {
            *out = Complex::new(sample.i * w, sample.q * w);
        }
        self.fft.process(&mut self.buffer);

        // Shift so that bin 0 is the most negative frequency
        let n = self.fft_size;
        let norm = (n * n) as f32;
        for (k, value) in self.buffer.iter().enumerate() {
            let power = (value.norm_sqr() / norm).max(MIN_POWER);
            self.plot[(k + n / 2) % n] = 10.0 * power.log10();
        }

        let power = self.plot[n / 2];
        let noise = (self.plot[self.lowcut_index] + self.plot[self.highcut_index]) / 2.0;
        self.avg_power = smooth(self.avg_power, power);
        self.avg_noise = smooth(self.avg_noise, noise);

        let status = SignalStatus {
            power: self.avg_power,
            noise: self.avg_noise,
            snr: self.avg_power - self.avg_noise,
            overload,
            lowcut_index: self.lowcut_index,
            highcut_index: self.highcut_index,
            plot: &self.plot,
        };
        (self.callback)(&status);
    }
}

/// NaN means no reading yet; the first value seeds the average
fn smooth(average: f32, value: f32) -> f32 {
    if average.is_nan() {
        value
    } else {
        SMOOTHING * average + (1.0 - SMOOTHING) * value
    }
}
