use std::f32::consts::PI;

use super::{DspStage, SignalLevels};
use crate::error::{RadioError, Result};
use crate::input::IqSample;
use crate::modulation::Modulation;

const WIDEBAND_CHANNEL_RATE: u32 = 240_000; // multiple of the 48 kHz audio rate
const WIDEBAND_DEVIATION_HZ: f32 = 75_000.0;
const WIDEBAND_DEEMPHASIS_S: f32 = 75e-6;

const WEATHER_CHANNEL_RATE: u32 = 48_000;
const WEATHER_DEVIATION_HZ: f32 = 5_000.0;

pub const AUDIO_RATE: u32 = 48_000;

/// Output headroom below full scale
const OUTPUT_GAIN: f32 = 0.8 * 32767.0;

/// Each block carries 25 ms of audio
const BLOCKS_PER_SECOND: u32 = 40;

/// Plain mono FM discriminator.
///
/// Boxcar decimation to the channel rate, phase-difference demodulation,
/// optional de-emphasis, boxcar decimation to the audio rate. Good enough to
/// drive the pipeline; it is not a broadcast-quality receiver.
pub struct FmDemodulator {
    modulation: Modulation,
    channel_decimation: usize,
    audio_decimation: usize,
    discriminator_gain: f32,
    deemphasis_alpha: Option<f32>,
    block_len: usize,

    // Carried between blocks
    channel_acc: IqSample,
    channel_count: usize,
    audio_acc: f32,
    audio_count: usize,
    prev: IqSample,
    deemphasis_state: f32,

    levels: SignalLevels,
}

impl FmDemodulator {
    /// Wideband broadcast FM. `input_rate` must be a multiple of 240 kHz.
    pub fn wideband(input_rate: u32) -> Result<Self> {
        Self::new(
            Modulation::Fm,
            input_rate,
            WIDEBAND_CHANNEL_RATE,
            WIDEBAND_DEVIATION_HZ,
            Some(WIDEBAND_DEEMPHASIS_S),
        )
    }

    /// Weather band narrowband FM. `input_rate` must be a multiple of 48 kHz.
    pub fn weather(input_rate: u32) -> Result<Self> {
        Self::new(Modulation::Wx, input_rate, WEATHER_CHANNEL_RATE, WEATHER_DEVIATION_HZ, None)
    }

    fn new(
        modulation: Modulation,
        input_rate: u32,
        channel_rate: u32,
        deviation_hz: f32,
        deemphasis_s: Option<f32>,
    ) -> Result<Self> {
        if input_rate == 0 || input_rate % channel_rate != 0 {
            return Err(RadioError::config(format!(
                "{} input rate {} Hz is not a multiple of the {} Hz channel rate",
                modulation, input_rate, channel_rate
            )));
        }
        if channel_rate % AUDIO_RATE != 0 {
            return Err(RadioError::config(format!(
                "{} channel rate {} Hz is not a multiple of the {} Hz output rate",
                modulation, channel_rate, AUDIO_RATE
            )));
        }

        let channel_decimation = (input_rate / channel_rate) as usize;
        let audio_decimation = (channel_rate / AUDIO_RATE) as usize;
        let block_len = channel_decimation * audio_decimation * (AUDIO_RATE / BLOCKS_PER_SECOND) as usize;

        Ok(Self {
            modulation,
            channel_decimation,
            audio_decimation,
            discriminator_gain: channel_rate as f32 / (2.0 * PI * deviation_hz),
            deemphasis_alpha: deemphasis_s.map(|tau| 1.0 - (-1.0 / (tau * AUDIO_RATE as f32)).exp()),
            block_len,
            channel_acc: IqSample::default(),
            channel_count: 0,
            audio_acc: 0.0,
            audio_count: 0,
            prev: IqSample::default(),
            deemphasis_state: 0.0,
            levels: SignalLevels::default(),
        })
    }

    fn update_levels(&mut self, input: &[IqSample]) {
        if input.is_empty() {
            return;
        }
        // FM has a constant envelope; envelope ripple stands in for noise
        let n = input.len() as f32;
        let mags: Vec<f32> = input.iter().map(|s| (s.i * s.i + s.q * s.q).sqrt()).collect();
        let mean = mags.iter().sum::<f32>() / n;
        let var = mags.iter().map(|m| (m - mean) * (m - mean)).sum::<f32>() / n;

        let snr = if var > 1e-12 {
            10.0 * (mean * mean / var).log10()
        } else {
            60.0
        };
        let snr = snr.clamp(0.0, 60.0);
        self.levels = SignalLevels {
            quality: ((snr / 40.0) * 100.0).clamp(0.0, 100.0) as i32,
            snr: snr as i32,
        };
    }
}

impl DspStage for FmDemodulator {
    fn modulation(&self) -> Modulation {
        self.modulation
    }

    fn input_block_len(&self) -> usize {
        self.block_len
    }

    fn process(&mut self, input: &[IqSample], output: &mut Vec<i16>) -> Result<usize> {
        self.update_levels(input);
        let mut frames = 0;

        for sample in input {
            self.channel_acc.i += sample.i;
            self.channel_acc.q += sample.q;
            self.channel_count += 1;
            if self.channel_count < self.channel_decimation {
                continue;
            }

            let cur = IqSample::new(
                self.channel_acc.i / self.channel_count as f32,
                self.channel_acc.q / self.channel_count as f32,
            );
            self.channel_acc = IqSample::default();
            self.channel_count = 0;

            // arg(cur * conj(prev))
            let re = cur.i * self.prev.i + cur.q * self.prev.q;
            let im = cur.q * self.prev.i - cur.i * self.prev.q;
            self.prev = cur;
            let demod = im.atan2(re) * self.discriminator_gain;

            self.audio_acc += demod;
            self.audio_count += 1;
            if self.audio_count < self.audio_decimation {
                continue;
            }

            let mut audio = self.audio_acc / self.audio_count as f32;
            self.audio_acc = 0.0;
            self.audio_count = 0;

            if let Some(alpha) = self.deemphasis_alpha {
                self.deemphasis_state += alpha * (audio - self.deemphasis_state);
                audio = self.deemphasis_state;
            }

            output.push((audio * OUTPUT_GAIN).clamp(-32768.0, 32767.0) as i16);
            frames += 1;
        }

        Ok(frames)
    }

    fn output_rate(&self) -> u32 {
        AUDIO_RATE
    }

    fn signal_levels(&self) -> SignalLevels {
        self.levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fm_tone(rate: u32, deviation: f32, tone_hz: f32, count: usize) -> Vec<IqSample> {
        let mut phase = 0.0f32;
        (0..count)
            .map(|n| {
                let t = n as f32 / rate as f32;
                let inst_freq = deviation * (2.0 * PI * tone_hz * t).sin();
                phase += 2.0 * PI * inst_freq / rate as f32;
                IqSample::new(0.5 * phase.cos(), 0.5 * phase.sin())
            })
            .collect()
    }

    #[test]
    fn test_wideband_block_and_frame_counts() {
        let mut fm = FmDemodulator::wideband(1_920_000).unwrap();
        assert_eq!(fm.input_block_len(), 8 * 5 * 1200);

        let input = fm_tone(1_920_000, 50_000.0, 1_000.0, fm.input_block_len());
        let mut out = Vec::new();
        let frames = fm.process(&input, &mut out).unwrap();
        assert_eq!(frames, 1200);
        assert_eq!(out.len(), 1200);
        assert!(out.iter().any(|&s| s.abs() > 1000));
    }

    #[test]
    fn test_weather_demodulates_tone() {
        let mut wx = FmDemodulator::weather(960_000).unwrap();
        assert_eq!(wx.modulation(), Modulation::Wx);
        let input = fm_tone(960_000, 4_000.0, 1_000.0, wx.input_block_len());
        let mut out = Vec::new();
        let frames = wx.process(&input, &mut out).unwrap();
        assert_eq!(frames, 1200);

        let peak = out.iter().map(|s| s.unsigned_abs()).max().unwrap();
        // 4 kHz of 5 kHz deviation at 0.8 full scale
        assert!(peak > 15_000 && peak < 26_000, "peak {}", peak);
    }

    #[test]
    fn test_clean_carrier_reports_high_snr() {
        let mut fm = FmDemodulator::wideband(960_000).unwrap();
        let input = fm_tone(960_000, 10_000.0, 500.0, fm.input_block_len());
        fm.process(&input, &mut Vec::new()).unwrap();
        assert!(fm.signal_levels().snr >= 40);
        assert_eq!(fm.signal_levels().quality, 100);
    }

    #[test]
    fn test_rejects_rate_mismatch() {
        assert!(matches!(FmDemodulator::wideband(1_000_000), Err(RadioError::Config(_))));
        assert!(matches!(FmDemodulator::weather(1_000), Err(RadioError::Config(_))));
    }
}
