#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::Sender;
use parking_lot::Mutex;

use rtl_radio::dsp::{DspStage, SignalLevels};
use rtl_radio::input::device::BlockCallback;
use rtl_radio::input::{DeviceSource, IqSample};
use rtl_radio::rds::RdsGroup;
use rtl_radio::{Modulation, RadioError, Result};

pub enum Step {
    Block(Vec<u8>),
    /// Deliver the block every interval until cancelled
    Repeat(Vec<u8>, Duration),
    Fail(&'static str),
    /// Tell the test every earlier step has been delivered
    Notify(Sender<()>),
}

/// Device that plays a script, then idles until cancelled
pub struct MockDevice {
    script: Mutex<VecDeque<Step>>,
    cancelled: AtomicBool,
    pub calls: Mutex<Vec<String>>,
}

impl MockDevice {
    pub fn new(script: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            cancelled: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

impl DeviceSource for MockDevice {
    fn name(&self) -> &str {
        "mock"
    }

    fn begin_stream(&self) -> Result<()> {
        self.record("begin_stream".into());
        Ok(())
    }

    fn cancel_async(&self) {
        self.record("cancel_async".into());
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn read(&self, _buffer: &mut [u8]) -> Result<usize> {
        Ok(0)
    }

    fn read_async(&self, _block_len: usize, callback: &mut BlockCallback<'_>) -> Result<()> {
        while !self.cancelled.load(Ordering::SeqCst) {
            let step = self.script.lock().pop_front();
            match step {
                Some(Step::Block(block)) => callback(&block),
                Some(Step::Repeat(block, interval)) => {
                    while !self.cancelled.load(Ordering::SeqCst) {
                        callback(&block);
                        thread::sleep(interval);
                    }
                }
                Some(Step::Fail(msg)) => return Err(RadioError::device(msg)),
                Some(Step::Notify(tx)) => {
                    let _ = tx.send(());
                }
                None => thread::sleep(Duration::from_millis(1)),
            }
        }
        Ok(())
    }

    fn set_center_frequency(&self, hz: u32) -> Result<()> {
        self.record(format!("frequency {}", hz));
        Ok(())
    }

    fn set_sample_rate(&self, hz: u32) -> Result<()> {
        self.record(format!("sample_rate {}", hz));
        Ok(())
    }

    fn set_frequency_correction(&self, ppm: i32) -> Result<()> {
        self.record(format!("ppm {}", ppm));
        Ok(())
    }

    fn set_gain(&self, tenth_db: i32) -> Result<()> {
        self.record(format!("gain {}", tenth_db));
        Ok(())
    }

    fn set_automatic_gain_control(&self, enable: bool) -> Result<()> {
        self.record(format!("agc {}", enable));
        Ok(())
    }

    fn valid_gains(&self) -> Vec<i32> {
        vec![0, 9, 14, 27, 37, 77, 87, 125, 144, 157, 166, 197]
    }
}

/// One PCM frame per input sample, optionally handing out RDS groups
pub struct MockDsp {
    pub modulation: Modulation,
    pub block_len: usize,
    pub output_rate: u32,
    pub locked: Arc<AtomicBool>,
    /// One batch handed out per processed block
    pub groups: VecDeque<Vec<RdsGroup>>,
}

impl MockDsp {
    pub fn new(modulation: Modulation, block_len: usize) -> Self {
        Self {
            modulation,
            block_len,
            output_rate: 48_000,
            locked: Arc::new(AtomicBool::new(true)),
            groups: VecDeque::new(),
        }
    }
}

impl DspStage for MockDsp {
    fn modulation(&self) -> Modulation {
        self.modulation
    }

    fn input_block_len(&self) -> usize {
        self.block_len
    }

    fn process(&mut self, input: &[IqSample], output: &mut Vec<i16>) -> Result<usize> {
        output.extend(input.iter().map(|s| (s.i * 16_000.0) as i16));
        Ok(input.len())
    }

    fn output_rate(&self) -> u32 {
        self.output_rate
    }

    fn signal_levels(&self) -> SignalLevels {
        SignalLevels { quality: 80, snr: 30 }
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    fn take_rds_groups(&mut self, out: &mut Vec<RdsGroup>) {
        if let Some(batch) = self.groups.pop_front() {
            out.extend(batch);
        }
    }
}
