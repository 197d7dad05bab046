use std::io::{BufReader, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::device::{BlockCallback, DeviceSource};
use crate::error::{RadioError, Result};

const GREETING_MAGIC: &[u8; 4] = b"RTL0";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// rtl_tcp command opcodes
const CMD_SET_FREQUENCY: u8 = 0x01;
const CMD_SET_SAMPLE_RATE: u8 = 0x02;
const CMD_SET_GAIN_MODE: u8 = 0x03;
const CMD_SET_GAIN: u8 = 0x04;
const CMD_SET_FREQ_CORRECTION: u8 = 0x05;
const CMD_SET_AGC_MODE: u8 = 0x08;

/// Tuner chip reported in the rtl_tcp greeting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunerType {
    Unknown,
    E4000,
    Fc0012,
    Fc0013,
    Fc2580,
    R820T,
    R828D,
}

impl TunerType {
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => TunerType::E4000,
            2 => TunerType::Fc0012,
            3 => TunerType::Fc0013,
            4 => TunerType::Fc2580,
            5 => TunerType::R820T,
            6 => TunerType::R828D,
            _ => TunerType::Unknown,
        }
    }

    /// Gain steps in tenths of a dB, as librtlsdr reports them.
    pub fn gains(&self) -> &'static [i32] {
        match self {
            TunerType::E4000 => &[-10, 15, 40, 65, 90, 115, 140, 165, 190, 215, 240, 290, 340, 420],
            TunerType::Fc0012 => &[-99, -40, 71, 179, 192],
            TunerType::Fc0013 => &[
                -99, -73, -65, -63, -60, -58, -54, 58, 61, 63, 65, 67, 68, 70, 71, 179, 181, 182,
                184, 186, 188, 191, 197,
            ],
            TunerType::Fc2580 => &[0],
            TunerType::R820T | TunerType::R828D => &[
                0, 9, 14, 27, 37, 77, 87, 125, 144, 157, 166, 197, 207, 229, 254, 280, 297, 328,
                338, 364, 372, 386, 402, 421, 434, 439, 445, 480, 496,
            ],
            TunerType::Unknown => &[],
        }
    }
}

/// Client for an `rtl_tcp` server.
///
/// Samples arrive as a raw unsigned 8-bit I/Q byte stream after a 12-byte
/// greeting; settings are sent back as 5-byte commands.
pub struct RtlTcpDevice {
    name: String,
    reader: Mutex<BufReader<TcpStream>>,
    commands: Mutex<TcpStream>,
    tuner: TunerType,
    cancelled: AtomicBool,
}

impl RtlTcpDevice {
    /// Connect to `host:port` and read the server greeting
    pub fn connect(addr: &str) -> Result<Self> {
        Self::connect_timeout(addr, CONNECT_TIMEOUT)
    }

    /// As [`connect`](Self::connect), with `timeout` bounding both the TCP
    /// handshake and the wait for the greeting. rtl_tcp serves one client at
    /// a time, so a second client is accepted but never greeted.
    pub fn connect_timeout(addr: &str, timeout: Duration) -> Result<Self> {
        let socket_addr = addr
            .to_socket_addrs()
            .map_err(|e| RadioError::config(format!("invalid device address '{}': {}", addr, e)))?
            .next()
            .ok_or_else(|| RadioError::config(format!("device address '{}' did not resolve", addr)))?;

        let stream = TcpStream::connect_timeout(&socket_addr, timeout)
            .map_err(|e| RadioError::device(format!("unable to connect to {}: {}", addr, e)))?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(timeout))?;
        let commands = stream.try_clone()?;
        let mut reader = BufReader::with_capacity(256 * 1024, stream);

        let mut greeting = [0u8; 12];
        reader
            .read_exact(&mut greeting)
            .map_err(|e| RadioError::device(format!("no greeting from {}: {}", addr, e)))?;
        if &greeting[0..4] != GREETING_MAGIC {
            return Err(RadioError::device(format!("{} is not an rtl_tcp server", addr)));
        }
        // Sample reads block until cancel_async shuts the socket down
        reader.get_ref().set_read_timeout(None)?;
        let tuner = TunerType::from_code(u32::from_be_bytes([greeting[4], greeting[5], greeting[6], greeting[7]]));
        let gain_count = u32::from_be_bytes([greeting[8], greeting[9], greeting[10], greeting[11]]);

        log::info!("Connected to rtl_tcp at {} (tuner {:?}, {} gain steps)", addr, tuner, gain_count);

        Ok(Self {
            name: format!("rtl_tcp {}", addr),
            reader: Mutex::new(reader),
            commands: Mutex::new(commands),
            tuner,
            cancelled: AtomicBool::new(false),
        })
    }

    pub fn tuner(&self) -> TunerType {
        self.tuner
    }

    fn send_command(&self, opcode: u8, value: u32) -> Result<()> {
        let mut command = [0u8; 5];
        command[0] = opcode;
        command[1..].copy_from_slice(&value.to_be_bytes());
        self.commands.lock().write_all(&command)?;
        Ok(())
    }
}

impl DeviceSource for RtlTcpDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn begin_stream(&self) -> Result<()> {
        self.cancelled.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn cancel_async(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            // Wakes a reader blocked in the socket; the connection is not reused
            let _ = self.commands.lock().shutdown(Shutdown::Both);
        }
    }

    fn read(&self, buffer: &mut [u8]) -> Result<usize> {
        Ok(self.reader.lock().read(buffer)?)
    }

    fn read_async(&self, block_len: usize, callback: &mut BlockCallback<'_>) -> Result<()> {
        let mut reader = self.reader.lock();
        let mut block = vec![0u8; block_len];

        while !self.cancelled.load(Ordering::SeqCst) {
            match reader.read_exact(&mut block) {
                Ok(()) => callback(&block),
                Err(_) if self.cancelled.load(Ordering::SeqCst) => break,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Err(RadioError::device(format!("{}: connection closed", self.name)));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn set_center_frequency(&self, hz: u32) -> Result<()> {
        self.send_command(CMD_SET_FREQUENCY, hz)
    }

    fn set_sample_rate(&self, hz: u32) -> Result<()> {
        self.send_command(CMD_SET_SAMPLE_RATE, hz)
    }

    fn set_frequency_correction(&self, ppm: i32) -> Result<()> {
        self.send_command(CMD_SET_FREQ_CORRECTION, ppm as u32)
    }

    fn set_gain(&self, tenth_db: i32) -> Result<()> {
        self.send_command(CMD_SET_GAIN, tenth_db as u32)
    }

    fn set_automatic_gain_control(&self, enable: bool) -> Result<()> {
        // Gain mode 1 is manual; the RTL2832 digital AGC follows the tuner AGC
        self.send_command(CMD_SET_GAIN_MODE, u32::from(!enable))?;
        self.send_command(CMD_SET_AGC_MODE, u32::from(enable))
    }

    fn valid_gains(&self) -> Vec<i32> {
        self.tuner.gains().to_vec()
    }
}
