use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::Local;
use clap::{ArgAction, Parser, ValueEnum};

use rtl_radio::dsp::FmDemodulator;
use rtl_radio::input::{DeviceSource, RtlTcpDevice, WavDevice};
use rtl_radio::output::{generate_filename, PcmRecorder};
use rtl_radio::packet::{STREAM_ID_AUDIO, STREAM_ID_STREAMCHANGE, STREAM_ID_UECP};
use rtl_radio::rds::decode_packet;
use rtl_radio::rds::uecp::{MEC_PI, MEC_PS, MEC_PTY, MEC_RT};
use rtl_radio::stream::FmStream;
use rtl_radio::{
    EngineConfig, Modulation, RadioStream, SignalMeter, SignalPlotProps, SignalStatus, StreamEngine,
    StreamProperties, TunerSettings,
};

/// Bytes per signal meter device read
const METER_BLOCK_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, Copy)]
struct Frequency(u32);

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (digits, scale) = if let Some(stripped) = s.strip_suffix('M') {
            (stripped, 1e6)
        } else if let Some(stripped) = s.strip_suffix('k') {
            (stripped, 1e3)
        } else {
            (s, 1.0)
        };
        let value: f64 = digits.trim().parse().map_err(|_| format!("Invalid frequency '{}'", s))?;
        if value <= 0.0 || value * scale > u32::MAX as f64 {
            return Err(format!("Frequency '{}' out of range", s));
        }
        Ok(Frequency((value * scale).round() as u32))
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Demod {
    /// Wideband broadcast FM with RDS
    Fm,
    /// Narrowband NOAA weather radio
    Wx,
}

/// Tune an RTL-SDR channel, record its audio and log RDS metadata
#[derive(Parser, Debug)]
#[command(name = "rtl-radio")]
#[command(version, about, long_about = None)]
struct Args {
    /// Replay an I/Q WAV recording instead of a live device
    #[arg(value_name = "INPUT")]
    input_file: Option<PathBuf>,

    /// rtl_tcp server to stream from
    #[arg(short, long, value_name = "HOST:PORT")]
    device: Option<String>,

    /// Center frequency in Hz (accepts k/M suffix, e.g. 99.1M)
    #[arg(short, long, value_parser = Frequency::from_str, default_value = "99.1M")]
    frequency: Frequency,

    #[arg(short, long, value_enum, default_value = "fm")]
    modulation: Demod,

    /// Device sample rate in Hz
    #[arg(short, long, default_value_t = 1_920_000)]
    sample_rate: u32,

    /// Manual tuner gain in dB (automatic gain control when omitted)
    #[arg(short, long)]
    gain: Option<f32>,

    /// Frequency correction in ppm
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    ppm: i32,

    /// Decode PI codes as North American call signs
    #[arg(long)]
    rbds: bool,

    /// Output directory for recordings
    #[arg(short, long, default_value = "./recordings")]
    output_dir: PathBuf,

    /// Stop after this many seconds of audio
    #[arg(short = 't', long)]
    duration: Option<f64>,

    /// Run the signal meter on a second device session
    #[arg(long)]
    meter: bool,

    /// Replay recordings as fast as possible
    #[arg(long)]
    unpaced: bool,

    /// Verbosity level (-v=debug, -vv=trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn modulation(&self) -> Modulation {
        match self.modulation {
            Demod::Fm => Modulation::Fm,
            Demod::Wx => Modulation::Wx,
        }
    }

    /// Open the configured source; returns the device and its sample rate
    fn open_device(&self) -> Result<(Arc<dyn DeviceSource>, u32), Box<dyn std::error::Error>> {
        if let Some(path) = &self.input_file {
            let mut device = WavDevice::open(path)?;
            if self.unpaced {
                device = device.unpaced();
            }
            let rate = device.sample_rate();
            let device: Arc<dyn DeviceSource> = Arc::new(device);
            return Ok((device, rate));
        }

        let addr = self.device.as_deref().ok_or("no device address")?;
        let device: Arc<dyn DeviceSource> = Arc::new(RtlTcpDevice::connect(addr)?);
        Ok((device, self.sample_rate))
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.verbose);

    // Validate input mode
    if args.input_file.is_none() && args.device.is_none() {
        eprintln!("Error: Must specify either an input file or --device <host:port>");
        std::process::exit(1);
    }
    if args.input_file.is_some() && args.device.is_some() {
        eprintln!("Error: Cannot specify both input file and --device");
        std::process::exit(1);
    }

    std::fs::create_dir_all(&args.output_dir)?;

    let (device, sample_rate) = args.open_device()?;
    let settings = TunerSettings {
        frequency_hz: args.frequency.0,
        sample_rate_hz: sample_rate,
        autogain: args.gain.is_none(),
        manual_gain: args.gain.map(|db| (db * 10.0).round() as i32).unwrap_or(0),
        freq_correction_ppm: args.ppm,
    };
    let config = EngineConfig {
        rbds: args.rbds,
        ..Default::default()
    };

    let dsp = match args.modulation() {
        Modulation::Wx => FmDemodulator::weather(sample_rate)?,
        _ => FmDemodulator::wideband(sample_rate)?,
    };

    let mut stream = StreamEngine::open(device, dsp, &settings, &config)?;

    let meter = if args.meter {
        // rtl_tcp serves a single client, so a second session may be refused
        match MeterSession::start(&args, &settings) {
            Ok(meter) => Some(meter),
            Err(e) => {
                log::warn!("Signal meter unavailable: {}", e);
                None
            }
        }
    } else {
        None
    };

    let mut audio = None;
    stream.enum_properties(&mut |props: &StreamProperties| {
        log::debug!("Stream {}: {:?}", props.stream_id, props);
        if props.stream_id == STREAM_ID_AUDIO {
            audio = Some(props.clone());
        }
    });
    let audio: StreamProperties = audio.ok_or("stream reported no audio")?;

    let filename = generate_filename(args.modulation(), args.frequency.0, Local::now(), 0.0);
    let path = args.output_dir.join(&filename);
    let mut recorder = PcmRecorder::create(&path, &audio)?;
    log::info!("Recording to {}", path.display());

    let result = pump(&mut stream, &mut recorder, args.duration);

    stream.close();
    if let Some(meter) = meter {
        meter.stop();
    }
    log::info!("Recorded {:.1} s of audio", recorder.duration_secs());
    recorder.finalize()?;

    result
}

/// Pull packets until the stream ends or the duration limit is reached
fn pump(
    stream: &mut FmStream,
    recorder: &mut PcmRecorder,
    duration: Option<f64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut last_quality = -1;

    while let Some(packet) = stream.demux_read()? {
        match packet.stream_id {
            STREAM_ID_AUDIO => {
                recorder.write_packet(&packet)?;

                let quality = stream.signal_quality();
                if quality.quality / 10 != last_quality / 10 {
                    log::debug!("Signal quality {}%, SNR {} dB", quality.quality, quality.snr);
                    last_quality = quality.quality;
                }

                if duration.is_some_and(|limit| recorder.duration_secs() >= limit) {
                    break;
                }
            }
            STREAM_ID_UECP => log_uecp(stream, &packet.data),
            STREAM_ID_STREAMCHANGE => log::warn!("Stream discontinuity ({} so far)", stream.resync_count()),
            _ => {}
        }
    }

    Ok(())
}

fn log_uecp(stream: &FmStream, packet: &[u8]) {
    let frame = match decode_packet(packet) {
        Ok(frame) => frame,
        Err(e) => {
            log::warn!("{}", e);
            return;
        }
    };

    let message = &frame.message;
    match frame.mec() {
        Some(MEC_PI) if message.len() >= 5 => {
            let pi = u16::from_be_bytes([message[3], message[4]]);
            match stream.station_id() {
                Some(id) if id != format!("{:04X}", pi) => log::info!("PI {:04X} ({})", pi, id),
                _ => log::info!("PI {:04X}", pi),
            }
        }
        Some(MEC_PTY) if message.len() >= 4 => log::info!("PTY {}", message[3]),
        Some(MEC_PS) if message.len() >= 11 => {
            log::info!("PS \"{}\"", String::from_utf8_lossy(&message[3..11]))
        }
        Some(MEC_RT) if message.len() >= 5 => {
            log::info!("RT \"{}\"", String::from_utf8_lossy(&message[5..]).trim_end())
        }
        Some(mec) => log::debug!("UECP element {:02X} ({} bytes)", mec, message.len()),
        None => {}
    }
}

/// Signal meter running on its own device session and thread
struct MeterSession {
    device: Arc<dyn DeviceSource>,
    handle: JoinHandle<()>,
}

impl MeterSession {
    fn start(args: &Args, settings: &TunerSettings) -> Result<Self, Box<dyn std::error::Error>> {
        let (device, sample_rate) = args.open_device()?;
        device.set_sample_rate(sample_rate)?;
        device.set_center_frequency(settings.frequency_hz)?;
        device.set_automatic_gain_control(true)?;

        let props = SignalPlotProps {
            rate_hz: 1,
            bandwidth_hz: match args.modulation() {
                Modulation::Wx => 25_000,
                _ => 200_000,
            },
            ..Default::default()
        };
        let mut meter = SignalMeter::new(
            props,
            sample_rate,
            Box::new(|status: &SignalStatus<'_>| {
                log::info!(
                    "Signal {:.1} dB, noise {:.1} dB, SNR {:.1} dB{}",
                    status.power,
                    status.noise,
                    status.snr,
                    if status.overload { " (overload)" } else { "" }
                );
            }),
        )?;

        let worker = Arc::clone(&device);
        let handle = thread::Builder::new()
            .name("signal-meter".to_string())
            .spawn(move || {
                let result = worker.begin_stream().and_then(|()| {
                    worker.read_async(METER_BLOCK_LEN, &mut |block: &[u8]| {
                        if let Err(e) = meter.input_samples(block) {
                            log::warn!("Signal meter: {}", e);
                        }
                    })
                });
                if let Err(e) = result {
                    log::warn!("Signal meter stopped: {}", e);
                }
            })?;

        Ok(Self { device, handle })
    }

    fn stop(self) {
        self.device.cancel_async();
        if self.handle.join().is_err() {
            log::error!("Signal meter thread panicked");
        }
    }
}
