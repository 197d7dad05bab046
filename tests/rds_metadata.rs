mod common;

use std::time::Duration;

use common::{MockDevice, MockDsp, Step};
use crossbeam::channel::bounded;

use rtl_radio::packet::{STREAM_ID_AUDIO, STREAM_ID_UECP};
use rtl_radio::rds::uecp::{MEC_PI, MEC_PS, MEC_RT};
use rtl_radio::rds::{decode_packet, RdsGroup, UecpDataFrame};
use rtl_radio::{EngineConfig, Modulation, RadioStream, StreamEngine, TunerSettings};

const PI_KODI: u16 = 0x354E;

fn ps_group(address: u16, text: &[u8; 8]) -> RdsGroup {
    let chars = &text[address as usize * 2..address as usize * 2 + 2];
    [PI_KODI, address, 0x0000, u16::from_be_bytes([chars[0], chars[1]])]
}

fn rt_group(address: u16, chars: &[u8; 4]) -> RdsGroup {
    [
        PI_KODI,
        0x2000 | address,
        u16::from_be_bytes([chars[0], chars[1]]),
        u16::from_be_bytes([chars[2], chars[3]]),
    ]
}

/// Run the scripted groups through an FM engine and collect the UECP frames
fn decode_through_engine(batches: Vec<Vec<RdsGroup>>, rbds: bool) -> (Vec<UecpDataFrame>, Option<String>) {
    let (tx, rx) = bounded(1);
    // One trailing block without groups so every UECP packet precedes the last audio packet
    let block_count = batches.len() + 1;
    let mut script: Vec<Step> = (0..block_count).map(|_| Step::Block(vec![128; 8])).collect();
    script.push(Step::Notify(tx));

    let mut dsp = MockDsp::new(Modulation::Fm, 4);
    dsp.groups = batches.into();
    let config = EngineConfig {
        device_block_len: 8,
        ring_capacity: Some(1024),
        rbds,
        ..Default::default()
    };
    let mut stream = StreamEngine::open(MockDevice::new(script), dsp, &TunerSettings::default(), &config).unwrap();
    rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let mut frames = Vec::new();
    let mut audio = 0;
    let mut last_uecp_dts = 0;
    while audio < block_count {
        let packet = stream.demux_read().unwrap().unwrap();
        match packet.stream_id {
            STREAM_ID_AUDIO => audio += 1,
            STREAM_ID_UECP => {
                assert!(packet.dts >= last_uecp_dts);
                last_uecp_dts = packet.dts;
                frames.push(decode_packet(&packet.data).unwrap());
            }
            other => panic!("unexpected stream {}", other),
        }
    }

    let station = stream.station_id();
    stream.close();
    (frames, station)
}

fn with_mec(frames: &[UecpDataFrame], mec: u8) -> Vec<&UecpDataFrame> {
    frames.iter().filter(|f| f.mec() == Some(mec)).collect()
}

#[test]
fn test_ps_name_assembled_from_shuffled_quadrants() {
    let text = b"KODI    ";
    let batches = vec![
        vec![ps_group(2, text), ps_group(0, text)],
        vec![ps_group(3, text)],
        vec![ps_group(1, text)],
    ];
    let (frames, _) = decode_through_engine(batches, false);

    let pi = with_mec(&frames, MEC_PI);
    assert_eq!(pi.len(), 1);
    assert_eq!(&pi[0].message[3..5], &PI_KODI.to_be_bytes());

    let ps = with_mec(&frames, MEC_PS);
    assert_eq!(ps.len(), 1);
    assert_eq!(&ps[0].message[3..], b"KODI    ");
}

#[test]
fn test_incomplete_ps_is_not_emitted() {
    let text = b"KODI    ";
    let batches = vec![vec![ps_group(0, text), ps_group(1, text)], vec![ps_group(3, text)]];
    let (frames, _) = decode_through_engine(batches, false);
    assert!(with_mec(&frames, MEC_PS).is_empty());
}

#[test]
fn test_radiotext_carriage_return_completes_early() {
    let batches = vec![vec![rt_group(0, b"Now ")], vec![rt_group(1, b"play")], vec![rt_group(2, b"ing\r")]];
    let (frames, _) = decode_through_engine(batches, false);

    let rt = with_mec(&frames, MEC_RT);
    assert_eq!(rt.len(), 1);
    assert_eq!(&rt[0].message[5..], b"Now playing");
}

#[test]
fn test_rbds_call_sign_reported_by_stream() {
    let text = b"KODI    ";
    let (_, station) = decode_through_engine(vec![vec![ps_group(0, text)]], true);
    assert_eq!(station.as_deref(), Some("KODI"));

    let (_, station) = decode_through_engine(vec![vec![ps_group(0, text)]], false);
    assert_eq!(station.as_deref(), Some("354E"));
}
