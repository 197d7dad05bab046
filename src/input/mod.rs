pub mod device;
pub mod rtltcp;
pub mod wav;

pub use device::{nearest_gain, DeviceSource};
pub use rtltcp::{RtlTcpDevice, TunerType};
pub use wav::WavDevice;

/// IQ sample pair (In-phase, Quadrature)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IqSample {
    pub i: f32,
    pub q: f32,
}

impl IqSample {
    pub fn new(i: f32, q: f32) -> Self {
        Self { i, q }
    }
}

/// Map one unsigned 8-bit sample from `[0, 255]` onto `[-scale, scale]`.
#[inline]
pub fn normalize_u8(sample: u8, scale: f32) -> f32 {
    (sample as f32 - 127.5) / 127.5 * scale
}

/// Convert interleaved unsigned 8-bit I/Q bytes into samples, appending to `out`.
///
/// A trailing odd byte is ignored.
pub fn normalize_samples(raw: &[u8], scale: f32, out: &mut Vec<IqSample>) {
    out.reserve(raw.len() / 2);
    out.extend(
        raw.chunks_exact(2)
            .map(|chunk| IqSample::new(normalize_u8(chunk[0], scale), normalize_u8(chunk[1], scale))),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_range() {
        assert!((normalize_u8(0, 1.0) + 1.0).abs() < 1e-6);
        assert!((normalize_u8(255, 1.0) - 1.0).abs() < 1e-6);
        assert!(normalize_u8(128, 1.0).abs() < 0.01);
        assert!((normalize_u8(255, 32767.0) - 32767.0).abs() < 0.01);
    }

    #[test]
    fn test_normalize_samples_pairs() {
        let raw = [128u8, 128, 0, 255, 255, 0, 7];
        let mut out = Vec::new();
        normalize_samples(&raw, 1.0, &mut out);

        assert_eq!(out.len(), 3);
        assert!(out[0].i.abs() < 0.01 && out[0].q.abs() < 0.01);
        assert!((out[1].i + 1.0).abs() < 0.01 && (out[1].q - 1.0).abs() < 0.01);
        assert!((out[2].i - 1.0).abs() < 0.01 && (out[2].q + 1.0).abs() < 0.01);
    }
}
