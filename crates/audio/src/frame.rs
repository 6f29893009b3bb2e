/// Duration of audio covered by one complete frame.
pub const FRAME_DURATION_MS: u32 = 40;

/// Smallest frame we ever emit, regardless of the negotiated sample rate.
pub const MIN_FRAME_SAMPLES: usize = 128;

/// Number of samples per frame at the given capture rate.
pub fn target_frame_samples(sample_rate: u32) -> usize {
    let samples = (sample_rate as u64 * FRAME_DURATION_MS as u64 + 500) / 1000;
    (samples as usize).max(MIN_FRAME_SAMPLES)
}

/// A completed block of mono 16-bit PCM, the unit of network transport.
///
/// Frames are immutable once built; the aggregator hands ownership to the
/// transport and never touches an emitted frame again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmFrame {
    samples: Box<[i16]>,
}

impl PcmFrame {
    pub fn new(samples: Vec<i16>) -> Self {
        Self {
            samples: samples.into_boxed_slice(),
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Raw little-endian wire payload, `2 * len()` bytes.
    pub fn into_le_bytes(self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.samples.len() * 2);
        for sample in self.samples.iter() {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }
}

/// Convert one capture sample to signed 16-bit PCM.
///
/// Input is clamped to [-1.0, 1.0] first, so out-of-range values saturate
/// instead of wrapping; 1.0 maps to 32767 and -1.0 to -32768.
#[inline]
pub(crate) fn sample_to_i16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    (clamped * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16
}
