//! Accumulates capture batches into fixed-duration PCM frames.
//!
//! Runs on the real-time capture callback: no I/O, no locks, and the only
//! allocation is the replacement buffer when a frame fills.

use crate::frame::{sample_to_i16, target_frame_samples, PcmFrame};

/// Converts a stream of f32 sample batches into complete [`PcmFrame`]s.
///
/// A single batch may complete zero, one, or several frames; any remainder
/// carries into the next frame's buffer. No samples are lost or reordered.
#[derive(Debug)]
pub struct FrameAggregator {
    target: usize,
    buf: Vec<i16>,
}

impl FrameAggregator {
    pub fn new(sample_rate: u32) -> Self {
        let target = target_frame_samples(sample_rate);
        Self {
            target,
            buf: Vec::with_capacity(target),
        }
    }

    /// Samples per completed frame.
    pub fn target_samples(&self) -> usize {
        self.target
    }

    /// Occupancy of the partial frame buffer.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Consume a capture batch, handing each completed frame to `emit`.
    ///
    /// Empty batches are skipped with the partial buffer untouched. This
    /// stage never fails.
    pub fn push(&mut self, samples: &[f32], mut emit: impl FnMut(PcmFrame)) {
        if samples.is_empty() {
            return;
        }

        let mut i = 0;
        while i < samples.len() {
            let remaining = self.target - self.buf.len();
            let take = remaining.min(samples.len() - i);
            for &s in &samples[i..i + take] {
                self.buf.push(sample_to_i16(s));
            }
            i += take;

            if self.buf.len() == self.target {
                let full = std::mem::replace(&mut self.buf, Vec::with_capacity(self.target));
                emit(PcmFrame::new(full));
            }
        }
    }
}
