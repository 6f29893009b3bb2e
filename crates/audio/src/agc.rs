//! Smoothed automatic gain control for the capture path.

/// Target RMS level in dBFS; loud enough for speech without clipping.
const TARGET_DBFS: f32 = -20.0;

/// Below this RMS we stop boosting so the noise floor stays quiet.
const NOISE_FLOOR_DBFS: f32 = -50.0;

const MAX_GAIN: f32 = 10.0;
const MIN_GAIN: f32 = 0.1;

/// Per-batch smoothing factor; ~100ms settle time at typical batch rates.
const SMOOTHING: f32 = 0.1;

#[derive(Debug)]
pub(crate) struct AutoGain {
    gain: f32,
}

impl Default for AutoGain {
    fn default() -> Self {
        Self { gain: 1.0 }
    }
}

impl AutoGain {
    /// Apply gain in place, tracking the batch RMS toward the target level.
    pub(crate) fn apply(&mut self, samples: &mut [f32]) {
        if samples.is_empty() {
            return;
        }

        let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
        let rms = (sum_sq / samples.len() as f32).sqrt();
        let rms_dbfs = if rms > 0.0 { 20.0 * rms.log10() } else { -100.0 };

        if rms_dbfs > NOISE_FLOOR_DBFS {
            let target = 10.0_f32
                .powf((TARGET_DBFS - rms_dbfs) / 20.0)
                .clamp(MIN_GAIN, MAX_GAIN);
            self.gain = self.gain * (1.0 - SMOOTHING) + target * SMOOTHING;
        } else {
            // Drift back toward unity during silence.
            self.gain = self.gain * (1.0 - SMOOTHING * 0.5) + SMOOTHING * 0.5;
        }

        for sample in samples.iter_mut() {
            *sample *= self.gain;
            if sample.abs() > 0.9 {
                *sample = sample.signum() * (0.9 + 0.1 * (sample.abs() - 0.9).tanh());
            }
        }
    }
}
