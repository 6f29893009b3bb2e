mod agc;
mod aggregator;
mod frame;
mod session;

pub use aggregator::FrameAggregator;
pub use frame::{target_frame_samples, PcmFrame, FRAME_DURATION_MS, MIN_FRAME_SAMPLES};
pub use session::{AudioSessionManager, Capture, FrameSink};

/// Capture rate we ask the device for first; lower rates keep the
/// per-frame payload small on the wire.
pub const PREFERRED_SAMPLE_RATE: u32 = 16_000;

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("no input device available")]
    NoInputDevice,
    #[error("device error: {0}")]
    DeviceError(#[from] cpal::DevicesError),
    #[error("no usable input config: {0}")]
    ConfigError(#[from] cpal::DefaultStreamConfigError),
    #[error("build stream error: {0}")]
    BuildStreamError(#[from] cpal::BuildStreamError),
    #[error("failed to start stream: {0}")]
    PlayStreamError(#[from] cpal::PlayStreamError),
    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, AudioError>;
