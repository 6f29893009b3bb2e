//! Capture session ownership: device acquisition, config negotiation, and
//! guaranteed teardown.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, SupportedStreamConfig};

use crate::agc::AutoGain;
use crate::aggregator::FrameAggregator;
use crate::frame::PcmFrame;
use crate::{AudioError, PREFERRED_SAMPLE_RATE};

/// Destination for completed frames, invoked on the real-time capture
/// callback. Implementations must not block: `send` may only do bounded
/// work (an admission check and a handoff).
pub trait FrameSink: Send + Sync {
    fn send(&self, frame: PcmFrame);

    /// Discard in-flight accounting for the session being torn down.
    fn reset(&self);
}

/// Capture backend as the session controller sees it. The production
/// implementation is [`AudioSessionManager`]; the seam exists so session
/// control flow can be driven without real hardware.
pub trait Capture {
    /// Start capturing into `sink`. `on_sample_rate` receives the
    /// negotiated rate before any audio flows.
    fn start(
        &mut self,
        sink: Arc<dyn FrameSink>,
        on_sample_rate: &mut dyn FnMut(u32),
    ) -> crate::Result<u32>;

    /// Tear down capture. Infallible and safe to call when idle.
    fn stop(&mut self);

    fn is_active(&self) -> bool;

    fn sample_rate(&self) -> Option<u32>;
}

/// Single owner of the capture device handle and the processing graph
/// (source -> downmix -> gain -> aggregator -> sink).
///
/// `start` is idempotent and `stop` releases every owned resource on all
/// exit paths, so a subsequent `start` always behaves as a fresh session.
pub struct AudioSessionManager {
    session: Option<CaptureSession>,
}

struct CaptureSession {
    _stream: Stream,
    sample_rate: u32,
    sink: Arc<dyn FrameSink>,
}

impl AudioSessionManager {
    pub fn new() -> Self {
        Self { session: None }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Negotiated capture rate of the live session, if any.
    pub fn sample_rate(&self) -> Option<u32> {
        self.session.as_ref().map(|s| s.sample_rate)
    }

    /// Acquire the default input device and start capturing.
    ///
    /// Prefers mono at 16 kHz and falls back to the device default config.
    /// `on_sample_rate` is invoked with the actual rate before the stream
    /// starts, so the remote service can be configured to match. Calling
    /// `start` while a session is live returns the existing rate without
    /// reinitializing anything.
    pub fn start(
        &mut self,
        sink: Arc<dyn FrameSink>,
        on_sample_rate: impl FnOnce(u32),
    ) -> crate::Result<u32> {
        if let Some(session) = &self.session {
            tracing::debug!(
                sample_rate = session.sample_rate,
                "capture already running"
            );
            return Ok(session.sample_rate);
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(AudioError::NoInputDevice)?;
        let config = negotiate_config(&device)?;
        let sample_rate = config.sample_rate().0;
        tracing::info!(
            sample_rate,
            channels = config.channels(),
            format = ?config.sample_format(),
            "capture config negotiated"
        );

        on_sample_rate(sample_rate);

        let stream = build_capture_stream(&device, &config, sample_rate, Arc::clone(&sink))?;
        if let Err(err) = stream.play() {
            // Release the half-built graph before surfacing the failure.
            drop(stream);
            sink.reset();
            return Err(err.into());
        }

        self.session = Some(CaptureSession {
            _stream: stream,
            sample_rate,
            sink,
        });
        Ok(sample_rate)
    }

    /// Tear down the capture session. Infallible and safe to call twice or
    /// before `start`; outstanding sends settling later only touch the
    /// sink's saturating counter.
    pub fn stop(&mut self) {
        let Some(session) = self.session.take() else {
            tracing::debug!("stop called with no active capture session");
            return;
        };

        // Dropping the stream stops the device callback.
        drop(session._stream);
        tracing::info!("capture stream released");

        session.sink.reset();
        tracing::debug!("in-flight frame accounting reset");
    }
}

impl Default for AudioSessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Capture for AudioSessionManager {
    fn start(
        &mut self,
        sink: Arc<dyn FrameSink>,
        on_sample_rate: &mut dyn FnMut(u32),
    ) -> crate::Result<u32> {
        AudioSessionManager::start(self, sink, |rate| on_sample_rate(rate))
    }

    fn stop(&mut self) {
        AudioSessionManager::stop(self);
    }

    fn is_active(&self) -> bool {
        AudioSessionManager::is_active(self)
    }

    fn sample_rate(&self) -> Option<u32> {
        AudioSessionManager::sample_rate(self)
    }
}

fn negotiate_config(device: &Device) -> crate::Result<SupportedStreamConfig> {
    if let Ok(ranges) = device.supported_input_configs() {
        let ranges: Vec<_> = ranges.collect();
        let preferred = cpal::SampleRate(PREFERRED_SAMPLE_RATE);

        // Mono at the preferred rate first, then any channel count; the
        // callback downmixes whatever we get.
        if let Some(config) = ranges
            .iter()
            .filter(|r| r.channels() == 1)
            .chain(ranges.iter().filter(|r| r.channels() != 1))
            .find_map(|r| r.clone().try_with_sample_rate(preferred))
        {
            return Ok(config);
        }
        tracing::debug!(
            preferred = PREFERRED_SAMPLE_RATE,
            "preferred rate unsupported, falling back to device default"
        );
    }

    Ok(device.default_input_config()?)
}

fn build_capture_stream(
    device: &Device,
    config: &SupportedStreamConfig,
    sample_rate: u32,
    sink: Arc<dyn FrameSink>,
) -> crate::Result<Stream> {
    let channels = config.channels() as usize;
    let stream_config: cpal::StreamConfig = config.config();
    let err_fn = |err| tracing::error!("capture stream error: {err}");

    let stream = match config.sample_format() {
        SampleFormat::F32 => {
            let mut pipeline = CapturePipeline::new(sample_rate, channels, sink);
            device.build_input_stream(
                &stream_config,
                move |data: &[f32], _| pipeline.process_f32(data),
                err_fn,
                None,
            )?
        }
        SampleFormat::I16 => {
            let mut pipeline = CapturePipeline::new(sample_rate, channels, sink);
            device.build_input_stream(
                &stream_config,
                move |data: &[i16], _| pipeline.process_i16(data),
                err_fn,
                None,
            )?
        }
        format => {
            return Err(AudioError::UnsupportedFormat(format!("{format:?}")));
        }
    };

    Ok(stream)
}

/// Per-session state owned by the capture callback. The scratch buffers are
/// reused across callbacks so steady-state capture does not allocate.
struct CapturePipeline {
    channels: usize,
    agc: AutoGain,
    aggregator: FrameAggregator,
    sink: Arc<dyn FrameSink>,
    mono: Vec<f32>,
    float: Vec<f32>,
}

impl CapturePipeline {
    fn new(sample_rate: u32, channels: usize, sink: Arc<dyn FrameSink>) -> Self {
        Self {
            channels,
            agc: AutoGain::default(),
            aggregator: FrameAggregator::new(sample_rate),
            sink,
            mono: Vec::new(),
            float: Vec::new(),
        }
    }

    fn process_f32(&mut self, data: &[f32]) {
        downmix_into(data, self.channels, &mut self.mono);
        self.finish();
    }

    fn process_i16(&mut self, data: &[i16]) {
        self.float.clear();
        self.float.extend(data.iter().map(|&s| s as f32 / 32768.0));
        downmix_into(&self.float, self.channels, &mut self.mono);
        self.finish();
    }

    fn finish(&mut self) {
        self.agc.apply(&mut self.mono);
        let sink = &self.sink;
        self.aggregator.push(&self.mono, |frame| sink.send(frame));
    }
}

fn downmix_into(samples: &[f32], channels: usize, out: &mut Vec<f32>) {
    out.clear();
    if channels <= 1 {
        out.extend_from_slice(samples);
        return;
    }
    let inv = 1.0 / channels as f32;
    out.extend(
        samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * inv),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn test_stop_before_start_is_noop() {
        let mut manager = AudioSessionManager::new();
        assert!(!manager.is_active());
        manager.stop();
        manager.stop();
        assert!(!manager.is_active());
        assert_eq!(manager.sample_rate(), None);
    }

    #[test]
    fn test_downmix_stereo_averages() {
        let stereo = [0.2, 0.4, -1.0, 1.0];
        let mut mono = Vec::new();
        downmix_into(&stereo, 2, &mut mono);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.3).abs() < 1e-6);
        assert!(mono[1].abs() < 1e-6);
    }

    #[test]
    fn test_downmix_mono_passthrough() {
        let samples = [0.1, -0.2, 0.3];
        let mut mono = vec![9.0; 8];
        downmix_into(&samples, 1, &mut mono);
        assert_eq!(mono, samples);
    }

    struct CountingSink {
        frames: AtomicUsize,
        samples: Mutex<Vec<i16>>,
    }

    impl FrameSink for CountingSink {
        fn send(&self, frame: PcmFrame) {
            self.frames.fetch_add(1, Ordering::SeqCst);
            self.samples.lock().unwrap().extend_from_slice(frame.samples());
        }

        fn reset(&self) {}
    }

    #[test]
    fn test_pipeline_frames_flow_to_sink() {
        let sink = Arc::new(CountingSink {
            frames: AtomicUsize::new(0),
            samples: Mutex::new(Vec::new()),
        });
        let mut pipeline = CapturePipeline::new(16_000, 1, sink.clone());

        // Silence keeps AGC at unity so the sample count is what matters.
        pipeline.process_f32(&vec![0.0; 640 * 2 + 100]);

        assert_eq!(sink.frames.load(Ordering::SeqCst), 2);
        assert_eq!(sink.samples.lock().unwrap().len(), 640 * 2);
        assert_eq!(pipeline.aggregator.pending(), 100);
    }

    #[test]
    fn test_i16_batches_convert_through_scratch() {
        let sink = Arc::new(CountingSink {
            frames: AtomicUsize::new(0),
            samples: Mutex::new(Vec::new()),
        });
        let mut pipeline = CapturePipeline::new(16_000, 1, sink.clone());

        // Quiet input keeps AGC near unity so conversion is observable
        // end to end: i16 -> f32 -> i16 preserves each sample to within
        // one truncation step.
        let batch: Vec<i16> = (0..640).map(|i| (i % 7) as i16).collect();
        pipeline.process_i16(&batch);

        assert_eq!(sink.frames.load(Ordering::SeqCst), 1);
        let samples = sink.samples.lock().unwrap();
        assert_eq!(samples.len(), batch.len());
        for (got, want) in samples.iter().zip(&batch) {
            assert!((got - want).abs() <= 1, "sample {got} drifted from {want}");
        }
    }

    #[test]
    fn test_scratch_buffers_stop_growing_after_first_batch() {
        let sink = Arc::new(CountingSink {
            frames: AtomicUsize::new(0),
            samples: Mutex::new(Vec::new()),
        });
        let mut pipeline = CapturePipeline::new(16_000, 2, sink);

        let batch = vec![0i16; 960];
        pipeline.process_i16(&batch);
        let float_cap = pipeline.float.capacity();
        let mono_cap = pipeline.mono.capacity();

        for _ in 0..50 {
            pipeline.process_i16(&batch);
        }
        assert_eq!(pipeline.float.capacity(), float_cap);
        assert_eq!(pipeline.mono.capacity(), mono_cap);
    }
}
