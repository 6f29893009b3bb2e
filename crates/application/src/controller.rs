//! Thin session orchestration: binds capture, transport, and transcript
//! reconciliation together and maps raw failures to user-facing categories.

use std::sync::Arc;

use async_trait::async_trait;
use crossbeam_channel::{Receiver, Sender};
use murmur_audio::{AudioSessionManager, Capture, FrameSink};
use murmur_events::RemoteEvent;
use murmur_transcript::{TranscriptEvent, TranscriptState};
use murmur_transport::{ChunkSender, FrameTransport};

use crate::error::{ControlError, SessionError};

/// Session control channel to the host process. The remote protocol's
/// handshake and auth live behind this boundary.
#[async_trait]
pub trait ControlChannel: Send + Sync {
    async fn start_transcription(&self, sample_rate: u32) -> Result<(), ControlError>;
    async fn stop_transcription(&self) -> Result<(), ControlError>;
}

/// Orchestrates one dictation session end to end.
///
/// All transcript and status mutation happens on the thread driving this
/// controller; the bridge pushes inbound events through [`event_sender`]
/// and the owner drains them with [`pump_events`].
///
/// [`event_sender`]: SessionController::event_sender
/// [`pump_events`]: SessionController::pump_events
pub struct SessionController<C: Capture = AudioSessionManager> {
    capture: C,
    transport: FrameTransport,
    transcript: TranscriptState,
    control: Arc<dyn ControlChannel>,
    events_tx: Sender<RemoteEvent>,
    events_rx: Receiver<RemoteEvent>,
    remote_connected: bool,
}

impl SessionController {
    pub fn new(
        control: Arc<dyn ControlChannel>,
        chunks: Arc<dyn ChunkSender>,
        handle: tokio::runtime::Handle,
    ) -> Self {
        Self::with_capture(AudioSessionManager::new(), control, chunks, handle)
    }
}

impl<C: Capture> SessionController<C> {
    /// Build a controller around a specific capture backend.
    pub fn with_capture(
        capture: C,
        control: Arc<dyn ControlChannel>,
        chunks: Arc<dyn ChunkSender>,
        handle: tokio::runtime::Handle,
    ) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            capture,
            transport: FrameTransport::new(chunks, handle),
            transcript: TranscriptState::new(),
            control,
            events_tx,
            events_rx,
            remote_connected: false,
        }
    }

    /// Start a session: reset transcript buffers, bring up capture, then
    /// configure the remote service with the negotiated rate.
    ///
    /// Any failure rolls the whole session back before the classified error
    /// surfaces, so a later `start` begins from a clean slate.
    pub async fn start(&mut self) -> Result<u32, SessionError> {
        if self.capture.is_active() {
            if let Some(rate) = self.capture.sample_rate() {
                return Ok(rate);
            }
        }

        self.transcript.begin();

        let sink: Arc<dyn FrameSink> = Arc::new(self.transport.clone());
        let mut negotiated = 0;
        if let Err(err) = self.capture.start(sink, &mut |rate| negotiated = rate) {
            tracing::warn!(%err, "capture start failed");
            self.rollback().await;
            return Err(err.into());
        }

        if let Err(err) = self.control.start_transcription(negotiated).await {
            tracing::warn!(%err, "remote session start failed");
            self.rollback().await;
            return Err(err.into());
        }

        tracing::info!(sample_rate = negotiated, "session started");
        Ok(negotiated)
    }

    /// Stop the session. Capture teardown always runs; a control-channel
    /// failure is reported but cannot leave capture resources live.
    pub async fn stop(&mut self) -> Result<(), SessionError> {
        self.capture.stop();
        self.transport.reset();
        self.transcript.end();
        self.remote_connected = false;

        self.control
            .stop_transcription()
            .await
            .map_err(SessionError::from)
    }

    async fn rollback(&mut self) {
        self.capture.stop();
        self.transport.reset();
        self.transcript.end();
        self.remote_connected = false;
        if let Err(err) = self.control.stop_transcription().await {
            tracing::debug!(%err, "remote stop during rollback failed");
        }
    }

    /// Sender half for the bridge to push inbound events from any thread.
    pub fn event_sender(&self) -> Sender<RemoteEvent> {
        self.events_tx.clone()
    }

    /// Drain pending inbound events in delivery order. Returns how many
    /// were handled.
    pub fn pump_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Apply one inbound event.
    pub fn handle_event(&mut self, event: RemoteEvent) {
        match event {
            RemoteEvent::Transcript(payload) => {
                self.transcript.apply(&TranscriptEvent {
                    utterance: payload.transcript,
                    is_final: payload.speech_final,
                });
            }
            RemoteEvent::Connected => {
                tracing::info!("remote session connected");
                self.remote_connected = true;
            }
            RemoteEvent::Closed => {
                tracing::info!("remote session closed");
                self.remote_connected = false;
            }
        }
    }

    pub fn is_recording(&self) -> bool {
        self.capture.is_active()
    }

    pub fn remote_connected(&self) -> bool {
        self.remote_connected
    }

    pub fn transcript(&self) -> &TranscriptState {
        &self.transcript
    }

    /// Committed text plus interim overlay, for presentation.
    pub fn display_transcript(&self) -> String {
        self.transcript.display()
    }

    /// Frames shed by the transport in the current session.
    pub fn dropped_frames(&self) -> u64 {
        self.transport.dropped_frames()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_events::TranscriptPayload;
    use murmur_transport::ChunkSendError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct StubControl {
        started_with: Mutex<Vec<u32>>,
        stops: AtomicUsize,
        fail_start: bool,
        fail_stop: bool,
    }

    impl StubControl {
        fn new() -> Arc<Self> {
            Self::with_failures(false, false)
        }

        fn with_failures(fail_start: bool, fail_stop: bool) -> Arc<Self> {
            Arc::new(Self {
                started_with: Mutex::new(Vec::new()),
                stops: AtomicUsize::new(0),
                fail_start,
                fail_stop,
            })
        }
    }

    #[async_trait]
    impl ControlChannel for StubControl {
        async fn start_transcription(&self, sample_rate: u32) -> Result<(), ControlError> {
            if self.fail_start {
                return Err(ControlError::Handshake("rejected".to_string()));
            }
            self.started_with.lock().unwrap().push(sample_rate);
            Ok(())
        }

        async fn stop_transcription(&self) -> Result<(), ControlError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            if self.fail_stop {
                Err(ControlError::Unavailable("bridge gone".to_string()))
            } else {
                Ok(())
            }
        }
    }

    struct NullChunks;

    #[async_trait]
    impl ChunkSender for NullChunks {
        async fn send_chunk(&self, _chunk: Vec<u8>) -> Result<(), ChunkSendError> {
            Ok(())
        }
    }

    /// Capture stand-in that fails a configurable number of starts before
    /// coming up at a fixed rate.
    struct FlakyCapture {
        failures_left: usize,
        active: bool,
        rate: u32,
    }

    impl FlakyCapture {
        fn new(failures_left: usize) -> Self {
            Self { failures_left, active: false, rate: 16_000 }
        }
    }

    impl Capture for FlakyCapture {
        fn start(
            &mut self,
            _sink: Arc<dyn FrameSink>,
            on_sample_rate: &mut dyn FnMut(u32),
        ) -> murmur_audio::Result<u32> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(murmur_audio::AudioError::NoInputDevice);
            }
            self.active = true;
            on_sample_rate(self.rate);
            Ok(self.rate)
        }

        fn stop(&mut self) {
            self.active = false;
        }

        fn is_active(&self) -> bool {
            self.active
        }

        fn sample_rate(&self) -> Option<u32> {
            self.active.then_some(self.rate)
        }
    }

    fn controller(control: Arc<StubControl>) -> SessionController {
        SessionController::new(control, Arc::new(NullChunks), tokio::runtime::Handle::current())
    }

    fn flaky_controller(
        start_failures: usize,
        control: Arc<StubControl>,
    ) -> SessionController<FlakyCapture> {
        SessionController::with_capture(
            FlakyCapture::new(start_failures),
            control,
            Arc::new(NullChunks),
            tokio::runtime::Handle::current(),
        )
    }

    fn transcript_event(text: &str, speech_final: bool) -> RemoteEvent {
        RemoteEvent::Transcript(TranscriptPayload {
            transcript: text.to_string(),
            speech_final,
        })
    }

    #[tokio::test]
    async fn test_event_routing_updates_transcript() {
        let control = StubControl::new();
        let mut controller = controller(control);
        controller.transcript.begin();

        let sender = controller.event_sender();
        sender.send(transcript_event("hel", false)).unwrap();
        sender.send(transcript_event("hello", false)).unwrap();
        sender.send(transcript_event("hello there", true)).unwrap();

        assert_eq!(controller.pump_events(), 3);
        assert_eq!(controller.transcript().interim(), "");
        assert_eq!(controller.display_transcript(), "hello there");
    }

    #[tokio::test]
    async fn test_status_events_toggle_connection() {
        let control = StubControl::new();
        let mut controller = controller(control);

        assert!(!controller.remote_connected());
        controller.handle_event(RemoteEvent::Connected);
        assert!(controller.remote_connected());
        controller.handle_event(RemoteEvent::Closed);
        assert!(!controller.remote_connected());
    }

    #[tokio::test]
    async fn test_pump_preserves_delivery_order() {
        let control = StubControl::new();
        let mut controller = controller(control);
        controller.transcript.begin();

        let sender = controller.event_sender();
        sender.send(transcript_event("one", true)).unwrap();
        sender.send(transcript_event("two", true)).unwrap();
        sender.send(transcript_event("stale interim", false)).unwrap();
        controller.pump_events();

        assert_eq!(controller.transcript().committed(), "one two");
        assert_eq!(controller.transcript().interim(), "stale interim");
    }

    #[tokio::test]
    async fn test_stop_before_start_is_safe() {
        let control = StubControl::new();
        let mut controller = controller(control.clone());

        assert!(controller.stop().await.is_ok());
        assert!(controller.stop().await.is_ok());
        assert!(!controller.is_recording());
        assert_eq!(control.stops.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stop_surfaces_remote_error_but_tears_down() {
        let control = StubControl::with_failures(false, true);
        let mut controller = controller(control);

        let err = controller.stop().await.unwrap_err();
        assert!(matches!(err, SessionError::Remote(_)));
        assert!(!controller.is_recording());
        assert!(!controller.remote_connected());
    }

    #[tokio::test]
    async fn test_transcript_kept_after_stop() {
        let control = StubControl::new();
        let mut controller = controller(control);
        controller.transcript.begin();
        controller.handle_event(transcript_event("keep me", true));

        controller.stop().await.unwrap();
        assert_eq!(controller.display_transcript(), "keep me");

        // Late events after stop are dropped, not committed.
        controller.handle_event(transcript_event("too late", true));
        assert_eq!(controller.display_transcript(), "keep me");
    }

    #[tokio::test]
    async fn test_capture_failure_rolls_back_and_recovers() {
        let control = StubControl::new();
        let mut controller = flaky_controller(1, control.clone());

        let err = controller.start().await.unwrap_err();
        assert_eq!(err, SessionError::DeviceUnavailable);
        assert!(!controller.is_recording());
        assert_eq!(controller.display_transcript(), "");
        // The remote was never configured, and rollback told it to stop.
        assert!(control.started_with.lock().unwrap().is_empty());
        assert_eq!(control.stops.load(Ordering::SeqCst), 1);

        // The failure leaves nothing behind; the next attempt comes up clean.
        let rate = controller.start().await.unwrap();
        assert_eq!(rate, 16_000);
        assert!(controller.is_recording());
        assert_eq!(*control.started_with.lock().unwrap(), vec![16_000]);
    }

    #[tokio::test]
    async fn test_remote_start_failure_tears_down_capture() {
        let control = StubControl::with_failures(true, false);
        let mut controller = flaky_controller(0, control.clone());

        let err = controller.start().await.unwrap_err();
        assert!(matches!(err, SessionError::Remote(_)));
        assert!(!controller.is_recording());
        assert_eq!(control.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_start_is_idempotent_while_recording() {
        let control = StubControl::new();
        let mut controller = flaky_controller(0, control.clone());

        assert_eq!(controller.start().await.unwrap(), 16_000);
        assert_eq!(controller.start().await.unwrap(), 16_000);
        // Only the first start reached the remote.
        assert_eq!(*control.started_with.lock().unwrap(), vec![16_000]);
    }
}
