//! Backpressure-limited frame transport.
//!
//! Forwards completed PCM frames to the remote STT bridge as fire-and-forget
//! sends, capping the number in flight. When the bridge falls behind, new
//! frames are dropped on the spot: never queued, never retried. The remote
//! service degrades gracefully over small gaps, so shedding load beats
//! letting latency grow.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use murmur_audio::{FrameSink, PcmFrame};

/// Ceiling on unsettled sends; frames beyond it are dropped.
pub const MAX_IN_FLIGHT: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum ChunkSendError {
    #[error("send rejected: {0}")]
    Rejected(String),
    #[error("channel closed")]
    Closed,
}

/// Outbound boundary to the host process: delivers one frame's raw
/// little-endian bytes to the remote transcription channel.
#[async_trait]
pub trait ChunkSender: Send + Sync {
    async fn send_chunk(&self, chunk: Vec<u8>) -> Result<(), ChunkSendError>;
}

/// Bounded-concurrency, fire-and-forget frame forwarder.
///
/// `send` is callable from the real-time capture callback: it does an atomic
/// admission check and spawns the actual send onto the runtime. Transport
/// errors are swallowed here; they only affect the in-flight counter.
#[derive(Clone)]
pub struct FrameTransport {
    sender: Arc<dyn ChunkSender>,
    handle: tokio::runtime::Handle,
    in_flight: Arc<AtomicUsize>,
    dropped: Arc<AtomicU64>,
}

impl FrameTransport {
    pub fn new(sender: Arc<dyn ChunkSender>, handle: tokio::runtime::Handle) -> Self {
        Self {
            sender,
            handle,
            in_flight: Arc::new(AtomicUsize::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Forward one frame, best effort.
    pub fn send(&self, frame: PcmFrame) {
        // Check-and-increment in one atomic step so the ceiling holds even
        // with concurrent callers.
        let admitted = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                (v < MAX_IN_FLIGHT).then_some(v + 1)
            })
            .is_ok();
        if !admitted {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            // Rate-limit: only log every 10th drop to avoid spamming from
            // the audio callback.
            if dropped % 10 == 1 {
                tracing::warn!(dropped, "transport saturated, dropping frames");
            }
            return;
        }

        let sender = Arc::clone(&self.sender);
        let in_flight = Arc::clone(&self.in_flight);
        let chunk = frame.into_le_bytes();

        self.handle.spawn(async move {
            if let Err(err) = sender.send_chunk(chunk).await {
                tracing::debug!(%err, "audio chunk send failed");
            }
            // Saturating: teardown may already have zeroed the counter
            // while this send was outstanding.
            let _ = in_flight.fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                v.checked_sub(1)
            });
        });
    }

    /// Number of sends currently unsettled.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Total frames shed since construction or the last reset.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Zero the in-flight accounting as part of session teardown.
    pub fn reset(&self) {
        self.in_flight.store(0, Ordering::Release);
        self.dropped.store(0, Ordering::Relaxed);
    }
}

impl FrameSink for FrameTransport {
    fn send(&self, frame: PcmFrame) {
        FrameTransport::send(self, frame);
    }

    fn reset(&self) {
        FrameTransport::reset(self);
    }
}
