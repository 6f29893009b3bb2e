//! Shared event contracts for the host-process bridge.
//!
//! The remote STT bridge delivers asynchronous events into the core. Using
//! shared serde types here keeps field names in sync between the bridge and
//! the consumers and prevents runtime deserialization surprises.

use serde::{Deserialize, Serialize};

/// One transcript hypothesis from the remote service.
///
/// `transcript` is the full utterance-so-far, not a delta. `speech_final`
/// marks a committed utterance; bridges that omit the field mean interim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptPayload {
    pub transcript: String,
    #[serde(default)]
    pub speech_final: bool,
}

/// Events arriving on the inbound channel.
///
/// Only `Transcript` reaches the reconciliation engine; `Connected` and
/// `Closed` are status signals for the session controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RemoteEvent {
    Transcript(TranscriptPayload),
    Connected,
    Closed,
}

/// Event names as constants to prevent typos at the bridge boundary.
pub mod event_names {
    /// Transcript hypothesis (interim or final).
    pub const STT_TRANSCRIPT: &str = "stt:transcript";
    /// Remote session established.
    pub const STT_CONNECTED: &str = "stt:connected";
    /// Remote session closed or dropped.
    pub const STT_CLOSED: &str = "stt:closed";
}
