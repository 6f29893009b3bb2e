//! User-facing classification of raw capture and control failures.
//!
//! The core fails loudly only for conditions it cannot recover from locally
//! (device acquisition); everything per-frame is drop-and-continue inside
//! the transport. Message formatting beyond these categories belongs to the
//! presentation layer.

use cpal::BuildStreamError;
use murmur_audio::AudioError;

/// Failures on the session control channel to the host process.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("remote handshake failed: {0}")]
    Handshake(String),
    #[error("control channel unavailable: {0}")]
    Unavailable(String),
}

/// Classified, user-facing session failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("microphone permission denied")]
    PermissionDenied,
    #[error("no usable capture device")]
    DeviceUnavailable,
    #[error("capture device is busy")]
    DeviceBusy,
    #[error("capture configuration not supported: {0}")]
    UnsupportedConfig(String),
    #[error("remote session error: {0}")]
    Remote(String),
}

impl From<AudioError> for SessionError {
    fn from(err: AudioError) -> Self {
        classify_capture_error(&err)
    }
}

impl From<ControlError> for SessionError {
    fn from(err: ControlError) -> Self {
        SessionError::Remote(err.to_string())
    }
}

/// Map a raw capture error onto the user-facing taxonomy.
pub fn classify_capture_error(err: &AudioError) -> SessionError {
    match err {
        AudioError::NoInputDevice | AudioError::DeviceError(_) => SessionError::DeviceUnavailable,
        AudioError::ConfigError(_) => SessionError::UnsupportedConfig(err.to_string()),
        AudioError::UnsupportedFormat(format) => SessionError::UnsupportedConfig(format.clone()),
        AudioError::BuildStreamError(inner) => match inner {
            BuildStreamError::DeviceNotAvailable => SessionError::DeviceUnavailable,
            BuildStreamError::StreamConfigNotSupported | BuildStreamError::InvalidArgument => {
                SessionError::UnsupportedConfig(inner.to_string())
            }
            BuildStreamError::BackendSpecific { err }
                if is_permission_message(&err.description) =>
            {
                SessionError::PermissionDenied
            }
            _ => SessionError::DeviceBusy,
        },
        AudioError::PlayStreamError(_) => SessionError::DeviceBusy,
    }
}

fn is_permission_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("permission") || lower.contains("denied") || lower.contains("not permitted")
}
