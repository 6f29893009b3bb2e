//! Session orchestration for the dictation core.
//!
//! Wires the capture session, the backpressure-limited frame transport, and
//! the transcript reconciliation engine together behind a small surface the
//! presentation layer can drive.

mod controller;
mod error;

pub use controller::{ControlChannel, SessionController};
pub use error::{classify_capture_error, ControlError, SessionError};
