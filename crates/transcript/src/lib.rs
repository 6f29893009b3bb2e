//! Transcript reconciliation: merges the remote service's interim and final
//! hypotheses into one stable, monotonically-growing transcript.
//!
//! Each event carries the service's full hypothesis for the *current*
//! utterance, not a delta. Finals are smoothed and appended to the committed
//! transcript; interims replace the transient overlay wholesale.

mod smoothing;

pub use smoothing::smooth;

/// One hypothesis from the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEvent {
    pub utterance: String,
    pub is_final: bool,
}

/// Committed transcript plus interim overlay for one session.
///
/// State machine: `Idle` -> (`begin`) -> `Active` -> (`end`) -> `Idle`.
/// Buffers reset on `begin`, not on `end`, so a stopped session's last
/// transcript stays readable until the next session starts. Events arriving
/// while idle are dropped.
#[derive(Debug, Default)]
pub struct TranscriptState {
    committed: String,
    interim: String,
    active: bool,
}

impl TranscriptState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session: clears both buffers and accepts events.
    pub fn begin(&mut self) {
        self.committed.clear();
        self.interim.clear();
        self.active = true;
    }

    /// End the session; buffers keep their text.
    pub fn end(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Apply one event, in delivery order.
    ///
    /// Finals append to the committed transcript (single-space separated)
    /// and clear the overlay; interims replace the overlay. Utterances that
    /// smooth to empty append nothing.
    pub fn apply(&mut self, event: &TranscriptEvent) {
        if !self.active {
            tracing::debug!(is_final = event.is_final, "transcript event ignored while idle");
            return;
        }

        let smoothed = smooth(&event.utterance);
        if event.is_final {
            if !smoothed.is_empty() {
                if !self.committed.is_empty() {
                    self.committed.push(' ');
                }
                self.committed.push_str(&smoothed);
            }
            self.interim.clear();
        } else {
            self.interim = smoothed;
        }
    }

    /// Append-only text of all finalized utterances.
    pub fn committed(&self) -> &str {
        &self.committed
    }

    /// Current not-yet-final hypothesis; empty right after a final.
    pub fn interim(&self) -> &str {
        &self.interim
    }

    /// Committed text plus overlay, recomputed on demand.
    pub fn display(&self) -> String {
        if self.interim.is_empty() {
            self.committed.clone()
        } else if self.committed.is_empty() {
            self.interim.clone()
        } else {
            format!("{} {}", self.committed, self.interim)
        }
    }
}
