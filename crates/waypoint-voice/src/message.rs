//! Spoken messages and the outcome of submitting one.

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// One announcement waiting to be spoken.
///
/// The `id` doubles as the engine utterance id, so engine callbacks can be
/// matched back to the message that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpokenMessage {
    pub text: String,
    pub id: String,
    /// When false, the next queued message waits until this one finishes.
    #[serde(default = "default_true")]
    pub interruptible: bool,
}

impl SpokenMessage {
    /// An interruptible message.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            id: id.into(),
            interruptible: true,
        }
    }

    /// A message that must finish before the next one is handed to the engine.
    pub fn non_interruptible(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            interruptible: false,
            ..Self::new(id, text)
        }
    }
}

/// Why a message never reached the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Audio routing is in a call mode.
    PhoneCall,
    /// The speech engine never became usable.
    InitializationFailed,
    /// `shutdown()` already ran.
    ShutDown,
    /// Nothing to say.
    EmptyText,
}

/// Result of handing a message to the announcer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    Queued,
    Discarded(DiscardReason),
}

impl SpeakOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, SpeakOutcome::Queued)
    }
}
