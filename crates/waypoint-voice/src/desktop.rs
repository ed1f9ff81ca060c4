//! Collaborators for hosts without OS focus arbitration or telephony.

use crate::platform::{AudioFocusManager, AudioMode, AudioModeObserver, FocusGrant, FocusRequest};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use tracing::debug;

/// Grants every request and logs it.
#[derive(Debug, Default)]
pub struct LoggingFocusManager {
    held: AtomicUsize,
}

impl LoggingFocusManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests not yet abandoned.
    pub fn held(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }
}

impl AudioFocusManager for LoggingFocusManager {
    fn request_focus(&self, request: &FocusRequest) -> FocusGrant {
        let held = self.held.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(gain = ?request.gain, usage = ?request.attributes.usage, held, "focus requested");
        FocusGrant::Granted
    }

    fn abandon_focus(&self, _request: &FocusRequest) {
        let previous = self
            .held
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |h| Some(h.saturating_sub(1)))
            .unwrap_or(0);
        debug!(held = previous.saturating_sub(1), "focus abandoned");
    }
}

/// Audio mode that never changes.
#[derive(Debug, Clone, Copy)]
pub struct FixedAudioMode(pub AudioMode);

impl Default for FixedAudioMode {
    fn default() -> Self {
        Self(AudioMode::Normal)
    }
}

impl AudioModeObserver for FixedAudioMode {
    fn audio_mode(&self) -> AudioMode {
        self.0
    }
}

/// Audio mode that a host (or a call-state bridge) updates at runtime.
#[derive(Debug)]
pub struct SharedAudioMode {
    mode: AtomicU8,
}

impl Default for SharedAudioMode {
    fn default() -> Self {
        Self::new(AudioMode::Normal)
    }
}

impl SharedAudioMode {
    pub fn new(mode: AudioMode) -> Self {
        Self {
            mode: AtomicU8::new(encode(mode)),
        }
    }

    pub fn set(&self, mode: AudioMode) {
        self.mode.store(encode(mode), Ordering::SeqCst);
    }
}

impl AudioModeObserver for SharedAudioMode {
    fn audio_mode(&self) -> AudioMode {
        decode(self.mode.load(Ordering::SeqCst))
    }
}

fn encode(mode: AudioMode) -> u8 {
    match mode {
        AudioMode::Normal => 0,
        AudioMode::Ringtone => 1,
        AudioMode::InCall => 2,
        AudioMode::InCommunication => 3,
        AudioMode::CallScreening => 4,
    }
}

fn decode(raw: u8) -> AudioMode {
    match raw {
        1 => AudioMode::Ringtone,
        2 => AudioMode::InCall,
        3 => AudioMode::InCommunication,
        4 => AudioMode::CallScreening,
        _ => AudioMode::Normal,
    }
}
