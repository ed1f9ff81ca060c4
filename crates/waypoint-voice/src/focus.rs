//! Audio focus held around each utterance.

use crate::platform::{
    AudioAttributes, AudioFocusManager, AudioStream, FocusGain, FocusGrant, FocusRequest,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::{debug, warn};

/// Pairs every focus request with exactly one abandon.
///
/// Focus is taken when an utterance starts and given back when that utterance
/// ends, fails, or is stopped. Ids with focus outstanding are tracked so a
/// duplicate or stale callback never produces an extra request or abandon.
pub struct FocusController {
    manager: Arc<dyn AudioFocusManager>,
    gain: FocusGain,
    attributes: AudioAttributes,
    request: OnceLock<FocusRequest>,
    held: Mutex<HashSet<String>>,
}

impl FocusController {
    pub fn new(
        manager: Arc<dyn AudioFocusManager>,
        gain: FocusGain,
        attributes: AudioAttributes,
    ) -> Self {
        Self {
            manager,
            gain,
            attributes,
            request: OnceLock::new(),
            held: Mutex::new(HashSet::new()),
        }
    }

    fn request(&self) -> &FocusRequest {
        self.request.get_or_init(|| FocusRequest {
            gain: self.gain,
            attributes: self.attributes,
        })
    }

    /// Take focus for `utterance_id`. No-op if it already holds focus.
    pub fn acquire(&self, utterance_id: &str) {
        let inserted = self
            .held
            .lock()
            .map(|mut held| held.insert(utterance_id.to_string()))
            .unwrap_or(false);
        if !inserted {
            return;
        }

        let grant = if self.manager.supports_focus_requests() {
            self.manager.request_focus(self.request())
        } else {
            self.manager
                .request_legacy_focus(AudioStream::Notification, self.gain)
        };
        match grant {
            FocusGrant::Granted => debug!(utterance_id, "audio focus granted"),
            other => warn!(utterance_id, ?other, "audio focus not granted; speaking anyway"),
        }
    }

    /// Give back focus held for `utterance_id`. No-op if none is held.
    pub fn release(&self, utterance_id: &str) {
        let removed = self
            .held
            .lock()
            .map(|mut held| held.remove(utterance_id))
            .unwrap_or(false);
        if removed {
            self.abandon();
            debug!(utterance_id, "audio focus abandoned");
        }
    }

    /// Give back every outstanding focus hold.
    pub fn release_all(&self) {
        let drained: Vec<String> = match self.held.lock() {
            Ok(mut held) => held.drain().collect(),
            Err(_) => Vec::new(),
        };
        for utterance_id in &drained {
            self.abandon();
            debug!(utterance_id = %utterance_id, "audio focus abandoned on stop");
        }
    }

    /// Number of utterances currently holding focus.
    pub fn outstanding(&self) -> usize {
        self.held.lock().map(|held| held.len()).unwrap_or(0)
    }

    fn abandon(&self) {
        if self.manager.supports_focus_requests() {
            self.manager.abandon_focus(self.request());
        } else {
            self.manager.abandon_legacy_focus();
        }
    }
}
