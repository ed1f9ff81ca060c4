//! **GuidanceAnnouncer**: guidance events in, spoken announcements out.

use crate::announcer::{Announcer, Capabilities};
use crate::config::{AnnouncerConfig, Units};
use crate::error::{VoiceError, VoiceResult};
use crate::event::GuidanceEvent;
use crate::message::{SpeakOutcome, SpokenMessage};
use crate::source::{GuidanceEventListener, GuidanceEventSource, Subscription};
use crate::state::AnnouncerState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Listens to a guidance event source and announces each event.
///
/// Only one subscription may be live at a time; [`GuidanceAnnouncer::start`]
/// refuses a second one until the first [`Subscription`] is dropped.
pub struct GuidanceAnnouncer {
    announcer: Announcer,
    units: Units,
    started: Arc<AtomicBool>,
}

impl GuidanceAnnouncer {
    pub fn new(config: AnnouncerConfig, capabilities: Capabilities) -> VoiceResult<Arc<Self>> {
        let units = config.effective_units();
        let announcer = Announcer::new(config, capabilities)?;
        Ok(Arc::new(Self {
            announcer,
            units,
            started: Arc::new(AtomicBool::new(false)),
        }))
    }

    /// Register as a listener on `source`.
    ///
    /// The source only holds a weak reference, so the announcer is still shut
    /// down when its last owner drops it.
    pub fn start(self: &Arc<Self>, source: Arc<dyn GuidanceEventSource>) -> VoiceResult<Subscription> {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(VoiceError::AlreadyStarted);
        }
        let listener = Arc::new(WeakListener(Arc::downgrade(self)));
        let id = source.subscribe(listener);
        debug!(listener = id.0, "guidance announcer subscribed");
        Ok(Subscription::new(source, id, Arc::clone(&self.started)))
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Spoken message for `event` in the configured locale.
    pub fn message_for(&self, event: &GuidanceEvent) -> SpokenMessage {
        event.to_spoken_message(&self.announcer.config().locale, self.units)
    }

    pub async fn speak(&self, message: SpokenMessage) -> SpeakOutcome {
        self.announcer.speak(message).await
    }

    pub fn stop_speaking(&self) {
        self.announcer.stop_speaking();
    }

    pub fn shutdown(&self) {
        self.announcer.shutdown();
    }

    pub fn state(&self) -> AnnouncerState {
        self.announcer.state()
    }

    pub fn announcer(&self) -> &Announcer {
        &self.announcer
    }
}

impl GuidanceEventListener for GuidanceAnnouncer {
    fn on_guidance_event(&self, event: GuidanceEvent) {
        let message = self.message_for(&event);
        let outcome = self.announcer.enqueue(message);
        debug!(event_id = %event.id, ?outcome, "guidance event handled");
    }
}

struct WeakListener(Weak<GuidanceAnnouncer>);

impl GuidanceEventListener for WeakListener {
    fn on_guidance_event(&self, event: GuidanceEvent) {
        if let Some(announcer) = self.0.upgrade() {
            announcer.on_guidance_event(event);
        }
    }
}
