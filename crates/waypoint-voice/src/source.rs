//! Guidance event delivery: listener registration and subscription handles.

use crate::event::GuidanceEvent;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Identifies one registered listener on a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Receives guidance events. Must not block.
pub trait GuidanceEventListener: Send + Sync {
    fn on_guidance_event(&self, event: GuidanceEvent);
}

/// Something that pushes guidance events, normally the navigation SDK.
pub trait GuidanceEventSource: Send + Sync {
    fn subscribe(&self, listener: Arc<dyn GuidanceEventListener>) -> ListenerId;

    fn unsubscribe(&self, id: ListenerId);
}

/// Live registration on a [`GuidanceEventSource`].
///
/// Dropping the handle unsubscribes.
pub struct Subscription {
    source: Arc<dyn GuidanceEventSource>,
    id: ListenerId,
    active: Arc<AtomicBool>,
}

impl Subscription {
    pub(crate) fn new(
        source: Arc<dyn GuidanceEventSource>,
        id: ListenerId,
        active: Arc<AtomicBool>,
    ) -> Self {
        Self { source, id, active }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Unsubscribe now rather than at drop.
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.source.unsubscribe(self.id);
        self.active.store(false, Ordering::SeqCst);
        debug!(listener = self.id.0, "guidance subscription released");
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// In-process fan-out of guidance events.
///
/// Stands in for the navigation SDK when events come from a script, a test,
/// or a bridge to another process.
#[derive(Default)]
pub struct GuidanceEventHub {
    listeners: DashMap<u64, Arc<dyn GuidanceEventListener>>,
    next_id: AtomicU64,
}

impl GuidanceEventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every listener.
    pub fn publish(&self, event: GuidanceEvent) {
        // Snapshot first so a listener may unsubscribe from inside the callback.
        let listeners: Vec<Arc<dyn GuidanceEventListener>> = self
            .listeners
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        debug!(event_id = %event.id, listeners = listeners.len(), "publishing guidance event");
        for listener in listeners {
            listener.on_guidance_event(event.clone());
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl GuidanceEventSource for GuidanceEventHub {
    fn subscribe(&self, listener: Arc<dyn GuidanceEventListener>) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.insert(id, listener);
        ListenerId(id)
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.listeners.remove(&id.0);
    }
}
