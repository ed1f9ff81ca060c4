//! **Announcer**: the single-flight speech queue.
//!
//! Messages go into an unbounded queue drained by one tokio task. The task
//! hands each message to the speech engine and, for non-interruptible messages,
//! waits for the engine to report the utterance finished before taking the
//! next one. Engine callbacks arrive on the engine's own threads and drive the
//! [`StateCell`] and audio focus directly.

use crate::config::{AnnouncerConfig, StopPolicy};
use crate::error::{VoiceError, VoiceResult};
use crate::focus::FocusController;
use crate::message::{DiscardReason, SpeakOutcome, SpokenMessage};
use crate::platform::{
    AudioAttributes, AudioFocusManager, AudioModeObserver, LanguageAvailability, QueueMode,
    SpeechEngine, SpeechParams, UtteranceListener,
};
use crate::state::{
    parse_utterance_id, utterance_id, AnnouncerState, StateCell, StateToken, UtteranceResult,
};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

/// Platform capabilities injected into an announcer.
#[derive(Clone)]
pub struct Capabilities {
    pub engine: Arc<dyn SpeechEngine>,
    pub focus: Arc<dyn AudioFocusManager>,
    pub audio_mode: Arc<dyn AudioModeObserver>,
}

struct Envelope {
    message: SpokenMessage,
    /// Stop epoch at enqueue time; older envelopes are skipped under `ClearPending`.
    epoch: u64,
}

struct Shared {
    engine: Arc<dyn SpeechEngine>,
    audio_mode: Arc<dyn AudioModeObserver>,
    focus: Arc<FocusController>,
    state: StateCell,
    config: AnnouncerConfig,
    shut_down: AtomicBool,
    epoch: AtomicU64,
    pending: AtomicUsize,
}

/// Engine callback sink. Holds only what the callbacks touch, so the engine
/// never keeps the rest of the announcer alive.
struct UtteranceCallbacks {
    state: StateCell,
    focus: Arc<FocusController>,
}

impl UtteranceCallbacks {
    fn finish(&self, utterance_id: &str, result: UtteranceResult) -> bool {
        self.focus.release(utterance_id);
        match parse_utterance_id(utterance_id) {
            Some((_, generation)) => self.state.finish_utterance(generation, result),
            None => {
                debug!(utterance_id, "ignoring callback for foreign utterance id");
                false
            }
        }
    }
}

impl UtteranceListener for UtteranceCallbacks {
    fn on_start(&self, utterance_id: &str) {
        debug!(utterance_id, "utterance started");
        self.focus.acquire(utterance_id);
    }

    fn on_done(&self, utterance_id: &str) {
        if !self.finish(utterance_id, UtteranceResult::Success) {
            debug!(utterance_id, "ignoring done for superseded utterance");
        }
    }

    fn on_error(&self, utterance_id: &str) {
        debug!(utterance_id, "utterance failed");
        self.finish(utterance_id, UtteranceResult::Error);
    }

    fn on_stop(&self, utterance_id: &str) {
        self.finish(utterance_id, UtteranceResult::Stopped);
    }
}

/// Serializes spoken messages into a speech engine.
///
/// Must be created inside a tokio runtime; the queue worker is spawned on it.
/// Dropping the announcer shuts it down.
pub struct Announcer {
    shared: Arc<Shared>,
    tx: mpsc::UnboundedSender<Envelope>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Announcer {
    pub fn new(config: AnnouncerConfig, capabilities: Capabilities) -> VoiceResult<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()?;

        let focus = Arc::new(FocusController::new(
            capabilities.focus,
            config.focus_gain,
            AudioAttributes::NAVIGATION_SPEECH,
        ));
        let shared = Arc::new(Shared {
            engine: capabilities.engine,
            audio_mode: capabilities.audio_mode,
            focus,
            state: StateCell::new(),
            config,
            shut_down: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            pending: AtomicUsize::new(0),
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let worker = runtime.spawn(run_worker(Arc::clone(&shared), rx));

        Ok(Self {
            shared,
            tx,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Hand `message` to the queue.
    ///
    /// Resolves once the message is queued or discarded, not once it is spoken.
    pub async fn speak(&self, message: SpokenMessage) -> SpeakOutcome {
        self.enqueue(message)
    }

    /// Non-async form of [`Announcer::speak`]; never blocks.
    pub fn enqueue(&self, message: SpokenMessage) -> SpeakOutcome {
        let shared = &self.shared;
        if shared.shut_down.load(Ordering::SeqCst) {
            return SpeakOutcome::Discarded(DiscardReason::ShutDown);
        }
        if shared.state.state().is_terminal() {
            return SpeakOutcome::Discarded(DiscardReason::InitializationFailed);
        }
        if message.text.trim().is_empty() {
            return SpeakOutcome::Discarded(DiscardReason::EmptyText);
        }
        if shared.config.drop_during_calls {
            let mode = shared.audio_mode.audio_mode();
            if mode.is_call() {
                debug!(message_id = %message.id, ?mode, "dropping announcement during call");
                return SpeakOutcome::Discarded(DiscardReason::PhoneCall);
            }
        }

        shared.pending.fetch_add(1, Ordering::SeqCst);
        let envelope = Envelope {
            message,
            epoch: shared.epoch.load(Ordering::SeqCst),
        };
        match self.tx.send(envelope) {
            Ok(()) => SpeakOutcome::Queued,
            Err(_) => {
                take_pending(&shared.pending);
                if shared.shut_down.load(Ordering::SeqCst) {
                    SpeakOutcome::Discarded(DiscardReason::ShutDown)
                } else {
                    SpeakOutcome::Discarded(DiscardReason::InitializationFailed)
                }
            }
        }
    }

    /// Cut the current utterance and give back audio focus.
    ///
    /// Queued messages survive unless the stop policy is `ClearPending`.
    pub fn stop_speaking(&self) {
        let shared = &self.shared;
        if shared.config.stop_policy == StopPolicy::ClearPending {
            shared.epoch.fetch_add(1, Ordering::SeqCst);
        }
        shared.engine.stop();
        shared.focus.release_all();
        shared.state.compare_and_set(
            AnnouncerState::is_speaking,
            AnnouncerState::Idle {
                last: Some(UtteranceResult::Stopped),
            },
        );
        debug!(policy = ?shared.config.stop_policy, "speech stopped");
    }

    /// Abort the worker, stop speech, and release the engine. Idempotent.
    ///
    /// Messages still queued are discarded.
    pub fn shutdown(&self) {
        if self.shared.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(worker) = self.worker.lock().ok().and_then(|mut w| w.take()) {
            worker.abort();
        }
        self.stop_speaking();
        self.shared.engine.shutdown();
        self.shared.pending.store(0, Ordering::SeqCst);
        info!("announcer shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shut_down.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> AnnouncerState {
        self.shared.state.state()
    }

    pub fn snapshot(&self) -> StateToken {
        self.shared.state.snapshot()
    }

    pub fn is_speaking(&self) -> bool {
        self.state().is_speaking()
    }

    /// Messages queued but not yet taken by the worker.
    pub fn pending_messages(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    /// Watch state transitions, including a terminal initialization error.
    pub fn subscribe_state(&self) -> watch::Receiver<StateToken> {
        self.shared.state.subscribe()
    }

    /// [`Announcer::subscribe_state`] as a `Stream`.
    pub fn state_stream(&self) -> WatchStream<StateToken> {
        WatchStream::new(self.subscribe_state())
    }

    /// Resolve once the engine is ready or has failed for good.
    pub async fn wait_ready(&self) -> AnnouncerState {
        let mut rx = self.subscribe_state();
        let ready = rx
            .wait_for(|token| !matches!(token.state, AnnouncerState::Uninitialized))
            .await
            .map(|token| token.state.clone());
        ready.unwrap_or_else(|_| self.state())
    }

    pub fn config(&self) -> &AnnouncerConfig {
        &self.shared.config
    }
}

impl Drop for Announcer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_worker(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<Envelope>) {
    if let Err(e) = initialize(&shared).await {
        warn!(error = %e, locale = %shared.config.locale, "speech engine unusable; announcements disabled");
        shared.state.set(AnnouncerState::InitializationError {
            reason: e.to_string(),
        });
        rx.close();
        shared.pending.store(0, Ordering::SeqCst);
        return;
    }
    shared.state.set(AnnouncerState::Idle { last: None });
    info!(locale = %shared.config.locale, "speech engine ready");

    while let Some(envelope) = rx.recv().await {
        take_pending(&shared.pending);
        if envelope.epoch < shared.epoch.load(Ordering::SeqCst) {
            debug!(message_id = %envelope.message.id, "discarding message queued before stop");
            continue;
        }
        handle_message(&shared, envelope.message).await;
    }
}

/// Decrement the queued count. A concurrent reset to zero by shutdown or an
/// initialization failure wins; the count never wraps.
fn take_pending(pending: &AtomicUsize) {
    let _ = pending.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |p| Some(p.saturating_sub(1)));
}

async fn initialize(shared: &Shared) -> VoiceResult<()> {
    let engine = &shared.engine;
    engine
        .initialize()
        .await
        .map_err(|e| VoiceError::Initialization(format!("Init listener returned error: {}", e)))?;

    let locale = &shared.config.locale;
    match engine.set_language(locale) {
        availability if availability.is_available() => {}
        LanguageAvailability::MissingData => {
            return Err(VoiceError::LanguageMissingData(locale.to_string()))
        }
        LanguageAvailability::NotSupported => {
            return Err(VoiceError::LanguageNotSupported(locale.to_string()))
        }
        other => {
            return Err(VoiceError::Initialization(format!(
                "Unknown setLanguage error {:?}",
                other
            )))
        }
    }

    engine.set_listener(Arc::new(UtteranceCallbacks {
        state: shared.state.clone(),
        focus: Arc::clone(&shared.focus),
    }));
    engine.set_audio_attributes(AudioAttributes::NAVIGATION_SPEECH);
    Ok(())
}

async fn handle_message(shared: &Shared, message: SpokenMessage) {
    if shared.shut_down.load(Ordering::SeqCst) {
        return;
    }
    let Some(generation) = shared.state.begin_utterance(&message.id) else {
        return;
    };
    let utterance_id = utterance_id(&message.id, generation);
    let params = SpeechParams {
        volume: shared.config.relative_volume,
    };
    debug!(%utterance_id, interruptible = message.interruptible, "speaking");

    if let Err(e) = shared
        .engine
        .speak(&message.text, QueueMode::Flush, &params, &utterance_id)
    {
        warn!(%utterance_id, error = %e, "engine rejected utterance");
        shared.focus.release(&utterance_id);
        shared
            .state
            .finish_utterance(generation, UtteranceResult::Error);
        return;
    }

    if !message.interruptible {
        shared.state.wait_until_finished(generation).await;
    }
}
