//! Recording doubles for the platform seams.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use waypoint_voice::state::parse_utterance_id;
use waypoint_voice::{
    AnnouncerConfig, AudioAttributes, AudioFocusManager, AudioStream, Capabilities, FocusGain,
    FocusGrant, FocusRequest, LanguageAvailability, Locale, QueueMode, SharedAudioMode,
    SpeechEngine, SpeechParams, UtteranceListener, VoiceError, VoiceResult,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("waypoint_voice=debug")),
        )
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeakCall {
    /// Message id the utterance was spoken for.
    pub id: String,
    /// Id the engine was handed, unique per utterance.
    pub utterance_id: String,
    pub text: String,
    pub mode: QueueMode,
    pub volume: f32,
}

/// Engine that records every call and starts utterances synchronously.
///
/// Nothing finishes on its own: tests call [`RecordingEngine::complete`] or
/// [`RecordingEngine::fail`]. A flushing `speak` or a `stop` reports the
/// current utterance as stopped, as OS synthesizers do.
pub struct RecordingEngine {
    init_error: Option<String>,
    availability: LanguageAvailability,
    listener: RwLock<Option<Arc<dyn UtteranceListener>>>,
    calls: Mutex<Vec<SpeakCall>>,
    current: Mutex<Option<String>>,
    flushed: Mutex<Vec<String>>,
    languages: Mutex<Vec<Locale>>,
    attributes: Mutex<Option<AudioAttributes>>,
    stops: AtomicUsize,
    shut_down: AtomicBool,
}

impl Default for RecordingEngine {
    fn default() -> Self {
        Self::with_availability(LanguageAvailability::CountryAvailable)
    }
}

impl RecordingEngine {
    pub fn with_availability(availability: LanguageAvailability) -> Self {
        Self {
            init_error: None,
            availability,
            listener: RwLock::new(None),
            calls: Mutex::new(Vec::new()),
            current: Mutex::new(None),
            flushed: Mutex::new(Vec::new()),
            languages: Mutex::new(Vec::new()),
            attributes: Mutex::new(None),
            stops: AtomicUsize::new(0),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn failing_init(reason: &str) -> Self {
        Self {
            init_error: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<SpeakCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn spoken_ids(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.id).collect()
    }

    /// Message id of the utterance now playing.
    pub fn current(&self) -> Option<String> {
        self.current_utterance().map(|id| message_id(&id))
    }

    pub fn current_utterance(&self) -> Option<String> {
        self.current.lock().unwrap().clone()
    }

    /// Message ids of utterances cut short by a later flushing `speak`.
    pub fn flushed(&self) -> Vec<String> {
        self.flushed.lock().unwrap().iter().map(|id| message_id(id)).collect()
    }

    pub fn languages(&self) -> Vec<Locale> {
        self.languages.lock().unwrap().clone()
    }

    pub fn attributes(&self) -> Option<AudioAttributes> {
        *self.attributes.lock().unwrap()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Finish the current utterance successfully.
    pub fn complete(&self) -> Option<String> {
        let id = self.current.lock().unwrap().take()?;
        self.notify(|l| l.on_done(&id));
        Some(id)
    }

    /// Fail the current utterance.
    pub fn fail(&self) -> Option<String> {
        let id = self.current.lock().unwrap().take()?;
        self.notify(|l| l.on_error(&id));
        Some(id)
    }

    /// Deliver a done callback for an arbitrary utterance id, as a late
    /// engine would.
    pub fn send_done(&self, utterance_id: &str) {
        self.notify(|l| l.on_done(utterance_id));
    }

    fn notify(&self, f: impl FnOnce(&dyn UtteranceListener)) {
        let listener = self.listener.read().unwrap().clone();
        if let Some(listener) = listener {
            f(listener.as_ref());
        }
    }

    fn cut_current(&self) -> Option<String> {
        let cut = self.current.lock().unwrap().take();
        if let Some(id) = &cut {
            self.notify(|l| l.on_stop(id));
        }
        cut
    }
}

fn message_id(utterance_id: &str) -> String {
    parse_utterance_id(utterance_id)
        .map(|(id, _)| id)
        .unwrap_or(utterance_id)
        .to_string()
}

#[async_trait]
impl SpeechEngine for RecordingEngine {
    async fn initialize(&self) -> VoiceResult<()> {
        match &self.init_error {
            Some(reason) => Err(VoiceError::Engine(reason.clone())),
            None => Ok(()),
        }
    }

    fn set_language(&self, locale: &Locale) -> LanguageAvailability {
        self.languages.lock().unwrap().push(locale.clone());
        self.availability
    }

    fn set_listener(&self, listener: Arc<dyn UtteranceListener>) {
        *self.listener.write().unwrap() = Some(listener);
    }

    fn set_audio_attributes(&self, attributes: AudioAttributes) {
        *self.attributes.lock().unwrap() = Some(attributes);
    }

    fn speak(
        &self,
        text: &str,
        mode: QueueMode,
        params: &SpeechParams,
        utterance_id: &str,
    ) -> VoiceResult<()> {
        if self.is_shut_down() {
            return Err(VoiceError::Engine("engine shut down".to_string()));
        }
        self.calls.lock().unwrap().push(SpeakCall {
            id: message_id(utterance_id),
            utterance_id: utterance_id.to_string(),
            text: text.to_string(),
            mode,
            volume: params.volume,
        });
        if mode == QueueMode::Flush {
            if let Some(id) = self.cut_current() {
                self.flushed.lock().unwrap().push(id);
            }
        }
        *self.current.lock().unwrap() = Some(utterance_id.to_string());
        self.notify(|l| l.on_start(utterance_id));
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.cut_current();
    }

    fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        self.cut_current();
    }
}

/// Focus manager that counts requests and abandons on both paths.
pub struct RecordingFocus {
    modern: bool,
    requests: AtomicUsize,
    abandons: AtomicUsize,
    last_gain: Mutex<Option<FocusGain>>,
}

impl RecordingFocus {
    pub fn new() -> Self {
        Self::with_modern(true)
    }

    pub fn legacy() -> Self {
        Self::with_modern(false)
    }

    fn with_modern(modern: bool) -> Self {
        Self {
            modern,
            requests: AtomicUsize::new(0),
            abandons: AtomicUsize::new(0),
            last_gain: Mutex::new(None),
        }
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn abandons(&self) -> usize {
        self.abandons.load(Ordering::SeqCst)
    }

    pub fn held(&self) -> usize {
        self.requests() - self.abandons()
    }

    pub fn last_gain(&self) -> Option<FocusGain> {
        *self.last_gain.lock().unwrap()
    }
}

impl AudioFocusManager for RecordingFocus {
    fn supports_focus_requests(&self) -> bool {
        self.modern
    }

    fn request_focus(&self, request: &FocusRequest) -> FocusGrant {
        assert!(self.modern, "modern focus path used on a legacy manager");
        *self.last_gain.lock().unwrap() = Some(request.gain);
        self.requests.fetch_add(1, Ordering::SeqCst);
        FocusGrant::Granted
    }

    fn abandon_focus(&self, _request: &FocusRequest) {
        self.abandons.fetch_add(1, Ordering::SeqCst);
    }

    fn request_legacy_focus(&self, stream: AudioStream, gain: FocusGain) -> FocusGrant {
        assert_eq!(stream, AudioStream::Notification);
        *self.last_gain.lock().unwrap() = Some(gain);
        self.requests.fetch_add(1, Ordering::SeqCst);
        FocusGrant::Granted
    }

    fn abandon_legacy_focus(&self) {
        self.abandons.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Harness {
    pub engine: Arc<RecordingEngine>,
    pub focus: Arc<RecordingFocus>,
    pub audio_mode: Arc<SharedAudioMode>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_engine(RecordingEngine::default())
    }

    pub fn with_engine(engine: RecordingEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            focus: Arc::new(RecordingFocus::new()),
            audio_mode: Arc::new(SharedAudioMode::default()),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            engine: self.engine.clone(),
            focus: self.focus.clone(),
            audio_mode: self.audio_mode.clone(),
        }
    }
}

pub fn config() -> AnnouncerConfig {
    AnnouncerConfig {
        locale: "en-US".parse().unwrap(),
        ..AnnouncerConfig::default()
    }
}

/// Poll `condition` until it holds, yielding to the runtime in between.
pub async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// Give the queue worker a chance to run, then return.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
