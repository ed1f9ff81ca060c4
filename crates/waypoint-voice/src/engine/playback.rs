//! **PlaybackSpeechEngine**: synthesize over HTTP, play through rodio.
//!
//! The rodio `OutputStream` is not `Send` on every platform, so the stream,
//! the sink and all synthesis live on one dedicated thread. The engine handle
//! only sends commands to it.

use super::bundled_language_availability;
use crate::error::{VoiceError, VoiceResult};
use crate::locale::Locale;
use crate::platform::{
    AudioAttributes, LanguageAvailability, QueueMode, SpeechEngine, SpeechParams,
    UtteranceListener,
};
use async_trait::async_trait;
use rodio::{OutputStream, OutputStreamHandle, Sink};
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// How often the playback thread checks whether the sink ran dry.
const POLL_INTERVAL: Duration = Duration::from_millis(40);

/// Backend that turns text into audio bytes (WAV/MP3).
pub trait TtsBackend: Send + Sync {
    /// Synthesize text to audio bytes. Return an empty vec to skip playback.
    fn synthesize(&self, text: &str, locale: Option<&Locale>) -> VoiceResult<Vec<u8>>;
}

/// Returns no audio; utterances start and finish immediately.
#[derive(Debug, Default)]
pub struct PlaceholderTts;

impl TtsBackend for PlaceholderTts {
    fn synthesize(&self, _text: &str, _locale: Option<&Locale>) -> VoiceResult<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// OpenAI-compatible `/audio/speech` backend.
///
/// Reads `TTS_API_URL` (default https://api.openai.com/v1), `TTS_API_KEY`,
/// `TTS_MODEL` (default tts-1) and `TTS_VOICE` (default alloy).
#[derive(Debug, Clone)]
pub struct OpenAiTts {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub voice: String,
    client: reqwest::blocking::Client,
}

impl OpenAiTts {
    pub fn from_env() -> VoiceResult<Self> {
        let base_url = std::env::var("TTS_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let api_key = std::env::var("TTS_API_KEY")
            .map_err(|_| VoiceError::Config("TTS requires TTS_API_KEY".to_string()))?;
        let model = std::env::var("TTS_MODEL").unwrap_or_else(|_| "tts-1".to_string());
        let voice = std::env::var("TTS_VOICE").unwrap_or_else(|_| "alloy".to_string());
        Self::new(base_url, api_key, model, voice)
    }

    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
    ) -> VoiceResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            voice: voice.into(),
            client,
        })
    }
}

impl TtsBackend for OpenAiTts {
    fn synthesize(&self, text: &str, _locale: Option<&Locale>) -> VoiceResult<Vec<u8>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/audio/speech", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
            "response_format": "wav",
        });
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(VoiceError::Tts(format!("TTS API error {}: {}", status, body)));
        }
        let bytes = res.bytes().map_err(|e| VoiceError::Tts(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

enum Command {
    Speak {
        id: String,
        text: String,
        volume: f32,
        mode: QueueMode,
    },
    Language(Locale),
    Stop,
    Shutdown,
}

type SharedListener = Arc<RwLock<Option<Arc<dyn UtteranceListener>>>>;

/// Speech engine over a [`TtsBackend`] and the default audio output device.
pub struct PlaybackSpeechEngine {
    backend: Arc<dyn TtsBackend>,
    commands: Mutex<Option<mpsc::Sender<Command>>>,
    listener: SharedListener,
}

impl PlaybackSpeechEngine {
    pub fn new(backend: Arc<dyn TtsBackend>) -> Self {
        Self {
            backend,
            commands: Mutex::new(None),
            listener: Arc::new(RwLock::new(None)),
        }
    }

    fn send(&self, command: Command) -> VoiceResult<()> {
        let guard = self
            .commands
            .lock()
            .map_err(|_| VoiceError::Engine("playback engine lock poisoned".to_string()))?;
        let tx = guard
            .as_ref()
            .ok_or_else(|| VoiceError::Engine("playback engine not running".to_string()))?;
        tx.send(command)
            .map_err(|_| VoiceError::Engine("playback thread exited".to_string()))
    }
}

#[async_trait]
impl SpeechEngine for PlaybackSpeechEngine {
    async fn initialize(&self) -> VoiceResult<()> {
        let (tx, rx) = mpsc::channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let listener = Arc::clone(&self.listener);
        let backend = Arc::clone(&self.backend);

        thread::Builder::new()
            .name("playback-tts".to_string())
            .spawn(move || {
                let output = OutputStream::try_default()
                    .map_err(|e| VoiceError::Playback(e.to_string()))
                    .and_then(|(stream, handle)| {
                        let sink = Sink::try_new(&handle)
                            .map_err(|e| VoiceError::Playback(e.to_string()))?;
                        Ok((stream, handle, sink))
                    });
                match output {
                    Ok((stream, handle, sink)) => {
                        let _ = ready_tx.send(Ok(()));
                        info!("playback engine: sink ready for TTS playback");
                        run(rx, listener, backend, stream, handle, sink);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| VoiceError::Initialization(format!("failed to spawn playback thread: {}", e)))?;

        ready_rx
            .await
            .map_err(|_| VoiceError::Initialization("playback thread exited during startup".to_string()))??;

        if let Ok(mut commands) = self.commands.lock() {
            *commands = Some(tx);
        }
        Ok(())
    }

    fn set_language(&self, locale: &Locale) -> LanguageAvailability {
        let availability = bundled_language_availability(locale.language(), locale.region());
        if availability.is_available() {
            let _ = self.send(Command::Language(locale.clone()));
        }
        availability
    }

    fn set_listener(&self, listener: Arc<dyn UtteranceListener>) {
        if let Ok(mut slot) = self.listener.write() {
            *slot = Some(listener);
        }
    }

    fn set_audio_attributes(&self, attributes: AudioAttributes) {
        debug!(?attributes, "rodio output has no usage routing; attributes recorded only");
    }

    fn speak(
        &self,
        text: &str,
        mode: QueueMode,
        params: &SpeechParams,
        utterance_id: &str,
    ) -> VoiceResult<()> {
        self.send(Command::Speak {
            id: utterance_id.to_string(),
            text: text.to_string(),
            volume: params.volume.clamp(0.0, 1.0),
            mode,
        })
    }

    fn stop(&self) {
        let _ = self.send(Command::Stop);
    }

    fn shutdown(&self) {
        let _ = self.send(Command::Shutdown);
        if let Ok(mut commands) = self.commands.lock() {
            *commands = None;
        }
    }
}

fn notify(listener: &SharedListener, f: impl FnOnce(&dyn UtteranceListener)) {
    let current = listener.read().ok().and_then(|slot| slot.clone());
    if let Some(listener) = current {
        f(listener.as_ref());
    }
}

struct Queued {
    id: String,
    text: String,
    volume: f32,
}

fn run(
    rx: mpsc::Receiver<Command>,
    listener: SharedListener,
    backend: Arc<dyn TtsBackend>,
    _stream: OutputStream,
    handle: OutputStreamHandle,
    mut sink: Sink,
) {
    let mut queue: VecDeque<Queued> = VecDeque::new();
    let mut playing: Option<String> = None;
    let mut locale: Option<Locale> = None;

    loop {
        let command = if playing.is_some() {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(command) => Some(command),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        } else {
            match rx.recv() {
                Ok(command) => Some(command),
                Err(_) => break,
            }
        };

        let cut = |sink: &mut Sink, playing: &mut Option<String>| {
            if let Some(id) = playing.take() {
                sink.stop();
                // A stopped sink stays stopped; start the next utterance on a fresh one.
                if let Ok(fresh) = Sink::try_new(&handle) {
                    *sink = fresh;
                }
                notify(&listener, |l| l.on_stop(&id));
            }
        };

        match command {
            None => {
                if sink.empty() {
                    if let Some(id) = playing.take() {
                        notify(&listener, |l| l.on_done(&id));
                    }
                }
            }
            Some(Command::Speak {
                id,
                text,
                volume,
                mode,
            }) => {
                if mode == QueueMode::Flush {
                    cut(&mut sink, &mut playing);
                    queue.clear();
                }
                queue.push_back(Queued { id, text, volume });
            }
            Some(Command::Language(l)) => locale = Some(l),
            Some(Command::Stop) => {
                cut(&mut sink, &mut playing);
                queue.clear();
            }
            Some(Command::Shutdown) => {
                cut(&mut sink, &mut playing);
                break;
            }
        }

        if playing.is_none() {
            playing = advance(
                &mut queue,
                backend.as_ref(),
                locale.as_ref(),
                &listener,
                |bytes, volume| {
                    let source = rodio::Decoder::new(Cursor::new(bytes))
                        .map_err(|e| VoiceError::Playback(format!("decode failed: {}", e)))?;
                    sink.set_volume(volume);
                    sink.append(source);
                    sink.play();
                    Ok(())
                },
            );
        }
    }
    debug!("playback engine thread exiting");
}

/// Start the next audible utterance, reporting any that fail or have no
/// audio along the way. Returns the id of the one handed to `output`, or None
/// once the queue is empty.
fn advance(
    queue: &mut VecDeque<Queued>,
    backend: &dyn TtsBackend,
    locale: Option<&Locale>,
    listener: &SharedListener,
    mut output: impl FnMut(Vec<u8>, f32) -> VoiceResult<()>,
) -> Option<String> {
    while let Some(Queued { id, text, volume }) = queue.pop_front() {
        let bytes = match backend.synthesize(&text, locale) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(utterance_id = %id, error = %e, "synthesis failed");
                notify(listener, |l| l.on_error(&id));
                continue;
            }
        };

        notify(listener, |l| l.on_start(&id));
        if bytes.is_empty() {
            notify(listener, |l| l.on_done(&id));
            continue;
        }
        match output(bytes, volume) {
            Ok(()) => return Some(id),
            Err(e) => {
                warn!(utterance_id = %id, error = %e, "playback failed");
                notify(listener, |l| l.on_error(&id));
            }
        }
    }
    None
}
