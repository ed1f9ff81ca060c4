//! Paced engine that "speaks" into the log.

use super::bundled_language_availability;
use crate::error::{VoiceError, VoiceResult};
use crate::locale::Locale;
use crate::platform::{
    AudioAttributes, LanguageAvailability, QueueMode, SpeechEngine, SpeechParams,
    UtteranceListener,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const DEFAULT_WORDS_PER_MINUTE: u32 = 180;

type SharedListener = Arc<RwLock<Option<Arc<dyn UtteranceListener>>>>;

enum Command {
    Speak {
        utterance: Utterance,
        mode: QueueMode,
    },
    Stop,
    Shutdown,
}

struct Utterance {
    id: String,
    text: String,
    volume: f32,
}

/// Speech engine for hosts without a synthesizer.
///
/// Each utterance is logged at `info` and "plays" for as long as it would take
/// to say at the configured speaking rate. Start, done and stop callbacks fire
/// from the engine thread exactly as a real synthesizer would fire them.
pub struct ConsoleSpeechEngine {
    words_per_minute: u32,
    commands: Mutex<Option<mpsc::Sender<Command>>>,
    listener: SharedListener,
    transcript: Arc<Mutex<Vec<String>>>,
}

impl Default for ConsoleSpeechEngine {
    fn default() -> Self {
        Self::new(DEFAULT_WORDS_PER_MINUTE)
    }
}

impl ConsoleSpeechEngine {
    pub fn new(words_per_minute: u32) -> Self {
        Self {
            words_per_minute: words_per_minute.max(1),
            commands: Mutex::new(None),
            listener: Arc::new(RwLock::new(None)),
            transcript: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Texts of every utterance that started, in order.
    pub fn transcript(&self) -> Vec<String> {
        self.transcript.lock().map(|t| t.clone()).unwrap_or_default()
    }

    fn send(&self, command: Command) -> VoiceResult<()> {
        let guard = self
            .commands
            .lock()
            .map_err(|_| VoiceError::Engine("console engine lock poisoned".to_string()))?;
        let tx = guard
            .as_ref()
            .ok_or_else(|| VoiceError::Engine("console engine not running".to_string()))?;
        tx.send(command)
            .map_err(|_| VoiceError::Engine("console engine thread exited".to_string()))
    }
}

#[async_trait]
impl SpeechEngine for ConsoleSpeechEngine {
    async fn initialize(&self) -> VoiceResult<()> {
        let mut commands = self
            .commands
            .lock()
            .map_err(|_| VoiceError::Initialization("console engine lock poisoned".to_string()))?;
        if commands.is_some() {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel();
        let listener = Arc::clone(&self.listener);
        let transcript = Arc::clone(&self.transcript);
        let words_per_minute = self.words_per_minute;
        thread::Builder::new()
            .name("console-tts".to_string())
            .spawn(move || run(rx, listener, transcript, words_per_minute))
            .map_err(|e| VoiceError::Initialization(format!("failed to spawn engine thread: {}", e)))?;

        *commands = Some(tx);
        info!(words_per_minute, "console speech engine started");
        Ok(())
    }

    fn set_language(&self, locale: &Locale) -> LanguageAvailability {
        bundled_language_availability(locale.language(), locale.region())
    }

    fn set_listener(&self, listener: Arc<dyn UtteranceListener>) {
        if let Ok(mut slot) = self.listener.write() {
            *slot = Some(listener);
        }
    }

    fn set_audio_attributes(&self, attributes: AudioAttributes) {
        debug!(?attributes, "console engine ignores audio attributes");
    }

    fn speak(
        &self,
        text: &str,
        mode: QueueMode,
        params: &SpeechParams,
        utterance_id: &str,
    ) -> VoiceResult<()> {
        self.send(Command::Speak {
            utterance: Utterance {
                id: utterance_id.to_string(),
                text: text.to_string(),
                volume: params.volume,
            },
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

fn speaking_time(text: &str, words_per_minute: u32) -> Duration {
    let words = text.split_whitespace().count().max(1) as u64;
    Duration::from_millis(words * 60_000 / words_per_minute as u64)
}

fn notify(listener: &SharedListener, f: impl FnOnce(&dyn UtteranceListener)) {
    let current = listener.read().ok().and_then(|slot| slot.clone());
    if let Some(listener) = current {
        f(listener.as_ref());
    }
}

fn run(
    rx: mpsc::Receiver<Command>,
    listener: SharedListener,
    transcript: Arc<Mutex<Vec<String>>>,
    words_per_minute: u32,
) {
    let mut queue: VecDeque<Utterance> = VecDeque::new();
    let mut current: Option<(Utterance, Instant)> = None;

    loop {
        let command = match &current {
            Some((_, deadline)) => {
                let wait = deadline.saturating_duration_since(Instant::now());
                match rx.recv_timeout(wait) {
                    Ok(command) => Some(command),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match rx.recv() {
                Ok(command) => Some(command),
                Err(_) => break,
            },
        };

        match command {
            None => {
                if let Some((done, _)) = current.take() {
                    notify(&listener, |l| l.on_done(&done.id));
                }
            }
            Some(Command::Speak { utterance, mode }) => {
                if mode == QueueMode::Flush {
                    if let Some((flushed, _)) = current.take() {
                        notify(&listener, |l| l.on_stop(&flushed.id));
                    }
                    queue.clear();
                }
                queue.push_back(utterance);
            }
            Some(Command::Stop) => {
                if let Some((stopped, _)) = current.take() {
                    notify(&listener, |l| l.on_stop(&stopped.id));
                }
                queue.clear();
            }
            Some(Command::Shutdown) => {
                if let Some((stopped, _)) = current.take() {
                    notify(&listener, |l| l.on_stop(&stopped.id));
                }
                break;
            }
        }

        if current.is_none() {
            if let Some(next) = queue.pop_front() {
                info!(utterance_id = %next.id, volume = next.volume, "🔊 {}", next.text);
                if let Ok(mut t) = transcript.lock() {
                    t.push(next.text.clone());
                }
                notify(&listener, |l| l.on_start(&next.id));
                let deadline = Instant::now() + speaking_time(&next.text, words_per_minute);
                current = Some((next, deadline));
            }
        }
    }
    debug!("console speech engine thread exiting");
}
