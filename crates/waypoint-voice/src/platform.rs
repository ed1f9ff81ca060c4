//! Platform seams: speech engine, audio focus, and audio mode.
//!
//! The announcer never talks to an OS API directly. Hosts implement these
//! traits over whatever the platform offers (an OS synthesizer, an audio
//! session, a telephony observer) and tests substitute recording doubles.

use crate::error::VoiceResult;
use crate::locale::Locale;
use async_trait::async_trait;
use std::sync::Arc;

/// Result of asking the engine for a language.
///
/// Ordered the way synthesizers usually rank availability: anything below
/// [`LanguageAvailability::Available`] is unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageAvailability {
    NotSupported,
    MissingData,
    /// Some other engine-specific failure code.
    Unknown(i32),
    Available,
    CountryAvailable,
    CountryVariantAvailable,
}

impl LanguageAvailability {
    pub fn is_available(&self) -> bool {
        matches!(
            self,
            LanguageAvailability::Available
                | LanguageAvailability::CountryAvailable
                | LanguageAvailability::CountryVariantAvailable
        )
    }
}

/// What a new utterance does to one already playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    /// Drop whatever the engine is playing or holding.
    Flush,
    /// Append behind the engine's own queue.
    Add,
}

/// Per-utterance engine parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeechParams {
    /// 0.0 to 1.0, relative to the stream volume.
    pub volume: f32,
}

impl Default for SpeechParams {
    fn default() -> Self {
        Self { volume: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioUsage {
    NavigationGuidance,
    Notification,
    Media,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Speech,
    Sonification,
    Music,
}

/// Tags attached to synthesized audio and to focus requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioAttributes {
    pub usage: AudioUsage,
    pub content_type: ContentType,
}

impl AudioAttributes {
    pub const NAVIGATION_SPEECH: AudioAttributes = AudioAttributes {
        usage: AudioUsage::NavigationGuidance,
        content_type: ContentType::Speech,
    };
}

/// Receives utterance progress. Called from engine-owned threads.
pub trait UtteranceListener: Send + Sync {
    fn on_start(&self, utterance_id: &str);
    fn on_done(&self, utterance_id: &str);
    fn on_error(&self, utterance_id: &str);

    /// The utterance was flushed or stopped before finishing.
    fn on_stop(&self, _utterance_id: &str) {}
}

/// A text-to-speech engine.
///
/// `speak` only enqueues; progress is reported through the listener set with
/// [`SpeechEngine::set_listener`].
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Bring the engine up. Resolves once the engine is ready or has failed.
    async fn initialize(&self) -> VoiceResult<()>;

    fn set_language(&self, locale: &Locale) -> LanguageAvailability;

    fn set_listener(&self, listener: Arc<dyn UtteranceListener>);

    fn set_audio_attributes(&self, attributes: AudioAttributes);

    fn speak(
        &self,
        text: &str,
        mode: QueueMode,
        params: &SpeechParams,
        utterance_id: &str,
    ) -> VoiceResult<()>;

    /// Stop the current utterance and discard anything the engine holds.
    fn stop(&self);

    /// Release engine resources. The engine is unusable afterwards.
    fn shutdown(&self);
}

/// How other audio is treated while focus is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusGain {
    /// Short focus; other players lower their volume.
    TransientMayDuck,
    /// Short focus; other players pause.
    Transient,
    /// Short focus; nothing else may play, not even notifications.
    TransientExclusive,
}

/// Legacy stream selector for managers without request descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioStream {
    Notification,
    Music,
}

/// Descriptor for a focus request. Built once and reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusRequest {
    pub gain: FocusGain,
    pub attributes: AudioAttributes,
}

/// Answer from the focus manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusGrant {
    Granted,
    Delayed,
    Failed,
}

/// OS audio focus arbitration.
///
/// Managers either understand [`FocusRequest`] descriptors or only the
/// older stream-based calls; [`AudioFocusManager::supports_focus_requests`]
/// picks the path.
pub trait AudioFocusManager: Send + Sync {
    fn supports_focus_requests(&self) -> bool {
        true
    }

    fn request_focus(&self, request: &FocusRequest) -> FocusGrant;

    fn abandon_focus(&self, request: &FocusRequest);

    fn request_legacy_focus(&self, _stream: AudioStream, _gain: FocusGain) -> FocusGrant {
        FocusGrant::Failed
    }

    fn abandon_legacy_focus(&self) {}
}

/// Current audio routing mode of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioMode {
    Normal,
    Ringtone,
    InCall,
    InCommunication,
    CallScreening,
}

impl AudioMode {
    /// Anything but normal routing counts as a phone call.
    pub fn is_call(&self) -> bool {
        !matches!(self, AudioMode::Normal)
    }
}

/// Polling query for the audio mode, used to avoid speaking over calls.
pub trait AudioModeObserver: Send + Sync {
    fn audio_mode(&self) -> AudioMode;
}
