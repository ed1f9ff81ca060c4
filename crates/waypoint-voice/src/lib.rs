//! # Waypoint Voice - Spoken Turn-by-Turn Guidance
//!
//! Turns guidance events from a navigation SDK into serialized spoken
//! announcements, without overlapping utterances, without talking over a
//! phone call, and while ducking other audio for the length of each utterance.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       Guidance Announcer                          │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────────┐  │
//! │  │ Event Source │ → │  Phrasing +  │ → │  Single-flight queue │  │
//! │  │  (SDK/hub)   │   │  call check  │   │    (tokio worker)    │  │
//! │  └──────────────┘   └──────────────┘   └──────────────────────┘  │
//! │                                                   ↓               │
//! │  ┌──────────────┐   start/done/error   ┌──────────────────────┐  │
//! │  │ Audio Focus  │ ←────────────────────│    Speech Engine     │  │
//! │  │   + State    │   (engine thread)    │  (OS / console / HTTP)│ │
//! │  └──────────────┘                      └──────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every platform service is a trait in [`platform`]; nothing is reached
//! through a global.

pub mod announcer;
pub mod config;
pub mod desktop;
pub mod engine;
pub mod error;
pub mod event;
pub mod focus;
pub mod guidance;
pub mod locale;
pub mod message;
pub mod platform;
pub mod source;
pub mod state;

pub use announcer::{Announcer, Capabilities};
pub use config::{AnnouncerConfig, StopPolicy, Units, RELATIVE_TTS_VOLUME};
pub use desktop::{FixedAudioMode, LoggingFocusManager, SharedAudioMode};
pub use engine::ConsoleSpeechEngine;
#[cfg(feature = "playback")]
pub use engine::{OpenAiTts, PlaceholderTts, PlaybackSpeechEngine, TtsBackend};
pub use error::{VoiceError, VoiceResult};
pub use event::{GuidanceEvent, GuidanceKind};
pub use focus::FocusController;
pub use guidance::GuidanceAnnouncer;
pub use locale::Locale;
pub use message::{DiscardReason, SpeakOutcome, SpokenMessage};
pub use platform::{
    AudioAttributes, AudioFocusManager, AudioMode, AudioModeObserver, AudioStream, AudioUsage,
    ContentType, FocusGain, FocusGrant, FocusRequest, LanguageAvailability, QueueMode,
    SpeechEngine, SpeechParams, UtteranceListener,
};
pub use source::{GuidanceEventHub, GuidanceEventListener, GuidanceEventSource, ListenerId, Subscription};
pub use state::{AnnouncerState, StateCell, StateToken, UtteranceResult};
