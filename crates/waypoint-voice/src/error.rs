//! Error types for the Waypoint voice system

use thiserror::Error;

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors that can occur while announcing guidance
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Speech engine initialization failed: {0}")]
    Initialization(String),

    #[error("Missing language data for {0}")]
    LanguageMissingData(String),

    #[error("Language not supported: {0}")]
    LanguageNotSupported(String),

    #[error("Speech engine error: {0}")]
    Engine(String),

    #[error("Announcer already started; drop the existing subscription first")]
    AlreadyStarted,

    #[error("No tokio runtime available: {0}")]
    Runtime(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid locale: {0}")]
    Locale(String),

    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for VoiceError {
    fn from(err: toml::de::Error) -> Self {
        VoiceError::Config(err.to_string())
    }
}

impl From<tokio::runtime::TryCurrentError> for VoiceError {
    fn from(err: tokio::runtime::TryCurrentError) -> Self {
        VoiceError::Runtime(err.to_string())
    }
}
