//! Speech engine implementations.
//!
//! Both engines run their utterances on a dedicated thread and report
//! progress from there, the way OS synthesizers do.

mod console;
#[cfg(feature = "playback")]
mod playback;

pub use console::ConsoleSpeechEngine;
#[cfg(feature = "playback")]
pub use playback::{OpenAiTts, PlaceholderTts, PlaybackSpeechEngine, TtsBackend};

use crate::platform::LanguageAvailability;

/// Languages the bundled engines accept (those with a phrasebook).
pub(crate) fn bundled_language_availability(language: &str, region: Option<&str>) -> LanguageAvailability {
    match language {
        "en" | "de" | "fr" | "es" if region.is_some() => LanguageAvailability::CountryAvailable,
        "en" | "de" | "fr" | "es" => LanguageAvailability::Available,
        _ => LanguageAvailability::NotSupported,
    }
}
