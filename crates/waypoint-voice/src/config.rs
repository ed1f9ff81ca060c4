//! Announcer configuration from the environment or a TOML file.

use crate::error::{VoiceError, VoiceResult};
use crate::locale::Locale;
use crate::platform::FocusGain;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Synthesized speech tends to sound loud next to other audio on the same
/// stream; keep it below music and podcasts.
pub const RELATIVE_TTS_VOLUME: f32 = 0.6;

fn default_true() -> bool {
    true
}

fn default_volume() -> f32 {
    RELATIVE_TTS_VOLUME
}

fn default_focus_gain() -> FocusGain {
    FocusGain::TransientMayDuck
}

/// What `stop_speaking()` does with messages still waiting in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopPolicy {
    /// Only the current utterance is cut; queued messages are still spoken.
    #[default]
    KeepPending,
    /// Queued messages that have not started are discarded too.
    ClearPending,
}

impl std::str::FromStr for StopPolicy {
    type Err = VoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "keep_pending" | "keep" => Ok(StopPolicy::KeepPending),
            "clear_pending" | "clear" => Ok(StopPolicy::ClearPending),
            other => Err(VoiceError::Config(format!("unknown stop policy '{}'", other))),
        }
    }
}

/// Unit system for spoken distances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Units {
    Metric,
    Imperial,
}

/// Announcer configuration.
///
/// | Env | Default | Description |
/// |-----|---------|-------------|
/// | WAYPOINT_VOICE_LOCALE | LC_ALL / LANG, else en-US | Speech and phrasing locale. |
/// | WAYPOINT_VOICE_VOLUME | 0.6 | Speech volume relative to the stream (0.0–1.0). |
/// | WAYPOINT_VOICE_STOP_POLICY | keep_pending | `keep_pending` \| `clear_pending`. |
/// | WAYPOINT_VOICE_DROP_DURING_CALLS | true | Drop announcements while a call is active. |
/// | WAYPOINT_VOICE_UNITS | from locale | `metric` \| `imperial`. |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnouncerConfig {
    #[serde(default = "Locale::system_default")]
    pub locale: Locale,
    #[serde(default = "default_volume")]
    pub relative_volume: f32,
    #[serde(default)]
    pub stop_policy: StopPolicy,
    #[serde(default = "default_true")]
    pub drop_during_calls: bool,
    #[serde(default = "default_focus_gain")]
    pub focus_gain: FocusGain,
    /// None picks from the locale region.
    #[serde(default)]
    pub units: Option<Units>,
}

impl Default for AnnouncerConfig {
    fn default() -> Self {
        Self {
            locale: Locale::system_default(),
            relative_volume: RELATIVE_TTS_VOLUME,
            stop_policy: StopPolicy::default(),
            drop_during_calls: true,
            focus_gain: default_focus_gain(),
            units: None,
        }
    }
}

impl AnnouncerConfig {
    /// Load from environment. Unset or invalid values fall back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            locale: env_parse("WAYPOINT_VOICE_LOCALE").unwrap_or(defaults.locale),
            relative_volume: env_parse::<f32>("WAYPOINT_VOICE_VOLUME")
                .filter(|v| (0.0..=1.0).contains(v))
                .unwrap_or(defaults.relative_volume),
            stop_policy: env_parse("WAYPOINT_VOICE_STOP_POLICY").unwrap_or(defaults.stop_policy),
            drop_during_calls: env_bool("WAYPOINT_VOICE_DROP_DURING_CALLS", true),
            focus_gain: defaults.focus_gain,
            units: env_units(),
        }
    }

    pub fn from_toml_str(s: &str) -> VoiceResult<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> VoiceResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> VoiceResult<()> {
        if !(0.0..=1.0).contains(&self.relative_volume) {
            return Err(VoiceError::Config(format!(
                "relative_volume must be between 0.0 and 1.0, got {}",
                self.relative_volume
            )));
        }
        Ok(())
    }

    /// Units to speak distances in.
    pub fn effective_units(&self) -> Units {
        self.units.unwrap_or(if self.locale.prefers_imperial() {
            Units::Imperial
        } else {
            Units::Metric
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => {
            let v = v.trim();
            if v.is_empty() {
                default
            } else {
                v.eq_ignore_ascii_case("true") || v == "1"
            }
        }
        Err(_) => default,
    }
}

fn env_units() -> Option<Units> {
    match std::env::var("WAYPOINT_VOICE_UNITS") {
        Ok(v) if v.trim().eq_ignore_ascii_case("imperial") => Some(Units::Imperial),
        Ok(v) if v.trim().eq_ignore_ascii_case("metric") => Some(Units::Metric),
        _ => None,
    }
}
