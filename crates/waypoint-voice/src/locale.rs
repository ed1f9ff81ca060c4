//! Locale tags for the speech engine and announcement phrasing.

use crate::error::{VoiceError, VoiceResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fallback when the environment carries no usable locale.
pub const DEFAULT_LOCALE: &str = "en-US";

/// A language tag such as `en-US` or `fr`.
///
/// Accepts BCP-47 style (`en-US`) and POSIX style (`en_US.UTF-8`) input. The
/// language is stored lowercase and the region uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Locale {
    language: String,
    region: Option<String>,
}

impl Locale {
    pub fn new(language: impl Into<String>, region: Option<String>) -> VoiceResult<Self> {
        let language = language.into().to_ascii_lowercase();
        if language.len() < 2
            || language.len() > 3
            || !language.chars().all(|c| c.is_ascii_alphabetic())
        {
            return Err(VoiceError::Locale(format!("bad language subtag '{}'", language)));
        }
        let region = match region {
            Some(r) if r.is_empty() => None,
            Some(r) => {
                if !r.chars().all(|c| c.is_ascii_alphanumeric()) || r.len() > 3 {
                    return Err(VoiceError::Locale(format!("bad region subtag '{}'", r)));
                }
                Some(r.to_ascii_uppercase())
            }
            None => None,
        };
        Ok(Self { language, region })
    }

    /// Locale from `LC_ALL`, `LC_MESSAGES`, then `LANG`; `en-US` when none parse.
    ///
    /// `C` and `POSIX` are treated as unset.
    pub fn system_default() -> Self {
        ["LC_ALL", "LC_MESSAGES", "LANG"]
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .filter(|v| {
                let v = v.trim();
                !v.is_empty() && v != "C" && v != "POSIX" && !v.starts_with("C.")
            })
            .find_map(|v| v.parse().ok())
            .unwrap_or_else(Self::fallback)
    }

    fn fallback() -> Self {
        Self {
            language: "en".to_string(),
            region: Some("US".to_string()),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// True for regions that announce distances in miles and feet by default.
    pub fn prefers_imperial(&self) -> bool {
        matches!(self.region.as_deref(), Some("US") | Some("GB") | Some("LR") | Some("MM"))
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self::fallback()
    }
}

impl FromStr for Locale {
    type Err = VoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Drop POSIX codeset and modifier: en_US.UTF-8@euro -> en_US
        let tag = s
            .trim()
            .split(['.', '@'])
            .next()
            .unwrap_or_default();
        if tag.is_empty() {
            return Err(VoiceError::Locale("empty locale".to_string()));
        }
        let mut parts = tag.split(['-', '_']);
        let language = parts.next().unwrap_or_default();
        let region = parts.next().map(str::to_string);
        Locale::new(language, region)
    }
}

impl TryFrom<String> for Locale {
    type Error = VoiceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Locale> for String {
    fn from(locale: Locale) -> Self {
        locale.to_string()
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.region {
            Some(region) => write!(f, "{}-{}", self.language, region),
            None => write!(f, "{}", self.language),
        }
    }
}
