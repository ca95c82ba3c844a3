//! Voice selection from script cues in the text being spoken.

use crate::config::SpeechConfig;

/// A synthesis voice offered by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    /// Engine-specific identifier passed back to `speak`.
    pub id: String,
    pub name: String,
    /// BCP 47 style tag, e.g. `hi-IN` or `en-us`.
    pub lang: String,
}

impl Voice {
    pub fn new(id: impl Into<String>, name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            lang: lang.into(),
        }
    }
}

/// Writing systems we can pick a voice for, keyed by Unicode block.
const SCRIPTS: &[(char, char, &str)] = &[
    ('\u{0900}', '\u{097F}', "hi"), // Devanagari
    ('\u{0980}', '\u{09FF}', "bn"), // Bengali
    ('\u{0A00}', '\u{0A7F}', "pa"), // Gurmukhi
    ('\u{0A80}', '\u{0AFF}', "gu"), // Gujarati
    ('\u{0B80}', '\u{0BFF}', "ta"), // Tamil
    ('\u{0C00}', '\u{0C7F}', "te"), // Telugu
    ('\u{0C80}', '\u{0CFF}', "kn"), // Kannada
    ('\u{0D00}', '\u{0D7F}', "ml"), // Malayalam
];

/// Language of the first non-Latin script found in `text`, if any.
pub fn script_language(text: &str) -> Option<&'static str> {
    text.chars().find_map(|c| {
        SCRIPTS
            .iter()
            .find(|(lo, hi, _)| (*lo..=*hi).contains(&c))
            .map(|(_, _, lang)| *lang)
    })
}

/// Preferences that steer [`select_voice`].
#[derive(Debug, Clone)]
pub struct VoicePreferences {
    pub default_language: String,
    pub region: String,
    pub name_hint: Option<String>,
}

impl From<&SpeechConfig> for VoicePreferences {
    fn from(config: &SpeechConfig) -> Self {
        Self {
            default_language: config.default_language.clone(),
            region: config.region.clone(),
            name_hint: config.voice_name_hint.clone(),
        }
    }
}

impl Default for VoicePreferences {
    fn default() -> Self {
        Self::from(&SpeechConfig::default())
    }
}

fn lang_starts_with(voice: &Voice, lang: &str) -> bool {
    voice.lang.to_ascii_lowercase().starts_with(&lang.to_ascii_lowercase())
}

/// Pick the voice for `text`.
///
/// Text in a non-Latin script prefers a voice in that language, then any
/// voice for the configured region. Everything else prefers a default
/// language voice whose name matches the hint, then any default language
/// voice. Both fall back to the first voice; `None` only when `voices` is
/// empty.
pub fn select_voice<'a>(text: &str, voices: &'a [Voice], prefs: &VoicePreferences) -> Option<&'a Voice> {
    let preferred = match script_language(text) {
        Some(lang) => {
            let region = prefs.region.to_ascii_uppercase();
            voices
                .iter()
                .find(|v| lang_starts_with(v, lang))
                .or_else(|| {
                    voices
                        .iter()
                        .find(|v| !region.is_empty() && v.lang.to_ascii_uppercase().contains(&region))
                })
        }
        None => {
            let lang = prefs.default_language.as_str();
            prefs
                .name_hint
                .as_deref()
                .and_then(|hint| {
                    let hint = hint.to_lowercase();
                    voices
                        .iter()
                        .find(|v| lang_starts_with(v, lang) && v.name.to_lowercase().contains(&hint))
                })
                .or_else(|| voices.iter().find(|v| lang_starts_with(v, lang)))
        }
    };
    preferred.or_else(|| voices.first())
}
