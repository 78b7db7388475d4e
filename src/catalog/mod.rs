//! Localized message catalog.
//!
//! The catalog maps `(locale, key)` to display text. Lookups fall back to
//! the default locale, then to a `[key]` placeholder, so a missing
//! translation never fails a reply. The whole catalog can be swapped at
//! runtime with [`LanguageCatalog::reload`]; a reader sees either the old
//! or the new document, never a mix of both.

pub mod languages;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{info, warn};

use crate::error::ConfigError;

pub use languages::{SUPPORTED_LANGUAGES, SupportedLanguage, lookup_language};

/// Catalog embedded at compile time.
const BUILTIN_CATALOG: &str = include_str!("../../locales/messages.json");

/// Message keys used by the conversation flow.
pub mod keys {
    pub const WELCOME: &str = "welcome";
    pub const HELP: &str = "help";
    pub const LANGUAGE_MENU: &str = "language_menu";
    pub const ASK_NAME: &str = "ask_name";
    pub const INVALID_LANGUAGE: &str = "invalid_language";
    pub const INVALID_NAME: &str = "invalid_name";
    pub const REGISTRATION_COMPLETE: &str = "registration_complete";
    pub const REGISTRATION_FAILED: &str = "registration_failed";
    pub const LANGUAGE_CHANGED: &str = "language_changed";
    pub const UNKNOWN_COMMAND: &str = "unknown_command";
    pub const ANALYZING: &str = "analyzing";
    pub const ANALYSIS_FAILED: &str = "analysis_failed";
    pub const NOT_FOOD: &str = "not_food";
    pub const LOW_HEALTH_WARNING: &str = "low_health_warning";
    pub const FOLLOW_UP: &str = "follow_up";
    pub const IMAGE_ERROR: &str = "image_error";
    pub const REGISTRATION_INCOMPLETE: &str = "registration_incomplete";
    pub const UNSUPPORTED_MESSAGE: &str = "unsupported_message";
    pub const GENERIC_ERROR: &str = "generic_error";
}

/// Parsed catalog document: locale → key → text.
pub type Messages = HashMap<String, HashMap<String, String>>;

/// Thread-safe, hot-swappable message catalog.
pub struct LanguageCatalog {
    messages: ArcSwap<Messages>,
    default_locale: String,
}

impl LanguageCatalog {
    /// Build a catalog from an already-parsed document.
    pub fn new(messages: Messages, default_locale: impl Into<String>) -> Self {
        Self {
            messages: ArcSwap::from_pointee(messages),
            default_locale: default_locale.into(),
        }
    }

    /// The catalog shipped with the binary.
    pub fn builtin(default_locale: impl Into<String>) -> Result<Self, ConfigError> {
        Ok(Self::new(parse_messages(BUILTIN_CATALOG)?, default_locale))
    }

    /// Load a catalog from a JSON file.
    pub fn from_path(path: &Path, default_locale: impl Into<String>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(Self::new(parse_messages(&raw)?, default_locale))
    }

    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    /// Resolve `key` for `locale`.
    ///
    /// Falls back to the default locale, then to the literal `[key]`.
    pub fn get(&self, locale: &str, key: &str) -> String {
        let messages = self.messages.load();
        if let Some(text) = messages.get(locale).and_then(|m| m.get(key)) {
            return text.clone();
        }
        if let Some(text) = messages.get(&self.default_locale).and_then(|m| m.get(key)) {
            return text.clone();
        }
        warn!(locale, key, "Message key missing from catalog");
        format!("[{key}]")
    }

    /// Resolve `key` and substitute `{name}` style placeholders.
    pub fn render(&self, locale: &str, key: &str, vars: &[(&str, &str)]) -> String {
        let mut text = self.get(locale, key);
        for (name, value) in vars {
            text = text.replace(&format!("{{{name}}}"), value);
        }
        text
    }

    /// The language selection menu in `locale`.
    pub fn language_menu(&self, locale: &str) -> String {
        let lines = languages::menu_lines();
        self.render(locale, keys::LANGUAGE_MENU, &[("languages", lines.as_str())])
    }

    /// Atomically replace the catalog contents.
    pub fn replace(&self, messages: Messages) {
        self.messages.store(Arc::new(messages));
    }

    /// Re-read the catalog from `path` and swap it in.
    ///
    /// On a read or parse failure the current catalog stays in place.
    pub async fn reload(&self, path: &Path) -> Result<usize, ConfigError> {
        let raw = tokio::fs::read_to_string(path).await?;
        let messages = parse_messages(&raw)?;
        let locales = messages.len();
        self.replace(messages);
        info!(path = %path.display(), locales, "Message catalog reloaded");
        Ok(locales)
    }

    /// Locales currently present in the catalog.
    pub fn locales(&self) -> Vec<String> {
        let mut locales: Vec<String> = self.messages.load().keys().cloned().collect();
        locales.sort();
        locales
    }
}

fn parse_messages(raw: &str) -> Result<Messages, ConfigError> {
    serde_json::from_str(raw).map_err(|e| ConfigError::ParseError(format!("message catalog: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> LanguageCatalog {
        LanguageCatalog::builtin("en").unwrap()
    }

    #[test]
    fn builtin_catalog_parses() {
        let catalog = catalog();
        assert_eq!(catalog.locales(), vec!["en", "hi", "ta"]);
    }

    #[test]
    fn builtin_english_has_every_key() {
        let catalog = catalog();
        let all = [
            keys::WELCOME,
            keys::HELP,
            keys::LANGUAGE_MENU,
            keys::ASK_NAME,
            keys::INVALID_LANGUAGE,
            keys::INVALID_NAME,
            keys::REGISTRATION_COMPLETE,
            keys::REGISTRATION_FAILED,
            keys::LANGUAGE_CHANGED,
            keys::UNKNOWN_COMMAND,
            keys::ANALYZING,
            keys::ANALYSIS_FAILED,
            keys::NOT_FOOD,
            keys::LOW_HEALTH_WARNING,
            keys::FOLLOW_UP,
            keys::IMAGE_ERROR,
            keys::REGISTRATION_INCOMPLETE,
            keys::UNSUPPORTED_MESSAGE,
            keys::GENERIC_ERROR,
        ];
        for key in all {
            assert_ne!(catalog.get("en", key), format!("[{key}]"), "missing {key}");
        }
    }

    #[test]
    fn missing_key_falls_back_to_default_locale() {
        let catalog = catalog();
        // Hindi ships without a help text.
        assert_eq!(catalog.get("hi", keys::HELP), catalog.get("en", keys::HELP));
    }

    #[test]
    fn unknown_locale_falls_back_to_default_locale() {
        let catalog = catalog();
        assert_eq!(catalog.get("xx", keys::ASK_NAME), catalog.get("en", keys::ASK_NAME));
    }

    #[test]
    fn missing_everywhere_yields_placeholder() {
        let catalog = catalog();
        assert_eq!(catalog.get("ta", "no_such_key"), "[no_such_key]");
    }

    #[test]
    fn render_substitutes_placeholders() {
        let catalog = catalog();
        let text = catalog.render("en", keys::WELCOME, &[("name", "Ann")]);
        assert!(text.starts_with("Welcome, Ann!"));
        assert!(!text.contains("{name}"));
    }

    #[test]
    fn language_menu_lists_languages() {
        let menu = catalog().language_menu("en");
        assert!(menu.contains("Tamil (தமிழ்)"));
        assert!(!menu.contains("{languages}"));
    }

    #[test]
    fn replace_swaps_whole_document() {
        let catalog = catalog();
        let mut messages = Messages::new();
        messages.insert(
            "en".into(),
            HashMap::from([("welcome".to_string(), "Hello {name}".to_string())]),
        );
        catalog.replace(messages);
        assert_eq!(catalog.get("ta", keys::WELCOME), "Hello {name}");
        assert_eq!(catalog.get("en", keys::HELP), "[help]");
    }

    #[tokio::test]
    async fn reload_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("messages.json");
        std::fs::write(&path, r#"{"en": {"help": "new help"}, "fr": {}}"#).unwrap();

        let catalog = catalog();
        let locales = catalog.reload(&path).await.unwrap();
        assert_eq!(locales, 2);
        assert_eq!(catalog.get("en", keys::HELP), "new help");
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_catalog() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let catalog = catalog();
        let before = catalog.get("en", keys::HELP);
        assert!(catalog.reload(&path).await.is_err());
        assert_eq!(catalog.get("en", keys::HELP), before);
    }

    #[tokio::test]
    async fn reload_of_missing_file_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = catalog();

        let err = catalog.reload(&tmp.path().join("absent.json")).await.unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)), "got {err:?}");
        assert_eq!(catalog.locales(), vec!["en", "hi", "ta"]);
    }
}
