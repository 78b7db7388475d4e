//! Text intent classification.

use crate::catalog::{SupportedLanguage, lookup_language};

const GREETINGS: &[&str] = &[
    "hi", "hii", "hello", "hey", "start", "/start", "hola", "namaste", "vanakkam",
];

const HELP: &[&str] = &["help", "/help"];

const LANGUAGE: &[&str] = &["language", "/language", "lang"];

/// What a text message asks for, before looking at who sent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Greeting,
    Help,
    /// Show the language menu.
    Language,
    /// The text is a supported language's name.
    LanguageChoice(&'static SupportedLanguage),
    /// Anything else; meaning depends on the sender's state.
    FreeText,
}

fn keyword(text: &str) -> String {
    text.trim()
        .trim_end_matches(['!', '.', '?'])
        .to_lowercase()
}

/// Classify `text`. First match wins: greeting, help, language menu,
/// language name.
pub fn classify(text: &str) -> Intent {
    let word = keyword(text);
    if GREETINGS.contains(&word.as_str()) {
        Intent::Greeting
    } else if HELP.contains(&word.as_str()) {
        Intent::Help
    } else if LANGUAGE.contains(&word.as_str()) {
        Intent::Language
    } else if let Some(language) = lookup_language(text) {
        Intent::LanguageChoice(language)
    } else {
        Intent::FreeText
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greetings() {
        for text in ["hi", "Hello!", "  HEY ", "/start", "Vanakkam."] {
            assert_eq!(classify(text), Intent::Greeting, "{text}");
        }
    }

    #[test]
    fn help_and_language_keywords() {
        assert_eq!(classify("Help"), Intent::Help);
        assert_eq!(classify("help?"), Intent::Help);
        assert_eq!(classify("language"), Intent::Language);
        assert_eq!(classify("/language"), Intent::Language);
    }

    #[test]
    fn language_names() {
        match classify("tamil") {
            Intent::LanguageChoice(lang) => assert_eq!(lang.code, "ta"),
            other => panic!("expected language choice, got {other:?}"),
        }
        match classify("हिन्दी") {
            Intent::LanguageChoice(lang) => assert_eq!(lang.code, "hi"),
            other => panic!("expected language choice, got {other:?}"),
        }
    }

    #[test]
    fn everything_else_is_free_text() {
        for text in ["Ann", "hi there", "", "tamill", "what is this"] {
            assert_eq!(classify(text), Intent::FreeText, "{text:?}");
        }
    }
}
