//! Supported display languages and their locale codes.

/// A language users can pick during registration or switch to later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportedLanguage {
    pub code: &'static str,
    /// English display name, shown in the menu.
    pub name: &'static str,
    /// Name in the language's own script.
    pub native_name: &'static str,
}

impl SupportedLanguage {
    /// `Tamil (தமிழ்)`, or just the name when both spellings agree.
    pub fn label(&self) -> String {
        if self.name == self.native_name {
            self.name.to_string()
        } else {
            format!("{} ({})", self.name, self.native_name)
        }
    }
}

/// Menu order is the order of this table.
pub static SUPPORTED_LANGUAGES: &[SupportedLanguage] = &[
    SupportedLanguage { code: "en", name: "English", native_name: "English" },
    SupportedLanguage { code: "hi", name: "Hindi", native_name: "हिन्दी" },
    SupportedLanguage { code: "ta", name: "Tamil", native_name: "தமிழ்" },
    SupportedLanguage { code: "te", name: "Telugu", native_name: "తెలుగు" },
    SupportedLanguage { code: "kn", name: "Kannada", native_name: "ಕನ್ನಡ" },
    SupportedLanguage { code: "ml", name: "Malayalam", native_name: "മലയാളം" },
    SupportedLanguage { code: "bn", name: "Bengali", native_name: "বাংলা" },
    SupportedLanguage { code: "mr", name: "Marathi", native_name: "मराठी" },
];

/// Match user text against the display names, case-insensitively.
///
/// Only exact (trimmed) matches count; there is no fuzzy matching.
pub fn lookup_language(text: &str) -> Option<&'static SupportedLanguage> {
    let wanted = text.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }
    SUPPORTED_LANGUAGES
        .iter()
        .find(|lang| lang.name.to_lowercase() == wanted || lang.native_name.to_lowercase() == wanted)
}

/// One menu line per language, e.g. `• Tamil (தமிழ்)`.
pub fn menu_lines() -> String {
    SUPPORTED_LANGUAGES
        .iter()
        .map(|lang| format!("• {}", lang.label()))
        .collect::<Vec<_>>()
        .join("\n")
}
