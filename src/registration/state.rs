//! Registration state machine: tracks where a sender is in onboarding.

use serde::{Deserialize, Serialize};

/// The step a persisted registration session is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStep {
    Language,
    Name,
}

impl RegistrationStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Language => "language",
            Self::Name => "name",
        }
    }

    /// Parse a stored step. Unknown values restart at the language step.
    pub fn parse(s: &str) -> Self {
        match s {
            "name" => Self::Name,
            _ => Self::Language,
        }
    }
}

impl std::fmt::Display for RegistrationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a sender stands overall.
///
/// Progresses linearly: New → Language → Name → Complete, except that a
/// language name sent as the very first message skips straight to Name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationPhase {
    /// No session and no user.
    New,
    /// Session exists, awaiting a locale.
    Language,
    /// Locale chosen, awaiting a display name.
    Name,
    /// User exists, session deleted.
    Complete,
}

impl RegistrationPhase {
    /// Check if a transition from `self` to `target` is valid.
    ///
    /// Self-transitions are allowed for the waiting phases: invalid input
    /// leaves the sender where they are.
    pub fn can_transition_to(&self, target: RegistrationPhase) -> bool {
        use RegistrationPhase::*;
        matches!(
            (self, target),
            (New, Language)
                | (New, Name)
                | (Language, Language)
                | (Language, Name)
                | (Name, Name)
                | (Name, Complete)
        )
    }

    /// Whether this phase is terminal (registration is done).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl From<Option<RegistrationStep>> for RegistrationPhase {
    fn from(step: Option<RegistrationStep>) -> Self {
        match step {
            None => Self::New,
            Some(RegistrationStep::Language) => Self::Language,
            Some(RegistrationStep::Name) => Self::Name,
        }
    }
}

impl std::fmt::Display for RegistrationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::New => "new",
            Self::Language => "language",
            Self::Name => "name",
            Self::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        use RegistrationPhase::*;
        let transitions = [
            (New, Language),
            (New, Name),
            (Language, Language),
            (Language, Name),
            (Name, Name),
            (Name, Complete),
        ];
        for (from, to) in transitions {
            assert!(
                from.can_transition_to(to),
                "{from} should transition to {to}"
            );
        }
    }

    #[test]
    fn invalid_transitions() {
        use RegistrationPhase::*;
        // Skip straight to complete
        assert!(!New.can_transition_to(Complete));
        assert!(!Language.can_transition_to(Complete));
        // Go backward
        assert!(!Name.can_transition_to(Language));
        // Terminal
        assert!(!Complete.can_transition_to(New));
        assert!(!Complete.can_transition_to(Complete));
    }

    #[test]
    fn is_terminal() {
        use RegistrationPhase::*;
        assert!(Complete.is_terminal());
        assert!(!New.is_terminal());
        assert!(!Language.is_terminal());
        assert!(!Name.is_terminal());
    }

    #[test]
    fn phase_from_step() {
        assert_eq!(RegistrationPhase::from(None), RegistrationPhase::New);
        assert_eq!(
            RegistrationPhase::from(Some(RegistrationStep::Name)),
            RegistrationPhase::Name
        );
    }

    #[test]
    fn display_matches_serde() {
        use RegistrationPhase::*;
        for phase in [New, Language, Name, Complete] {
            let display = format!("{phase}");
            let json = serde_json::to_string(&phase).unwrap();
            assert_eq!(format!("\"{display}\""), json);
        }
        for step in [RegistrationStep::Language, RegistrationStep::Name] {
            let json = serde_json::to_string(&step).unwrap();
            assert_eq!(format!("\"{step}\""), json);
            assert_eq!(RegistrationStep::parse(step.as_str()), step);
        }
    }

    #[test]
    fn unknown_step_restarts_at_language() {
        assert_eq!(RegistrationStep::parse("bogus"), RegistrationStep::Language);
    }
}
