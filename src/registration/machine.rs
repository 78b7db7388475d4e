//! Drives a sender through onboarding: pick a language, then a name.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::catalog::{LanguageCatalog, SupportedLanguage, keys, lookup_language};
use crate::error::DatabaseError;
use crate::store::{SessionStore, UserDirectory};

use super::model::RegistrationSession;
use super::state::{RegistrationPhase, RegistrationStep};

/// Shortest accepted display name, in characters after trimming.
pub const MIN_NAME_CHARS: usize = 2;

/// Result of feeding one message to the machine.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// Phase the sender is in after this message.
    pub phase: RegistrationPhase,
    /// Replies to send, in order.
    pub replies: Vec<String>,
    /// Registration completed on another worker while this message was in
    /// flight. Nothing was written; the message belongs to a registered
    /// user now.
    pub superseded: bool,
}

impl StepOutcome {
    fn new(phase: RegistrationPhase, replies: Vec<String>) -> Self {
        Self {
            phase,
            replies,
            superseded: false,
        }
    }

    fn superseded() -> Self {
        Self {
            phase: RegistrationPhase::Complete,
            replies: Vec::new(),
            superseded: true,
        }
    }
}

/// Registration state machine over persisted sessions.
///
/// Holds no per-sender state of its own; every step reads and writes the
/// session store, so concurrent workers can share one instance.
pub struct RegistrationMachine {
    users: UserDirectory,
    sessions: SessionStore,
    catalog: Arc<LanguageCatalog>,
}

impl RegistrationMachine {
    pub fn new(users: UserDirectory, sessions: SessionStore, catalog: Arc<LanguageCatalog>) -> Self {
        Self {
            users,
            sessions,
            catalog,
        }
    }

    /// Feed `text` to the sender's current step.
    pub async fn handle(&self, sender_id: &str, text: &str) -> Result<StepOutcome, DatabaseError> {
        let session = self.sessions.get(sender_id).await?;
        let from = RegistrationPhase::from(session.as_ref().map(|s| s.step));

        let outcome = match session {
            None => match lookup_language(text) {
                Some(language) => self.choose_language(sender_id, language).await?,
                None => self.prompt_language(sender_id).await?,
            },
            Some(session) => match session.step {
                RegistrationStep::Language => match lookup_language(text) {
                    Some(language) => self.select(session, language).await?,
                    None => self.reject_language(),
                },
                RegistrationStep::Name => self.submit_name(session, text).await?,
            },
        };

        debug_assert!(
            outcome.superseded || from.can_transition_to(outcome.phase),
            "illegal registration transition {from} -> {}",
            outcome.phase
        );
        debug!(sender = %sender_id, from = %from, to = %outcome.phase, "Registration step");
        Ok(outcome)
    }

    /// Show the language menu, opening a session if the sender has none.
    ///
    /// An existing session is left where it is.
    pub async fn prompt_language(&self, sender_id: &str) -> Result<StepOutcome, DatabaseError> {
        let phase = match self.sessions.get(sender_id).await? {
            Some(session) => RegistrationPhase::from(Some(session.step)),
            None => match self
                .sessions
                .start(sender_id, RegistrationStep::Language, None)
                .await?
            {
                Some(_) => RegistrationPhase::Language,
                None => return Ok(StepOutcome::superseded()),
            },
        };
        let menu = self.catalog.language_menu(self.catalog.default_locale());
        Ok(StepOutcome::new(phase, vec![menu]))
    }

    /// Record `language` and ask for a name, from any pre-complete phase.
    pub async fn choose_language(
        &self,
        sender_id: &str,
        language: &SupportedLanguage,
    ) -> Result<StepOutcome, DatabaseError> {
        match self.sessions.get(sender_id).await? {
            Some(session) => self.select(session, language).await,
            None => match self
                .sessions
                .start(sender_id, RegistrationStep::Name, Some(language.code))
                .await?
            {
                Some(_) => Ok(self.ask_name(language.code)),
                None => Ok(StepOutcome::superseded()),
            },
        }
    }

    async fn select(
        &self,
        session: RegistrationSession,
        language: &SupportedLanguage,
    ) -> Result<StepOutcome, DatabaseError> {
        match self
            .sessions
            .advance(session, RegistrationStep::Name, Some(language.code))
            .await?
        {
            Some(_) => Ok(self.ask_name(language.code)),
            None => Ok(StepOutcome::superseded()),
        }
    }

    fn ask_name(&self, locale: &str) -> StepOutcome {
        StepOutcome::new(
            RegistrationPhase::Name,
            vec![self.catalog.get(locale, keys::ASK_NAME)],
        )
    }

    fn reject_language(&self) -> StepOutcome {
        let locale = self.catalog.default_locale();
        StepOutcome::new(
            RegistrationPhase::Language,
            vec![
                self.catalog.get(locale, keys::INVALID_LANGUAGE),
                self.catalog.language_menu(locale),
            ],
        )
    }

    async fn submit_name(
        &self,
        session: RegistrationSession,
        text: &str,
    ) -> Result<StepOutcome, DatabaseError> {
        let locale = session
            .language
            .clone()
            .unwrap_or_else(|| self.catalog.default_locale().to_string());

        let name = text.trim();
        if name.chars().count() < MIN_NAME_CHARS {
            return Ok(StepOutcome::new(
                RegistrationPhase::Name,
                vec![self.catalog.get(&locale, keys::INVALID_NAME)],
            ));
        }

        match self
            .users
            .create_or_update(&session.sender_id, name, &locale)
            .await
        {
            Ok(user_id) => {
                info!(sender = %session.sender_id, user_id = %user_id, "Registration complete");
                let vars = [("name", name)];
                Ok(StepOutcome::new(
                    RegistrationPhase::Complete,
                    vec![
                        self.catalog.render(&locale, keys::REGISTRATION_COMPLETE, &vars),
                        self.catalog.render(&locale, keys::WELCOME, &vars),
                    ],
                ))
            }
            Err(e) => {
                error!(sender = %session.sender_id, error = %e, "Failed to save registration");
                Ok(StepOutcome::new(
                    RegistrationPhase::Name,
                    vec![self.catalog.get(&locale, keys::REGISTRATION_FAILED)],
                ))
            }
        }
    }
}
