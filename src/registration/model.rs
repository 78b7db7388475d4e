//! User and registration-session records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::RegistrationStep;

/// Whether a user finished onboarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Pending,
    Completed,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            _ => Self::Pending,
        }
    }
}

/// A user, keyed by the stable external sender identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Phone number or chat id; unique.
    pub sender_id: String,
    pub name: String,
    pub preferred_language: String,
    pub registration_status: RegistrationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        sender_id: impl Into<String>,
        name: impl Into<String>,
        preferred_language: impl Into<String>,
        registration_status: RegistrationStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            sender_id: sender_id.into(),
            name: name.into(),
            preferred_language: preferred_language.into(),
            registration_status,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.registration_status == RegistrationStatus::Completed
    }
}

/// Scratch state for a sender that has not finished registering.
///
/// At most one exists per sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationSession {
    pub sender_id: String,
    pub step: RegistrationStep,
    /// Locale code, once chosen.
    pub language: Option<String>,
    /// Display name, once typed.
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RegistrationSession {
    pub fn new(sender_id: impl Into<String>, step: RegistrationStep) -> Self {
        let now = Utc::now();
        Self {
            sender_id: sender_id.into(),
            step,
            language: None,
            name: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}
