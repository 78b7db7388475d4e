//! `Database` trait: single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::nutrition::NutritionRecord;
use crate::registration::{RegistrationSession, User};

/// Backend-agnostic database trait covering users, sessions, and records.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Users ───────────────────────────────────────────────────────

    /// Exact-match lookup by sender identifier.
    async fn get_user(&self, sender_id: &str) -> Result<Option<User>, DatabaseError>;

    /// Insert a new user. Fails with `Constraint` if the sender exists.
    async fn insert_user(&self, user: &User) -> Result<(), DatabaseError>;

    /// Upsert the user as completed and delete the sender's registration
    /// session, in one transaction. Returns the user's id.
    ///
    /// An existing user's name and language are overwritten.
    async fn complete_registration(
        &self,
        sender_id: &str,
        name: &str,
        language: &str,
    ) -> Result<Uuid, DatabaseError>;

    /// Change a user's preferred language. Returns false if no such user.
    async fn update_user_language(
        &self,
        sender_id: &str,
        language: &str,
    ) -> Result<bool, DatabaseError>;

    // ── Registration sessions ───────────────────────────────────────

    async fn get_session(
        &self,
        sender_id: &str,
    ) -> Result<Option<RegistrationSession>, DatabaseError>;

    /// Insert or replace the sender's session. Writes nothing and returns
    /// false when the sender has already completed registration.
    async fn save_session(&self, session: &RegistrationSession) -> Result<bool, DatabaseError>;

    /// Overwrite an existing session. Returns false if it is gone.
    async fn update_session(&self, session: &RegistrationSession) -> Result<bool, DatabaseError>;

    /// Returns whether a session was deleted.
    async fn delete_session(&self, sender_id: &str) -> Result<bool, DatabaseError>;

    /// Delete sessions last updated before `cutoff`. Returns the count.
    async fn purge_sessions_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DatabaseError>;

    // ── Nutrition records ───────────────────────────────────────────

    async fn insert_nutrition_record(&self, record: &NutritionRecord) -> Result<(), DatabaseError>;

    /// A user's records, most recent first.
    async fn list_nutrition_records(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<NutritionRecord>, DatabaseError>;
}
