//! UserDirectory: lookups and upserts of users keyed by sender id.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::registration::{RegistrationStatus, User};

use super::traits::Database;

/// User records keyed by the stable external sender identifier.
#[derive(Clone)]
pub struct UserDirectory {
    db: Arc<dyn Database>,
}

impl UserDirectory {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Exact-match lookup. No side effects.
    pub async fn find(&self, sender_id: &str) -> Result<Option<User>, DatabaseError> {
        self.db.get_user(sender_id).await
    }

    /// Upsert the user as completed, overwriting any previous name and
    /// locale, and drop the sender's registration session in the same
    /// transaction.
    ///
    /// On error nothing changed, so the session is still there to retry.
    pub async fn create_or_update(
        &self,
        sender_id: &str,
        name: &str,
        locale: &str,
    ) -> Result<Uuid, DatabaseError> {
        let id = self.db.complete_registration(sender_id, name, locale).await?;
        info!(sender = %sender_id, user_id = %id, locale, "User registered");
        Ok(id)
    }

    /// Return the existing user's id, or create a pending user when a
    /// `name` is supplied.
    ///
    /// Returns `None` for an unknown sender without a name: creation is
    /// left to the registration flow.
    pub async fn get_or_create(
        &self,
        sender_id: &str,
        name: Option<&str>,
        locale: &str,
    ) -> Result<Option<Uuid>, DatabaseError> {
        if let Some(user) = self.db.get_user(sender_id).await? {
            return Ok(Some(user.id));
        }

        let Some(name) = name else {
            debug!(sender = %sender_id, "No user and no name supplied; deferring creation");
            return Ok(None);
        };

        let user = User::new(sender_id, name, locale, RegistrationStatus::Pending);
        match self.db.insert_user(&user).await {
            Ok(()) => Ok(Some(user.id)),
            // Lost a race with a concurrent insert for the same sender.
            Err(DatabaseError::Constraint(_)) => {
                Ok(self.db.get_user(sender_id).await?.map(|u| u.id))
            }
            Err(e) => Err(e),
        }
    }

    /// Change a registered user's locale. Returns false if no such user.
    pub async fn set_language(&self, sender_id: &str, locale: &str) -> Result<bool, DatabaseError> {
        let updated = self.db.update_user_language(sender_id, locale).await?;
        if updated {
            info!(sender = %sender_id, locale, "Preferred language changed");
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;

    async fn directory() -> UserDirectory {
        let db = LibSqlBackend::new_memory().await.unwrap();
        UserDirectory::new(Arc::new(db))
    }

    #[tokio::test]
    async fn find_unknown_sender() {
        let users = directory().await;
        assert!(users.find("+15550100").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_or_update_overwrites() {
        let users = directory().await;
        let first = users.create_or_update("+15550101", "Anm", "en").await.unwrap();
        let second = users.create_or_update("+15550101", "Ann", "ta").await.unwrap();
        assert_eq!(first, second);

        let user = users.find("+15550101").await.unwrap().unwrap();
        assert_eq!(user.name, "Ann");
        assert_eq!(user.preferred_language, "ta");
        assert!(user.is_registered());
    }

    #[tokio::test]
    async fn get_or_create_without_name_defers() {
        let users = directory().await;
        let id = users.get_or_create("+15550102", None, "en").await.unwrap();
        assert!(id.is_none());
        assert!(users.find("+15550102").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let users = directory().await;
        let created = users
            .get_or_create("+15550103", Some("Ann"), "en")
            .await
            .unwrap()
            .unwrap();
        let again = users
            .get_or_create("+15550103", Some("Someone Else"), "hi")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created, again);

        let user = users.find("+15550103").await.unwrap().unwrap();
        assert_eq!(user.name, "Ann");
        assert_eq!(user.registration_status, RegistrationStatus::Pending);
    }

    #[tokio::test]
    async fn set_language_requires_user() {
        let users = directory().await;
        assert!(!users.set_language("+15550104", "ta").await.unwrap());

        users.create_or_update("+15550104", "Ann", "en").await.unwrap();
        assert!(users.set_language("+15550104", "ta").await.unwrap());
        assert_eq!(
            users.find("+15550104").await.unwrap().unwrap().preferred_language,
            "ta"
        );
    }
}
