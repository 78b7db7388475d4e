//! SessionStore: per-sender registration scratch state, plus the
//! background sweep that drops abandoned sessions.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::DatabaseError;
use crate::registration::{RegistrationSession, RegistrationStep};

use super::traits::Database;

/// At most one session per sender. A sender with a completed user never
/// gets one.
#[derive(Clone)]
pub struct SessionStore {
    db: Arc<dyn Database>,
}

impl SessionStore {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    pub async fn get(&self, sender_id: &str) -> Result<Option<RegistrationSession>, DatabaseError> {
        self.db.get_session(sender_id).await
    }

    /// Open (or reset) the sender's session at `step`.
    ///
    /// `None` when the sender has already completed registration, possibly
    /// on another worker since the caller last looked.
    pub async fn start(
        &self,
        sender_id: &str,
        step: RegistrationStep,
        language: Option<&str>,
    ) -> Result<Option<RegistrationSession>, DatabaseError> {
        let mut session = RegistrationSession::new(sender_id, step);
        session.language = language.map(str::to_string);
        if !self.db.save_session(&session).await? {
            return Ok(None);
        }
        debug!(sender = %sender_id, step = %step, "Registration session started");
        Ok(Some(session))
    }

    /// Move an existing session to `step`, recording `language` if given.
    ///
    /// `None` when the session was deleted after it was read, which means
    /// registration completed concurrently; it is not recreated.
    pub async fn advance(
        &self,
        mut session: RegistrationSession,
        step: RegistrationStep,
        language: Option<&str>,
    ) -> Result<Option<RegistrationSession>, DatabaseError> {
        session.step = step;
        if let Some(language) = language {
            session.language = Some(language.to_string());
        }
        session.updated_at = Utc::now();
        if !self.db.update_session(&session).await? {
            debug!(sender = %session.sender_id, "Session vanished before advance");
            return Ok(None);
        }
        Ok(Some(session))
    }

    pub async fn delete(&self, sender_id: &str) -> Result<bool, DatabaseError> {
        self.db.delete_session(sender_id).await
    }

    /// Delete sessions idle for longer than `retention`.
    pub async fn sweep_expired(&self, retention: Duration) -> Result<usize, DatabaseError> {
        let retention = chrono::Duration::from_std(retention)
            .map_err(|e| DatabaseError::Query(format!("sweep_expired retention: {e}")))?;
        self.db.purge_sessions_before(Utc::now() - retention).await
    }
}

/// Spawn the session sweep loop. The first sweep runs immediately.
pub fn spawn_session_sweeper(
    sessions: SessionStore,
    retention: Duration,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            retention_secs = retention.as_secs(),
            interval_secs = every.as_secs(),
            "Session sweeper started"
        );
        let mut tick = tokio::time::interval(every);
        loop {
            tick.tick().await;
            match sessions.sweep_expired(retention).await {
                Ok(0) => {}
                Ok(purged) => info!(purged, "Expired registration sessions removed"),
                Err(e) => warn!(error = %e, "Session sweep failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;

    async fn store() -> SessionStore {
        let db = LibSqlBackend::new_memory().await.unwrap();
        SessionStore::new(Arc::new(db))
    }

    #[tokio::test]
    async fn start_then_advance() {
        let sessions = store().await;
        let session = sessions
            .start("+15550200", RegistrationStep::Language, None)
            .await
            .unwrap()
            .unwrap();
        sessions
            .advance(session, RegistrationStep::Name, Some("ta"))
            .await
            .unwrap();

        let stored = sessions.get("+15550200").await.unwrap().unwrap();
        assert_eq!(stored.step, RegistrationStep::Name);
        assert_eq!(stored.language.as_deref(), Some("ta"));
    }

    #[tokio::test]
    async fn advance_after_concurrent_completion_is_a_no_op() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let sessions = SessionStore::new(Arc::clone(&db));
        sessions
            .start("+15550204", RegistrationStep::Name, Some("ta"))
            .await
            .unwrap();
        let seen = sessions.get("+15550204").await.unwrap().unwrap();
        db.complete_registration("+15550204", "Ann", "ta").await.unwrap();

        let advanced = sessions
            .advance(seen, RegistrationStep::Name, Some("hi"))
            .await
            .unwrap();

        assert!(advanced.is_none());
        assert!(sessions.get("+15550204").await.unwrap().is_none());
        let user = db.get_user("+15550204").await.unwrap().unwrap();
        assert_eq!(user.preferred_language, "ta");
    }

    #[tokio::test]
    async fn start_for_registered_sender_is_refused() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let sessions = SessionStore::new(Arc::clone(&db));
        db.complete_registration("+15550205", "Ann", "en").await.unwrap();

        let started = sessions
            .start("+15550205", RegistrationStep::Language, None)
            .await
            .unwrap();

        assert!(started.is_none());
        assert!(sessions.get("+15550205").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn start_resets_existing_session() {
        let sessions = store().await;
        sessions
            .start("+15550201", RegistrationStep::Name, Some("hi"))
            .await
            .unwrap();
        sessions
            .start("+15550201", RegistrationStep::Language, None)
            .await
            .unwrap();

        let stored = sessions.get("+15550201").await.unwrap().unwrap();
        assert_eq!(stored.step, RegistrationStep::Language);
        assert!(stored.language.is_none());
    }

    #[tokio::test]
    async fn sweep_keeps_fresh_sessions() {
        let sessions = store().await;
        sessions
            .start("+15550202", RegistrationStep::Language, None)
            .await
            .unwrap();

        let purged = sessions
            .sweep_expired(Duration::from_secs(24 * 3600))
            .await
            .unwrap();
        assert_eq!(purged, 0);
        assert!(sessions.get("+15550202").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn sweep_with_zero_retention_drops_everything() {
        let sessions = store().await;
        sessions
            .start("+15550203", RegistrationStep::Language, None)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(sessions.sweep_expired(Duration::ZERO).await.unwrap(), 1);
        assert!(!sessions.delete("+15550203").await.unwrap());
    }
}
