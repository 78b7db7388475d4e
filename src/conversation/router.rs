//! ConversationRouter: decides what to do with each inbound event.
//!
//! Channel-agnostic: replies go through the [`ChannelAdapter`] the event
//! arrived on. All continuity lives in the database, so one router can
//! serve any number of concurrent events.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::catalog::{LanguageCatalog, SupportedLanguage, keys};
use crate::channels::{ChannelAdapter, InboundEvent, InboundPayload};
use crate::error::Error;
use crate::nutrition::{Normalized, NormalizedAnalysis, NotFood, NutritionRecord, normalize, render};
use crate::registration::{RegistrationMachine, RegistrationPhase, StepOutcome, User};
use crate::storage::ObjectStore;
use crate::store::{Database, SessionStore, UserDirectory};
use crate::vision::{VisionAnalysis, VisionAnalyzer};

use super::intent::{Intent, classify};

/// What handling an event amounted to. Logged once per event.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Welcomed,
    HelpShown,
    LanguageMenuShown,
    LanguageChanged { locale: String },
    /// The event was fed to registration; the sender is now in `phase`.
    Registration { phase: RegistrationPhase },
    UnknownCommand,
    Analyzed {
        record_id: Option<Uuid>,
        /// False when the upload or insert failed; the user still got the
        /// analysis.
        persisted: bool,
        low_health: bool,
    },
    NotFood,
    AnalysisFailed,
    RegistrationIncomplete,
    Unsupported,
}

/// Collaborators and settings for a [`ConversationRouter`].
pub struct RouterDeps {
    pub db: Arc<dyn Database>,
    pub catalog: Arc<LanguageCatalog>,
    pub analyzer: Arc<dyn VisionAnalyzer>,
    pub object_store: Arc<dyn ObjectStore>,
    /// Health scores strictly below this get a warning.
    pub low_health_threshold: i64,
}

pub struct ConversationRouter {
    db: Arc<dyn Database>,
    users: UserDirectory,
    registration: RegistrationMachine,
    catalog: Arc<LanguageCatalog>,
    analyzer: Arc<dyn VisionAnalyzer>,
    object_store: Arc<dyn ObjectStore>,
    low_health_threshold: i64,
}

impl ConversationRouter {
    pub fn new(deps: RouterDeps) -> Self {
        let users = UserDirectory::new(Arc::clone(&deps.db));
        let sessions = SessionStore::new(Arc::clone(&deps.db));
        Self {
            registration: RegistrationMachine::new(
                users.clone(),
                sessions,
                Arc::clone(&deps.catalog),
            ),
            users,
            db: deps.db,
            catalog: deps.catalog,
            analyzer: deps.analyzer,
            object_store: deps.object_store,
            low_health_threshold: deps.low_health_threshold,
        }
    }

    pub fn catalog(&self) -> &Arc<LanguageCatalog> {
        &self.catalog
    }

    /// Handle one inbound event end to end.
    ///
    /// On error the sender still gets a generic failure reply; the error is
    /// logged and returned.
    pub async fn handle_inbound_event(
        &self,
        channel: &dyn ChannelAdapter,
        event: InboundEvent,
    ) -> Result<DispatchOutcome, Error> {
        let started = Instant::now();
        let sender = event.sender_id.as_str();

        let result = match &event.payload {
            InboundPayload::Text(text) => self.handle_text(channel, sender, text).await,
            InboundPayload::Image { media_ref, .. } => {
                self.handle_image(channel, sender, media_ref).await
            }
            InboundPayload::Other { .. } => self.handle_unsupported(channel, sender).await,
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(outcome) => info!(
                channel = %event.channel,
                sender = %sender,
                kind = event.payload.kind(),
                outcome = ?outcome,
                elapsed_ms,
                "Event handled"
            ),
            Err(e) => {
                error!(
                    channel = %event.channel,
                    sender = %sender,
                    kind = event.payload.kind(),
                    error = %e,
                    elapsed_ms,
                    "Event failed"
                );
                let key = match &event.payload {
                    InboundPayload::Image { .. } => keys::IMAGE_ERROR,
                    _ => keys::GENERIC_ERROR,
                };
                let locale = self.locale_for(sender).await;
                self.reply(channel, sender, &self.catalog.get(&locale, key))
                    .await;
            }
        }
        result
    }

    /// Handle a batch of events: one sender's events in arrival order,
    /// different senders concurrently.
    pub async fn handle_batch(&self, channel: &dyn ChannelAdapter, events: Vec<InboundEvent>) {
        let mut by_sender: Vec<(String, Vec<InboundEvent>)> = Vec::new();
        for event in events {
            match by_sender.iter_mut().find(|(s, _)| *s == event.sender_id) {
                Some((_, queue)) => queue.push(event),
                None => by_sender.push((event.sender_id.clone(), vec![event])),
            }
        }

        let queues = by_sender.into_iter().map(|(_, queue)| async move {
            for event in queue {
                // Outcome already logged by handle_inbound_event.
                let _ = self.handle_inbound_event(channel, event).await;
            }
        });
        futures::future::join_all(queues).await;
    }

    // ── Replies ─────────────────────────────────────────────────────

    /// Best-effort send. A failure is logged and otherwise ignored: state
    /// changes made before the send stand.
    async fn reply(&self, channel: &dyn ChannelAdapter, recipient: &str, text: &str) {
        if let Err(e) = channel.send(recipient, text).await {
            warn!(channel = %channel.kind(), recipient, error = %e, "Reply not delivered");
        }
    }

    async fn reply_all(&self, channel: &dyn ChannelAdapter, recipient: &str, outcome: &StepOutcome) {
        for text in &outcome.replies {
            self.reply(channel, recipient, text).await;
        }
    }

    /// The sender's preferred locale, or the default when unknown. Never
    /// fails: a lookup error falls back to the default.
    async fn locale_for(&self, sender: &str) -> String {
        match self.users.find(sender).await {
            Ok(Some(user)) => user.preferred_language,
            Ok(None) => self.catalog.default_locale().to_string(),
            Err(e) => {
                warn!(sender, error = %e, "User lookup failed; using default locale");
                self.catalog.default_locale().to_string()
            }
        }
    }

    // ── Text ────────────────────────────────────────────────────────

    async fn handle_text(
        &self,
        channel: &dyn ChannelAdapter,
        sender: &str,
        text: &str,
    ) -> Result<DispatchOutcome, Error> {
        let intent = classify(text);
        if let Some(user) = self.registered_user(sender).await? {
            return self.handle_registered_text(channel, &user, intent).await;
        }

        let default_locale = self.catalog.default_locale().to_string();
        let step = match intent {
            Intent::Help => {
                self.reply(channel, sender, &self.catalog.get(&default_locale, keys::HELP))
                    .await;
                return Ok(DispatchOutcome::HelpShown);
            }
            Intent::Language => {
                self.reply(channel, sender, &self.catalog.language_menu(&default_locale))
                    .await;
                return Ok(DispatchOutcome::LanguageMenuShown);
            }
            Intent::Greeting => self.registration.prompt_language(sender).await?,
            Intent::LanguageChoice(language) => {
                self.registration.choose_language(sender, language).await?
            }
            Intent::FreeText => self.registration.handle(sender, text).await?,
        };

        if step.superseded {
            debug!(sender, "Registered concurrently; handling as a registered user");
            if let Some(user) = self.registered_user(sender).await? {
                return self.handle_registered_text(channel, &user, intent).await;
            }
        }
        self.reply_all(channel, sender, &step).await;
        Ok(DispatchOutcome::Registration { phase: step.phase })
    }

    async fn registered_user(&self, sender: &str) -> Result<Option<User>, Error> {
        Ok(self.users.find(sender).await?.filter(User::is_registered))
    }

    async fn handle_registered_text(
        &self,
        channel: &dyn ChannelAdapter,
        user: &User,
        intent: Intent,
    ) -> Result<DispatchOutcome, Error> {
        let sender = user.sender_id.as_str();
        let locale = user.preferred_language.as_str();
        match intent {
            Intent::Greeting => {
                self.reply(channel, sender, &self.welcome(user, locale)).await;
                Ok(DispatchOutcome::Welcomed)
            }
            Intent::Help => {
                self.reply(channel, sender, &self.catalog.get(locale, keys::HELP))
                    .await;
                Ok(DispatchOutcome::HelpShown)
            }
            Intent::Language => {
                self.reply(channel, sender, &self.catalog.language_menu(locale))
                    .await;
                Ok(DispatchOutcome::LanguageMenuShown)
            }
            Intent::LanguageChoice(language) => self.change_language(channel, user, language).await,
            Intent::FreeText => {
                self.reply(channel, sender, &self.catalog.get(locale, keys::UNKNOWN_COMMAND))
                    .await;
                Ok(DispatchOutcome::UnknownCommand)
            }
        }
    }

    fn welcome(&self, user: &User, locale: &str) -> String {
        self.catalog
            .render(locale, keys::WELCOME, &[("name", user.name.as_str())])
    }

    async fn change_language(
        &self,
        channel: &dyn ChannelAdapter,
        user: &User,
        language: &SupportedLanguage,
    ) -> Result<DispatchOutcome, Error> {
        if !self.users.set_language(&user.sender_id, language.code).await? {
            // Vanished between lookup and update.
            warn!(sender = %user.sender_id, "Language change for missing user");
        }
        self.reply(
            channel,
            &user.sender_id,
            &self.catalog.render(
                language.code,
                keys::LANGUAGE_CHANGED,
                &[("language", language.label().as_str())],
            ),
        )
        .await;
        self.reply(channel, &user.sender_id, &self.welcome(user, language.code))
            .await;
        Ok(DispatchOutcome::LanguageChanged {
            locale: language.code.to_string(),
        })
    }

    // ── Images ──────────────────────────────────────────────────────

    async fn handle_image(
        &self,
        channel: &dyn ChannelAdapter,
        sender: &str,
        media_ref: &str,
    ) -> Result<DispatchOutcome, Error> {
        let user = match self.users.find(sender).await? {
            Some(user) => user,
            None => {
                // First contact: onboard instead of analyzing.
                let step = self.registration.prompt_language(sender).await?;
                let registered = if step.superseded {
                    self.registered_user(sender).await?
                } else {
                    None
                };
                match registered {
                    Some(user) => user,
                    None => {
                        self.reply_all(channel, sender, &step).await;
                        return Ok(DispatchOutcome::Registration { phase: step.phase });
                    }
                }
            }
        };
        let locale = user.preferred_language.clone();

        let user_id = if user.is_registered() {
            self.users.get_or_create(sender, None, &locale).await?
        } else {
            None
        };
        let Some(user_id) = user_id else {
            self.reply(
                channel,
                sender,
                &self.catalog.get(&locale, keys::REGISTRATION_INCOMPLETE),
            )
            .await;
            return Ok(DispatchOutcome::RegistrationIncomplete);
        };

        self.reply(channel, sender, &self.catalog.get(&locale, keys::ANALYZING))
            .await;

        let bytes = channel.download_media(media_ref).await?;

        let analysis = match self.analyzer.analyze(&bytes, &locale).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(sender, error = %e, "Meal analysis failed");
                self.reply(channel, sender, &self.catalog.get(&locale, keys::ANALYSIS_FAILED))
                    .await;
                return Ok(DispatchOutcome::AnalysisFailed);
            }
        };

        match normalize(&analysis.raw) {
            Normalized::NotFood(not_food) => {
                self.reply(channel, sender, &self.not_food_message(&locale, &not_food))
                    .await;
                Ok(DispatchOutcome::NotFood)
            }
            Normalized::Food(normalized) => {
                let record_id = self
                    .persist(user_id, &bytes, &analysis, normalized.clone())
                    .await;

                let display = if analysis.display_text.trim().is_empty() {
                    render::analysis_message(&normalized)
                } else {
                    analysis.display_text.clone()
                };
                self.reply(channel, sender, &display).await;

                let low_health = match normalized.health.health_score {
                    Some(score) if score < self.low_health_threshold => {
                        let score = score.to_string();
                        let warning = self.catalog.render(
                            &locale,
                            keys::LOW_HEALTH_WARNING,
                            &[("score", score.as_str())],
                        );
                        self.reply(channel, sender, &warning).await;
                        true
                    }
                    _ => false,
                };

                self.reply(channel, sender, &self.catalog.get(&locale, keys::FOLLOW_UP))
                    .await;

                Ok(DispatchOutcome::Analyzed {
                    record_id,
                    persisted: record_id.is_some(),
                    low_health,
                })
            }
        }
    }

    /// Upload the image and store the record. Returns the record id on
    /// success; failures are logged and reported as `None`.
    async fn persist(
        &self,
        user_id: Uuid,
        bytes: &[u8],
        analysis: &VisionAnalysis,
        normalized: NormalizedAnalysis,
    ) -> Option<Uuid> {
        let image = match self.object_store.upload(bytes, user_id).await {
            Ok(image) => image,
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Image upload failed; record not stored");
                return None;
            }
        };

        let record = NutritionRecord::new(user_id, image, analysis.raw_text.clone(), normalized);
        match self.db.insert_nutrition_record(&record).await {
            Ok(()) => Some(record.id),
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Failed to store nutrition record");
                None
            }
        }
    }

    fn not_food_message(&self, locale: &str, not_food: &NotFood) -> String {
        self.catalog.render(
            locale,
            keys::NOT_FOOD,
            &[
                ("description", not_food.description.as_deref().unwrap_or("")),
                ("message", not_food.message.as_deref().unwrap_or("")),
            ],
        )
    }

    // ── Everything else ─────────────────────────────────────────────

    async fn handle_unsupported(
        &self,
        channel: &dyn ChannelAdapter,
        sender: &str,
    ) -> Result<DispatchOutcome, Error> {
        let locale = self.locale_for(sender).await;
        self.reply(channel, sender, &self.catalog.get(&locale, keys::UNSUPPORTED_MESSAGE))
            .await;
        Ok(DispatchOutcome::Unsupported)
    }
}
