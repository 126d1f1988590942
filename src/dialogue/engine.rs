//! The dialogue engine — registration, update, and search state machines.
//!
//! One engine instance serves all users; per-user state lives in the
//! [`SessionStore`]. Validation failures re-prompt the same step and never
//! advance or drop the accumulated draft. Storage and transport failures
//! propagate without clearing the session, so the user can retry the step.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::dialogue::model::{FieldUpdate, Gender, NewProfile, SearchCriterion};
use crate::dialogue::replies;
use crate::error::{DatabaseError, Result};
use crate::session::{ConversationSession, SessionStore, Step};
use crate::store::{DEFAULT_AGE_TOLERANCE, ProfileStore};
use crate::transport::{CommandKind, Event, EventKind, MessageRef, Transport};
use crate::validation;

/// Coordinates dialogue flows: session transitions, validation, persistence,
/// and outbound directives.
pub struct DialogueEngine {
    store: Arc<dyn ProfileStore>,
    transport: Arc<dyn Transport>,
    sessions: SessionStore,
    age_tolerance: u8,
    /// Most recent "no matches" notice per user, retracted on their next
    /// search. Best-effort UI cleanliness, keyed per user.
    pending_notices: Mutex<HashMap<i64, MessageRef>>,
}

impl DialogueEngine {
    pub fn new(store: Arc<dyn ProfileStore>, transport: Arc<dyn Transport>) -> Self {
        Self {
            store,
            transport,
            sessions: SessionStore::new(),
            age_tolerance: DEFAULT_AGE_TOLERANCE,
            pending_notices: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_age_tolerance(mut self, tolerance: u8) -> Self {
        self.age_tolerance = tolerance;
        self
    }

    /// Dispatch one inbound event.
    pub async fn handle_event(&self, event: Event) -> Result<()> {
        match &event.kind {
            EventKind::Command(name) => self.handle_command(*name, &event).await,
            EventKind::Text(text) => self.handle_text(&event, text).await,
            EventKind::Button(payload) => self.handle_button(&event, payload).await,
        }
    }

    // ── Commands ────────────────────────────────────────────────────

    async fn handle_command(&self, name: CommandKind, event: &Event) -> Result<()> {
        let user = event.user;
        match name {
            CommandKind::Start => {
                self.transport.send_text(user, replies::WELCOME).await?;
            }
            CommandKind::Register => {
                if self.store.find_by_external_id(user).await?.is_some() {
                    // Flow never starts for an already registered user.
                    self.transport
                        .send_text(user, replies::ALREADY_REGISTERED)
                        .await?;
                    return Ok(());
                }
                self.transport.send_text(user, replies::ASK_LOCATION).await?;
                self.sessions
                    .set(user, ConversationSession::at(Step::WaitingLocation))
                    .await;
            }
            CommandKind::Update => {
                let Some(profile) = self.store.find_by_external_id(user).await? else {
                    self.transport.send_text(user, replies::NOT_REGISTERED).await?;
                    return Ok(());
                };
                self.transport
                    .send_choice(
                        user,
                        &replies::profile_summary(&profile),
                        &replies::field_options(),
                    )
                    .await?;
                self.sessions
                    .set(user, ConversationSession::at(Step::SelectingField))
                    .await;
            }
            CommandKind::Search => {
                if self.store.find_by_external_id(user).await?.is_none() {
                    self.transport.send_text(user, replies::NOT_REGISTERED).await?;
                    return Ok(());
                }
                self.transport
                    .send_choice(user, replies::CHOOSE_CRITERION, &replies::criterion_options())
                    .await?;
                self.sessions
                    .set(user, ConversationSession::at(Step::ChoosingCriterion))
                    .await;
            }
        }
        Ok(())
    }

    // ── Text turns ──────────────────────────────────────────────────

    async fn handle_text(&self, event: &Event, text: &str) -> Result<()> {
        let user = event.user;
        let Some(session) = self.sessions.get(user).await else {
            self.transport.send_text(user, replies::UNKNOWN_INPUT).await?;
            return Ok(());
        };

        match session.step {
            // Registration
            Step::WaitingLocation => {
                let Some(location) = validation::normalize_country(text) else {
                    self.transport.send_text(user, replies::INVALID_LOCATION).await?;
                    return Ok(());
                };
                self.transport.send_text(user, replies::ASK_LANGUAGE).await?;
                let mut next = session.advanced(Step::WaitingLanguage);
                next.draft.location = Some(location);
                self.sessions.set(user, next).await;
            }
            Step::WaitingLanguage => {
                let Some(language) = validation::normalize_language(text) else {
                    self.transport.send_text(user, replies::INVALID_LANGUAGE).await?;
                    return Ok(());
                };
                self.transport
                    .send_choice(user, replies::ASK_GENDER, &replies::gender_options())
                    .await?;
                let mut next = session.advanced(Step::WaitingGender);
                next.draft.language = Some(language);
                self.sessions.set(user, next).await;
            }
            Step::WaitingGender => {
                // Gender is button-only; re-offer the keyboard.
                self.transport
                    .send_choice(user, replies::ASK_GENDER, &replies::gender_options())
                    .await?;
            }
            Step::WaitingAge => {
                let Some(age) = validation::parse_age(text) else {
                    self.transport.send_text(user, &replies::invalid_age()).await?;
                    return Ok(());
                };
                self.transport.send_text(user, replies::ASK_SUBJECTS).await?;
                let mut next = session.advanced(Step::WaitingSubjects);
                next.draft.age = Some(age);
                self.sessions.set(user, next).await;
            }
            Step::WaitingSubjects => {
                let Some(subjects) = validation::normalize_subject_list(text) else {
                    self.transport.send_text(user, replies::INVALID_SUBJECTS).await?;
                    return Ok(());
                };
                self.commit_registration(event, &session, subjects).await?;
            }

            // Update
            Step::SelectingField => {
                self.transport
                    .send_choice(user, replies::CHOOSE_FIELD, &replies::field_options())
                    .await?;
            }
            Step::UpdatingLocation => {
                let Some(location) = validation::normalize_country(text) else {
                    self.transport.send_text(user, replies::INVALID_LOCATION).await?;
                    return Ok(());
                };
                self.apply_update(user, FieldUpdate::Location(location), replies::LOCATION_UPDATED)
                    .await?;
            }
            Step::UpdatingLanguage => {
                let Some(language) = validation::normalize_language(text) else {
                    self.transport.send_text(user, replies::INVALID_LANGUAGE).await?;
                    return Ok(());
                };
                self.apply_update(user, FieldUpdate::Language(language), replies::LANGUAGE_UPDATED)
                    .await?;
            }
            Step::UpdatingAge => {
                let Some(age) = validation::parse_age(text) else {
                    self.transport.send_text(user, &replies::invalid_age()).await?;
                    return Ok(());
                };
                self.apply_update(user, FieldUpdate::Age(age), replies::AGE_UPDATED)
                    .await?;
            }
            Step::UpdatingSubjects => {
                let Some(subjects) = validation::normalize_subject_list(text) else {
                    self.transport.send_text(user, replies::INVALID_SUBJECTS).await?;
                    return Ok(());
                };
                self.apply_update(user, FieldUpdate::Subjects(subjects), replies::SUBJECTS_UPDATED)
                    .await?;
            }

            // Search
            Step::ChoosingCriterion => {
                self.transport
                    .send_choice(user, replies::CHOOSE_CRITERION, &replies::criterion_options())
                    .await?;
            }
            Step::AwaitingSearchAge => {
                let Some(age) = validation::parse_age(text) else {
                    self.transport.send_text(user, &replies::invalid_age()).await?;
                    return Ok(());
                };
                self.run_search(user, SearchCriterion::ByAge(age)).await?;
            }
            Step::AwaitingSearchLocation => {
                self.run_search(user, SearchCriterion::ByLocation(text.to_string()))
                    .await?;
            }
            Step::AwaitingSearchSubjects => {
                let subjects: BTreeSet<String> = text
                    .split(',')
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect();
                if subjects.is_empty() {
                    self.transport
                        .send_text(user, replies::ASK_SEARCH_SUBJECTS)
                        .await?;
                    return Ok(());
                }
                self.run_search(user, SearchCriterion::BySubjects(subjects))
                    .await?;
            }
        }
        Ok(())
    }

    // ── Button turns ────────────────────────────────────────────────

    async fn handle_button(&self, event: &Event, payload: &str) -> Result<()> {
        let user = event.user;
        let Some(session) = self.sessions.get(user).await else {
            debug!(user, payload, "Button press outside any dialogue, ignoring");
            return Ok(());
        };

        match (session.step, payload) {
            (Step::WaitingGender, "gender_male" | "gender_female") => {
                let gender = if payload == "gender_male" {
                    Gender::Male
                } else {
                    Gender::Female
                };
                self.transport.send_text(user, &replies::ask_age()).await?;
                let mut next = session.advanced(Step::WaitingAge);
                next.draft.gender = Some(gender);
                self.sessions.set(user, next).await;
            }

            (Step::SelectingField, "update_location") => {
                self.transport.send_text(user, replies::ASK_NEW_LOCATION).await?;
                self.sessions
                    .set(user, session.advanced(Step::UpdatingLocation))
                    .await;
            }
            (Step::SelectingField, "update_language") => {
                self.transport.send_text(user, replies::ASK_NEW_LANGUAGE).await?;
                self.sessions
                    .set(user, session.advanced(Step::UpdatingLanguage))
                    .await;
            }
            (Step::SelectingField, "update_age") => {
                self.transport.send_text(user, &replies::ask_new_age()).await?;
                self.sessions
                    .set(user, session.advanced(Step::UpdatingAge))
                    .await;
            }
            (Step::SelectingField, "update_subjects") => {
                self.transport.send_text(user, replies::ASK_NEW_SUBJECTS).await?;
                self.sessions
                    .set(user, session.advanced(Step::UpdatingSubjects))
                    .await;
            }

            (Step::ChoosingCriterion, "search_age") => {
                self.transport.send_text(user, &replies::ask_search_age()).await?;
                self.sessions
                    .set(user, session.advanced(Step::AwaitingSearchAge))
                    .await;
            }
            (Step::ChoosingCriterion, "search_location") => {
                self.transport
                    .send_text(user, replies::ASK_SEARCH_LOCATION)
                    .await?;
                self.sessions
                    .set(user, session.advanced(Step::AwaitingSearchLocation))
                    .await;
            }
            (Step::ChoosingCriterion, "search_subjects") => {
                self.transport
                    .send_text(user, replies::ASK_SEARCH_SUBJECTS)
                    .await?;
                self.sessions
                    .set(user, session.advanced(Step::AwaitingSearchSubjects))
                    .await;
            }

            (step, _) => {
                debug!(user, %step, payload, "Unexpected button payload, ignoring");
            }
        }
        Ok(())
    }

    // ── Flow completion ─────────────────────────────────────────────

    /// Commit a fully collected registration draft. No row exists until
    /// every field has passed validation.
    async fn commit_registration(
        &self,
        event: &Event,
        session: &ConversationSession,
        subjects: BTreeSet<String>,
    ) -> Result<()> {
        let user = event.user;
        let draft = &session.draft;
        let (Some(location), Some(language), Some(gender), Some(age)) = (
            draft.location.clone(),
            draft.language.clone(),
            draft.gender,
            draft.age,
        ) else {
            // The state machine only reaches WaitingSubjects with a full
            // draft; a hole here means the session was corrupted.
            error!(user, "Registration draft incomplete at commit, resetting");
            self.sessions.clear(user).await;
            self.transport.send_text(user, replies::UNKNOWN_INPUT).await?;
            return Ok(());
        };

        let new_profile = NewProfile {
            external_id: user,
            display_name: event.display_name.clone(),
            location,
            language,
            gender,
            age,
            subjects,
        };

        match self.store.create(new_profile).await {
            Ok(profile) => {
                info!(user, profile_id = profile.id, "Profile registered");
                self.transport.send_text(user, replies::REGISTERED).await?;
                self.sessions.clear(user).await;
            }
            Err(DatabaseError::Duplicate { .. }) => {
                // Registration was gated on entry; a duplicate here means the
                // profile appeared mid-flow.
                warn!(user, "Profile appeared during registration flow");
                self.transport
                    .send_text(user, replies::ALREADY_REGISTERED)
                    .await?;
                self.sessions.clear(user).await;
            }
            // Session stays open so the user can retry the step.
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Persist a single-field update and close the flow.
    async fn apply_update(
        &self,
        user: i64,
        update: FieldUpdate,
        confirmation: &str,
    ) -> Result<()> {
        let field = update.label();
        match self.store.update_field(user, update).await {
            Ok(()) => {
                info!(user, field, "Profile field updated");
                self.transport.send_text(user, confirmation).await?;
                self.sessions.clear(user).await;
            }
            Err(DatabaseError::NotFound { .. }) => {
                // The update flow is gated on an existing profile; reaching
                // here means the row vanished mid-flow.
                error!(user, field, "Profile row missing during update flow");
                self.transport.send_text(user, replies::NOT_REGISTERED).await?;
                self.sessions.clear(user).await;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Execute a search and close the flow.
    async fn run_search(&self, user: i64, criterion: SearchCriterion) -> Result<()> {
        self.retract_pending_notice(user).await;

        let matches = match &criterion {
            SearchCriterion::ByAge(target) => {
                self.store
                    .find_matches_by_age(user, *target, self.age_tolerance)
                    .await?
            }
            SearchCriterion::ByLocation(query) => {
                self.store.find_matches_by_location(user, query).await?
            }
            SearchCriterion::BySubjects(subjects) => {
                self.store.find_matches_by_subjects(user, subjects).await?
            }
        };

        info!(
            user,
            criterion = criterion.label(),
            matches = matches.len(),
            "Search executed"
        );

        if matches.is_empty() {
            let notice = self.transport.send_text(user, replies::NO_MATCHES).await?;
            self.pending_notices.lock().await.insert(user, notice);
        } else {
            self.transport
                .send_text(user, &replies::format_matches(&matches))
                .await?;
        }
        self.sessions.clear(user).await;
        Ok(())
    }

    /// Delete the user's previous "no matches" notice, if any. Failures are
    /// logged and swallowed.
    async fn retract_pending_notice(&self, user: i64) {
        let notice = self.pending_notices.lock().await.remove(&user);
        if let Some(message) = notice {
            if let Err(e) = self.transport.retract(user, &message).await {
                warn!(user, "Failed to retract previous notice: {e}");
            }
        }
    }
}
