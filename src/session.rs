//! Conversation session store — per-user dialogue step and scratch data.
//!
//! A session exists only while a dialogue is in progress; absence means the
//! user is in no active flow. Sessions are cleared explicitly on completion
//! or when a new flow takes over. No hidden framework-managed state.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::dialogue::model::Gender;

/// The steps of the registration, update, and search dialogues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    // Registration
    WaitingLocation,
    WaitingLanguage,
    WaitingGender,
    WaitingAge,
    WaitingSubjects,
    // Update
    SelectingField,
    UpdatingLocation,
    UpdatingLanguage,
    UpdatingAge,
    UpdatingSubjects,
    // Search
    ChoosingCriterion,
    AwaitingSearchAge,
    AwaitingSearchLocation,
    AwaitingSearchSubjects,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::WaitingLocation => "waiting_location",
            Self::WaitingLanguage => "waiting_language",
            Self::WaitingGender => "waiting_gender",
            Self::WaitingAge => "waiting_age",
            Self::WaitingSubjects => "waiting_subjects",
            Self::SelectingField => "selecting_field",
            Self::UpdatingLocation => "updating_location",
            Self::UpdatingLanguage => "updating_language",
            Self::UpdatingAge => "updating_age",
            Self::UpdatingSubjects => "updating_subjects",
            Self::ChoosingCriterion => "choosing_criterion",
            Self::AwaitingSearchAge => "awaiting_search_age",
            Self::AwaitingSearchLocation => "awaiting_search_location",
            Self::AwaitingSearchSubjects => "awaiting_search_subjects",
        };
        f.write_str(s)
    }
}

/// Partial answers accumulated across registration steps before commit.
///
/// Nothing is persisted until every field is collected and valid; a
/// validation failure re-prompts without touching already collected fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrationDraft {
    pub location: Option<String>,
    pub language: Option<String>,
    pub gender: Option<Gender>,
    pub age: Option<u8>,
}

/// Transient per-user conversation state.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSession {
    pub step: Step,
    pub draft: RegistrationDraft,
}

impl ConversationSession {
    /// A fresh session at the given step with an empty draft.
    pub fn at(step: Step) -> Self {
        Self {
            step,
            draft: RegistrationDraft::default(),
        }
    }

    /// Same draft, next step.
    pub fn advanced(&self, step: Step) -> Self {
        Self {
            step,
            draft: self.draft.clone(),
        }
    }
}

/// Explicit session store keyed by external user id.
#[derive(Default)]
pub struct SessionStore {
    inner: RwLock<HashMap<i64, ConversationSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session for a user, if a dialogue is in progress.
    pub async fn get(&self, external_id: i64) -> Option<ConversationSession> {
        self.inner.read().await.get(&external_id).cloned()
    }

    /// Start or replace the session for a user.
    pub async fn set(&self, external_id: i64, session: ConversationSession) {
        self.inner.write().await.insert(external_id, session);
    }

    /// End the user's dialogue, discarding the draft.
    pub async fn clear(&self, external_id: i64) {
        self.inner.write().await.remove(&external_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn absent_session_means_no_flow() {
        let store = SessionStore::new();
        assert_eq!(store.get(1).await, None);
    }

    #[tokio::test]
    async fn set_get_clear() {
        let store = SessionStore::new();
        store.set(1, ConversationSession::at(Step::WaitingLocation)).await;

        let session = store.get(1).await.unwrap();
        assert_eq!(session.step, Step::WaitingLocation);
        assert_eq!(session.draft, RegistrationDraft::default());

        store.clear(1).await;
        assert_eq!(store.get(1).await, None);
    }

    #[tokio::test]
    async fn sessions_are_partitioned_per_user() {
        let store = SessionStore::new();
        store.set(1, ConversationSession::at(Step::WaitingAge)).await;
        store.set(2, ConversationSession::at(Step::SelectingField)).await;

        store.clear(1).await;
        assert_eq!(store.get(1).await, None);
        assert_eq!(store.get(2).await.unwrap().step, Step::SelectingField);
    }

    #[test]
    fn advanced_keeps_draft() {
        let mut session = ConversationSession::at(Step::WaitingLanguage);
        session.draft.location = Some("Россия".into());

        let next = session.advanced(Step::WaitingGender);
        assert_eq!(next.step, Step::WaitingGender);
        assert_eq!(next.draft.location.as_deref(), Some("Россия"));
    }
}
