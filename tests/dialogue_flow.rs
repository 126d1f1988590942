//! End-to-end dialogue flow tests — in-memory storage plus a recording
//! transport driving the engine the way the event loop does.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use study_match::dialogue::model::{Gender, NewProfile};
use study_match::dialogue::DialogueEngine;
use study_match::error::ChannelError;
use study_match::store::{LibSqlBackend, ProfileStore};
use study_match::transport::{
    ChoiceOption, CommandKind, Event, EventStream, MessageRef, Transport,
};

// ── Recording transport ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Sent {
    Text {
        user: i64,
        text: String,
        message_id: i64,
    },
    Choice {
        user: i64,
        text: String,
        payloads: Vec<String>,
        message_id: i64,
    },
    Retract {
        user: i64,
        message_id: i64,
    },
}

/// Records every outbound directive and hands out sequential message ids.
#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    next_id: AtomicI64,
}

impl RecordingTransport {
    async fn log(&self) -> Vec<Sent> {
        self.sent.lock().await.clone()
    }

    async fn last_text(&self) -> Option<String> {
        self.log().await.iter().rev().find_map(|s| match s {
            Sent::Text { text, .. } => Some(text.clone()),
            _ => None,
        })
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        Ok(Box::pin(futures::stream::empty()))
    }

    async fn send_text(&self, user: i64, text: &str) -> Result<MessageRef, ChannelError> {
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.sent.lock().await.push(Sent::Text {
            user,
            text: text.to_string(),
            message_id,
        });
        Ok(MessageRef { message_id })
    }

    async fn send_choice(
        &self,
        user: i64,
        text: &str,
        options: &[ChoiceOption],
    ) -> Result<MessageRef, ChannelError> {
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.sent.lock().await.push(Sent::Choice {
            user,
            text: text.to_string(),
            payloads: options.iter().map(|o| o.payload.clone()).collect(),
            message_id,
        });
        Ok(MessageRef { message_id })
    }

    async fn retract(&self, user: i64, message: &MessageRef) -> Result<(), ChannelError> {
        self.sent.lock().await.push(Sent::Retract {
            user,
            message_id: message.message_id,
        });
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

// ── Harness ─────────────────────────────────────────────────────────

struct Harness {
    engine: DialogueEngine,
    store: Arc<LibSqlBackend>,
    transport: Arc<RecordingTransport>,
}

async fn harness() -> Harness {
    let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let transport = Arc::new(RecordingTransport::default());
    let engine = DialogueEngine::new(
        store.clone() as Arc<dyn ProfileStore>,
        transport.clone() as Arc<dyn Transport>,
    );
    Harness {
        engine,
        store,
        transport,
    }
}

impl Harness {
    async fn command(&self, user: i64, name: CommandKind) {
        self.engine
            .handle_event(Event::command(user, name))
            .await
            .unwrap();
    }

    async fn text(&self, user: i64, text: &str) {
        self.engine
            .handle_event(Event::text(user, text))
            .await
            .unwrap();
    }

    async fn button(&self, user: i64, payload: &str) {
        self.engine
            .handle_event(Event::button(user, payload))
            .await
            .unwrap();
    }

    async fn seed(&self, external_id: i64, age: u8, location: &str, subjects: &[&str]) {
        self.store
            .create(NewProfile {
                external_id,
                display_name: None,
                location: location.to_string(),
                language: "русский".to_string(),
                gender: Gender::Female,
                age,
                subjects: subjects.iter().map(|s| s.to_string()).collect(),
            })
            .await
            .unwrap();
    }
}

// ── Registration ────────────────────────────────────────────────────

#[tokio::test]
async fn registration_end_to_end() {
    let h = harness().await;
    let user = 100;

    h.command(user, CommandKind::Register).await;
    h.text(user, "россия").await;
    h.text(user, " РУССКИЙ ").await;
    h.button(user, "gender_male").await;
    h.text(user, "25").await;
    h.engine
        .handle_event(Event::text(user, "математика, Физика").with_display_name("anna"))
        .await
        .unwrap();

    let profile = h.store.find_by_external_id(user).await.unwrap().unwrap();
    assert_eq!(profile.location, "Россия");
    assert_eq!(profile.language, "русский");
    assert_eq!(profile.gender, Gender::Male);
    assert_eq!(profile.age, 25);
    assert_eq!(
        profile.subjects,
        BTreeSet::from(["математика".to_string(), "физика".to_string()])
    );
    assert_eq!(profile.display_name.as_deref(), Some("anna"));

    assert!(h.transport.last_text().await.unwrap().contains("✅ Профиль успешно создан"));

    // Session is back to no-flow: plain text now gets the command hint.
    h.text(user, "Канада").await;
    assert!(h.transport.last_text().await.unwrap().contains("/register"));
}

#[tokio::test]
async fn registration_invalid_inputs_reprompt_without_losing_draft() {
    let h = harness().await;
    let user = 100;

    h.command(user, CommandKind::Register).await;
    h.text(user, "Нарния").await; // invalid country, re-prompt
    assert!(h.transport.last_text().await.unwrap().contains("страна не найдена"));
    h.text(user, "Россия").await;

    h.text(user, "эльфийский").await; // invalid language
    h.text(user, "русский").await;

    h.button(user, "gender_female").await;
    h.text(user, "200").await; // out of range
    assert!(h.transport.last_text().await.unwrap().contains("корректный возраст"));
    h.text(user, "30").await;

    h.text(user, "математика, алхимия").await; // one bad subject, all-or-nothing
    assert!(h.store.find_by_external_id(user).await.unwrap().is_none());
    h.text(user, "математика").await;

    // Earlier valid answers survived every re-prompt.
    let profile = h.store.find_by_external_id(user).await.unwrap().unwrap();
    assert_eq!(profile.location, "Россия");
    assert_eq!(profile.language, "русский");
    assert_eq!(profile.gender, Gender::Female);
    assert_eq!(profile.age, 30);
}

#[tokio::test]
async fn no_profile_is_persisted_before_final_step() {
    let h = harness().await;
    let user = 100;

    h.command(user, CommandKind::Register).await;
    h.text(user, "Россия").await;
    h.text(user, "русский").await;
    h.button(user, "gender_male").await;
    h.text(user, "25").await;

    // All but the last answer collected — still nothing in the store.
    assert!(h.store.find_by_external_id(user).await.unwrap().is_none());
}

#[tokio::test]
async fn reregistration_never_enters_the_flow() {
    let h = harness().await;
    h.seed(100, 25, "Россия", &["история"]).await;

    h.command(100, CommandKind::Register).await;
    assert!(h.transport.last_text().await.unwrap().contains("уже зарегистрированы"));

    // A country name now is out-of-flow text, not a waiting_location answer.
    h.text(100, "Канада").await;
    let profile = h.store.find_by_external_id(100).await.unwrap().unwrap();
    assert_eq!(profile.location, "Россия");
}

// ── Gating ──────────────────────────────────────────────────────────

#[tokio::test]
async fn search_and_update_require_a_profile() {
    let h = harness().await;

    h.command(100, CommandKind::Search).await;
    assert!(h.transport.last_text().await.unwrap().contains("не зарегистрированы"));

    h.command(100, CommandKind::Update).await;
    assert!(h.transport.last_text().await.unwrap().contains("не зарегистрированы"));

    // Neither command opened a flow.
    h.button(100, "search_age").await;
    h.button(100, "update_age").await;
    let log = h.transport.log().await;
    assert_eq!(log.len(), 2, "buttons outside a flow are ignored: {log:?}");
}

// ── Update ──────────────────────────────────────────────────────────

#[tokio::test]
async fn update_age_rejects_out_of_range_then_accepts() {
    let h = harness().await;
    h.seed(100, 25, "Россия", &["история"]).await;

    h.command(100, CommandKind::Update).await;
    h.button(100, "update_age").await;

    h.text(100, "200").await;
    let profile = h.store.find_by_external_id(100).await.unwrap().unwrap();
    assert_eq!(profile.age, 25, "rejected update must not change the row");

    h.text(100, "30").await;
    let profile = h.store.find_by_external_id(100).await.unwrap().unwrap();
    assert_eq!(profile.age, 30);
    assert!(h.transport.last_text().await.unwrap().contains("Возраст успешно обновлен"));

    // Exactly one field changed.
    assert_eq!(profile.location, "Россия");
    assert_eq!(profile.subjects, BTreeSet::from(["история".to_string()]));
}

#[tokio::test]
async fn update_subjects_via_button_flow() {
    let h = harness().await;
    h.seed(100, 25, "Россия", &["история"]).await;

    h.command(100, CommandKind::Update).await;
    h.button(100, "update_subjects").await;
    h.text(100, "Физика, химия").await;

    let profile = h.store.find_by_external_id(100).await.unwrap().unwrap();
    assert_eq!(
        profile.subjects,
        BTreeSet::from(["физика".to_string(), "химия".to_string()])
    );
}

#[tokio::test]
async fn update_offers_the_four_updatable_fields() {
    let h = harness().await;
    h.seed(100, 25, "Россия", &["история"]).await;

    h.command(100, CommandKind::Update).await;
    let log = h.transport.log().await;
    let Some(Sent::Choice { payloads, text, .. }) = log.last() else {
        panic!("expected a field choice keyboard, got {log:?}");
    };
    assert_eq!(
        payloads,
        &vec![
            "update_location".to_string(),
            "update_language".to_string(),
            "update_age".to_string(),
            "update_subjects".to_string(),
        ]
    );
    // The current profile is shown before the choice.
    assert!(text.contains("Страна: Россия"));
}

// ── Search ──────────────────────────────────────────────────────────

#[tokio::test]
async fn search_by_age_uses_entered_target() {
    let h = harness().await;
    h.seed(100, 25, "Россия", &["история"]).await;
    h.seed(200, 42, "Канада", &["физика"]).await;
    h.seed(300, 57, "США", &["химия"]).await;

    h.command(100, CommandKind::Search).await;
    h.button(100, "search_age").await;
    h.text(100, "40").await;

    let text = h.transport.last_text().await.unwrap();
    assert!(text.contains("Найдены следующие партнеры"));
    assert!(text.contains("Возраст: 42"));
    assert!(!text.contains("Возраст: 57"));
}

#[tokio::test]
async fn search_by_location_is_substring_case_insensitive() {
    let h = harness().await;
    h.seed(100, 25, "Россия", &["история"]).await;
    h.seed(200, 30, "США", &["физика"]).await;

    h.command(100, CommandKind::Search).await;
    h.button(100, "search_location").await;
    h.text(100, "сша").await;

    let text = h.transport.last_text().await.unwrap();
    assert!(text.contains("Страна: США"));
}

#[tokio::test]
async fn search_by_subjects_is_set_overlap() {
    let h = harness().await;
    h.seed(100, 25, "Россия", &["история"]).await;
    h.seed(200, 30, "Канада", &["физика", "химия"]).await;
    h.seed(300, 30, "США", &["право"]).await;

    h.command(100, CommandKind::Search).await;
    h.button(100, "search_subjects").await;
    h.text(100, "математика, физика").await;

    let text = h.transport.last_text().await.unwrap();
    assert!(text.contains("Страна: Канада"));
    assert!(!text.contains("Страна: США"));
}

#[tokio::test]
async fn no_match_notice_is_retracted_on_next_search() {
    let h = harness().await;
    h.seed(100, 25, "Россия", &["история"]).await;

    // First search finds nobody.
    h.command(100, CommandKind::Search).await;
    h.button(100, "search_age").await;
    h.text(100, "80").await;

    let log = h.transport.log().await;
    let Some(Sent::Text { message_id: notice_id, text, .. }) = log.last() else {
        panic!("expected a no-matches notice, got {log:?}");
    };
    assert!(text.contains("не найдено"));
    let notice_id = *notice_id;

    // The next search retracts the remembered notice before responding.
    h.command(100, CommandKind::Search).await;
    h.button(100, "search_location").await;
    h.text(100, "Нарния").await;

    let log = h.transport.log().await;
    assert!(
        log.contains(&Sent::Retract {
            user: 100,
            message_id: notice_id
        }),
        "first notice should be retracted: {log:?}"
    );

    // The retracted notice is evicted: a third search retracts only the
    // second notice, not the first one again.
    let second_notice_id = match log.last() {
        Some(Sent::Text { message_id, .. }) => *message_id,
        other => panic!("expected a second notice, got {other:?}"),
    };
    h.command(100, CommandKind::Search).await;
    h.button(100, "search_location").await;
    h.text(100, "Атлантида").await;

    let log = h.transport.log().await;
    let retractions: Vec<i64> = log
        .iter()
        .filter_map(|s| match s {
            Sent::Retract { message_id, .. } => Some(*message_id),
            _ => None,
        })
        .collect();
    assert_eq!(retractions, vec![notice_id, second_notice_id]);
}

#[tokio::test]
async fn notices_are_partitioned_per_user() {
    let h = harness().await;
    h.seed(100, 25, "Россия", &["история"]).await;
    h.seed(200, 30, "Канада", &["физика"]).await;

    // User 100 gets a notice.
    h.command(100, CommandKind::Search).await;
    h.button(100, "search_location").await;
    h.text(100, "Нарния").await;

    // User 200 searching must not retract user 100's notice.
    h.command(200, CommandKind::Search).await;
    h.button(200, "search_location").await;
    h.text(200, "Россия").await;

    let log = h.transport.log().await;
    assert!(!log.iter().any(|s| matches!(s, Sent::Retract { .. })));
}
