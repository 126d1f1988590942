//! Telegram transport — long-polls the Bot API for updates.
//!
//! Converts Bot API messages and callback queries into [`Event`]s and maps
//! the engine's outbound directives onto `sendMessage` / `deleteMessage`.

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::transport::{
    ChoiceOption, CommandKind, Event, EventStream, MessageRef, Transport,
};

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Telegram transport — connects to the Bot API via long-polling.
pub struct TelegramTransport {
    bot_token: String,
    client: reqwest::Client,
}

impl TelegramTransport {
    pub fn new(bot_token: String) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }

    /// POST a Bot API method and return the `result` field.
    async fn call(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, ChannelError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("{method} failed ({status}): {err}"),
            });
        }

        let data: serde_json::Value =
            resp.json().await.map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;
        Ok(data.get("result").cloned().unwrap_or(serde_json::Value::Null))
    }

    /// Send one sendMessage call, optionally with an inline keyboard.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&[ChoiceOption]>,
    ) -> Result<MessageRef, ChannelError> {
        let mut last_ref = None;
        for (i, chunk) in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH).iter().enumerate() {
            let mut body = serde_json::json!({
                "chat_id": chat_id,
                "text": chunk,
            });
            // Keyboard goes on the first chunk only.
            if i == 0 {
                if let Some(options) = keyboard {
                    let row: Vec<serde_json::Value> = options
                        .iter()
                        .map(|o| {
                            serde_json::json!({
                                "text": o.label,
                                "callback_data": o.payload,
                            })
                        })
                        .collect();
                    body["reply_markup"] = serde_json::json!({ "inline_keyboard": [row] });
                }
            }

            let result = self.call("sendMessage", body).await?;
            let message_id = result
                .get("message_id")
                .and_then(serde_json::Value::as_i64)
                .ok_or_else(|| ChannelError::InvalidUpdate(
                    "sendMessage result without message_id".into(),
                ))?;
            last_ref = Some(MessageRef { message_id });
        }

        last_ref.ok_or_else(|| ChannelError::SendFailed {
            name: "telegram".into(),
            reason: "Empty message".into(),
        })
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let bot_token = self.bot_token.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram transport listening for updates...");

            loop {
                let url = format!("https://api.telegram.org/bot{bot_token}/getUpdates");
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message", "callback_query"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: serde_json::Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(serde_json::Value::as_array)
                else {
                    continue;
                };

                for update in results {
                    if let Some(uid) = update.get("update_id").and_then(serde_json::Value::as_i64)
                    {
                        offset = uid + 1;
                    }

                    // Button presses arrive as callback queries and must be
                    // acknowledged or the client keeps its spinner.
                    if let Some(callback) = update.get("callback_query") {
                        if let Some(id) = callback.get("id").and_then(|v| v.as_str()) {
                            let ack = serde_json::json!({ "callback_query_id": id });
                            let _ = client
                                .post(format!(
                                    "https://api.telegram.org/bot{bot_token}/answerCallbackQuery"
                                ))
                                .json(&ack)
                                .send()
                                .await;
                        }
                        if let Some(event) = callback_to_event(callback) {
                            if tx.send(event).is_err() {
                                tracing::info!("Telegram listener channel closed");
                                return;
                            }
                        }
                        continue;
                    }

                    if let Some(message) = update.get("message") {
                        if let Some(event) = message_to_event(message) {
                            if tx.send(event).is_err() {
                                tracing::info!("Telegram listener channel closed");
                                return;
                            }
                        }
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send_text(&self, user: i64, text: &str) -> Result<MessageRef, ChannelError> {
        self.send_message(user, text, None).await
    }

    async fn send_choice(
        &self,
        user: i64,
        text: &str,
        options: &[ChoiceOption],
    ) -> Result<MessageRef, ChannelError> {
        self.send_message(user, text, Some(options)).await
    }

    async fn retract(&self, user: i64, message: &MessageRef) -> Result<(), ChannelError> {
        self.call(
            "deleteMessage",
            serde_json::json!({
                "chat_id": user,
                "message_id": message.message_id,
            }),
        )
        .await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }
}

// ── Update conversion ───────────────────────────────────────────────

/// Convert a Bot API message into an [`Event`], if it carries usable text.
fn message_to_event(message: &serde_json::Value) -> Option<Event> {
    let text = message.get("text").and_then(serde_json::Value::as_str)?;
    let user = message
        .get("from")
        .and_then(|f| f.get("id"))
        .and_then(serde_json::Value::as_i64)?;
    let username = message
        .get("from")
        .and_then(|f| f.get("username"))
        .and_then(|u| u.as_str());

    let mut event = if text.starts_with('/') {
        match CommandKind::parse(text) {
            Some(name) => Event::command(user, name),
            // Unknown commands go through as text so the engine can hint.
            None => Event::text(user, text),
        }
    } else {
        Event::text(user, text)
    };

    if let Some(name) = username {
        event = event.with_display_name(name);
    }
    Some(event)
}

/// Convert a callback query into a button [`Event`].
fn callback_to_event(callback: &serde_json::Value) -> Option<Event> {
    let payload = callback.get("data").and_then(serde_json::Value::as_str)?;
    let user = callback
        .get("from")
        .and_then(|f| f.get("id"))
        .and_then(serde_json::Value::as_i64)?;
    let username = callback
        .get("from")
        .and_then(|f| f.get("username"))
        .and_then(|u| u.as_str());

    let mut event = Event::button(user, payload);
    if let Some(name) = username {
        event = event.with_display_name(name);
    }
    Some(event)
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let boundary = remaining
            .char_indices()
            .map(|(i, _)| i)
            .take_while(|&i| i <= max_len)
            .last()
            .unwrap_or(0);
        let chunk = &remaining[..boundary];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(boundary);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { boundary } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::EventKind;

    #[test]
    fn telegram_transport_name() {
        let tg = TelegramTransport::new("fake-token".into());
        assert_eq!(tg.name(), "telegram");
    }

    #[test]
    fn telegram_api_url() {
        let tg = TelegramTransport::new("123:ABC".into());
        assert_eq!(
            tg.api_url("getMe"),
            "https://api.telegram.org/bot123:ABC/getMe"
        );
        assert_eq!(
            tg.api_url("deleteMessage"),
            "https://api.telegram.org/bot123:ABC/deleteMessage"
        );
    }

    #[test]
    fn message_command_conversion() {
        let message = serde_json::json!({
            "text": "/register",
            "from": { "id": 42, "username": "anna" }
        });
        let event = message_to_event(&message).unwrap();
        assert_eq!(event.user, 42);
        assert_eq!(event.display_name.as_deref(), Some("anna"));
        assert_eq!(event.kind, EventKind::Command(CommandKind::Register));
    }

    #[test]
    fn message_unknown_command_becomes_text() {
        let message = serde_json::json!({
            "text": "/frobnicate",
            "from": { "id": 42 }
        });
        let event = message_to_event(&message).unwrap();
        assert_eq!(event.kind, EventKind::Text("/frobnicate".into()));
        assert_eq!(event.display_name, None);
    }

    #[test]
    fn message_plain_text_conversion() {
        let message = serde_json::json!({
            "text": "Россия",
            "from": { "id": 42 }
        });
        let event = message_to_event(&message).unwrap();
        assert_eq!(event.kind, EventKind::Text("Россия".into()));
    }

    #[test]
    fn message_without_text_skipped() {
        let message = serde_json::json!({
            "sticker": {},
            "from": { "id": 42 }
        });
        assert_eq!(message_to_event(&message), None);
    }

    #[test]
    fn callback_conversion() {
        let callback = serde_json::json!({
            "id": "cb1",
            "data": "gender_male",
            "from": { "id": 42, "username": "anna" }
        });
        let event = callback_to_event(&callback).unwrap();
        assert_eq!(event.user, 42);
        assert_eq!(event.kind, EventKind::Button("gender_male".into()));
    }

    #[test]
    fn split_message_short() {
        let chunks = split_message("Привет", 4096);
        assert_eq!(chunks, vec!["Привет"]);
    }

    #[test]
    fn split_message_over_limit_on_newline() {
        let msg = format!("{}\n{}", "a".repeat(2000), "b".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "a".repeat(2000));
        assert_eq!(chunks[1], "b".repeat(3000));
    }

    #[test]
    fn split_message_no_good_split_point() {
        let msg = "a".repeat(5000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4096);
        assert_eq!(chunks[1].len(), 904);
    }

    #[test]
    fn split_message_respects_multibyte_boundaries() {
        // Cyrillic chars are 2 bytes; a hard cut must not land mid-char.
        let msg = "я".repeat(3000);
        let chunks = split_message(&msg, 4096);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.len() <= 4096);
        }
        assert_eq!(chunks.concat(), msg);
    }
}
