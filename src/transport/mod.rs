//! Transport abstraction — inbound events and outbound directives.
//!
//! The dialogue engine is transport-agnostic: it consumes [`Event`]s and
//! emits text or choice keyboards through the [`Transport`] trait. Message
//! references returned by sends are opaque handles usable only for
//! retraction.

pub mod telegram;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::ChannelError;

pub use telegram::TelegramTransport;

/// Commands recognized by the dialogue engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Start,
    Register,
    Search,
    Update,
}

impl CommandKind {
    /// Parse a leading-slash command, tolerating a `@botname` suffix.
    pub fn parse(text: &str) -> Option<Self> {
        let name = text.trim().strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);
        match name {
            "start" => Some(Self::Start),
            "register" => Some(Self::Register),
            "search" => Some(Self::Search),
            "update" => Some(Self::Update),
            _ => None,
        }
    }
}

/// An inbound transport event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// External user id in the transport's namespace.
    pub user: i64,
    /// Cosmetic sender handle (e.g. messenger username), when the transport
    /// knows one.
    pub display_name: Option<String>,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Command(CommandKind),
    Text(String),
    Button(String),
}

impl Event {
    pub fn command(user: i64, name: CommandKind) -> Self {
        Self {
            user,
            display_name: None,
            kind: EventKind::Command(name),
        }
    }

    pub fn text(user: i64, text: impl Into<String>) -> Self {
        Self {
            user,
            display_name: None,
            kind: EventKind::Text(text.into()),
        }
    }

    pub fn button(user: i64, payload: impl Into<String>) -> Self {
        Self {
            user,
            display_name: None,
            kind: EventKind::Button(payload.into()),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Opaque handle to a sent message, usable only for retraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub message_id: i64,
}

/// One button in a choice keyboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceOption {
    /// Visible label.
    pub label: String,
    /// Payload delivered back in [`EventKind::Button`].
    pub payload: String,
}

impl ChoiceOption {
    pub fn new(label: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            payload: payload.into(),
        }
    }
}

/// Stream of inbound events.
pub type EventStream = Pin<Box<dyn Stream<Item = Event> + Send>>;

/// The messaging transport the engine talks through.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name (e.g. "telegram").
    fn name(&self) -> &str;

    /// Start listening and return the inbound event stream.
    async fn start(&self) -> Result<EventStream, ChannelError>;

    /// Send plain text to a user.
    async fn send_text(&self, user: i64, text: &str) -> Result<MessageRef, ChannelError>;

    /// Send text with a choice keyboard.
    async fn send_choice(
        &self,
        user: i64,
        text: &str,
        options: &[ChoiceOption],
    ) -> Result<MessageRef, ChannelError>;

    /// Best-effort deletion of a previously sent message.
    async fn retract(&self, user: i64, message: &MessageRef) -> Result<(), ChannelError>;

    /// Verify the transport is reachable.
    async fn health_check(&self) -> Result<(), ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_parse_known() {
        assert_eq!(CommandKind::parse("/start"), Some(CommandKind::Start));
        assert_eq!(CommandKind::parse("/register"), Some(CommandKind::Register));
        assert_eq!(CommandKind::parse("/search"), Some(CommandKind::Search));
        assert_eq!(CommandKind::parse("/update"), Some(CommandKind::Update));
    }

    #[test]
    fn command_parse_with_bot_suffix() {
        assert_eq!(
            CommandKind::parse("/register@study_match_bot"),
            Some(CommandKind::Register)
        );
    }

    #[test]
    fn command_parse_rejects_non_commands() {
        assert_eq!(CommandKind::parse("register"), None);
        assert_eq!(CommandKind::parse("/unknown"), None);
        assert_eq!(CommandKind::parse(""), None);
    }

    #[test]
    fn event_builders() {
        let event = Event::text(7, "привет").with_display_name("anna");
        assert_eq!(event.user, 7);
        assert_eq!(event.display_name.as_deref(), Some("anna"));
        assert_eq!(event.kind, EventKind::Text("привет".into()));
    }
}
