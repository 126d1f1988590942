//! Study Match — conversational study-partner matchmaking core.

pub mod config;
pub mod dialogue;
pub mod error;
pub mod session;
pub mod store;
pub mod transport;
pub mod validation;
