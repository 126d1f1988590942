//! Dialogue engine — guided registration, update, and search flows.
//!
//! Each flow is an explicit per-user state machine: the engine reads the
//! user's current step from the session store, validates the turn, emits
//! the next prompt, and advances (or re-prompts on invalid input).

pub mod engine;
pub mod model;
pub mod replies;

pub use engine::DialogueEngine;
pub use model::{FieldUpdate, Gender, NewProfile, SearchCriterion, UserProfile};
