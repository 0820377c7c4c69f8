//! Retrieval-augmented responses for coach personas.
//!
//! Retrieval finds an owner's most relevant transcript passages for a message;
//! composition folds them into the persona's prompt together with recent
//! conversation history.

pub mod context;
mod response;

pub use context::{source_url, ContextRetriever};
pub use response::{
    compose_prompt, compose_prompt_with, ChatTurn, CoachReply, CoachResponder, Role,
    DEFAULT_HISTORY_TURNS,
};
