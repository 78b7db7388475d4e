//! Conversation dispatch: intent classification and routing.

pub mod intent;
pub mod router;

pub use intent::{Intent, classify};
pub use router::{ConversationRouter, DispatchOutcome, RouterDeps};
