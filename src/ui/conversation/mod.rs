//! Conversation UI components for chat interface

pub mod commands;
pub mod composer;
pub mod manager;
pub mod transcript;

pub use commands::{ParsedCommand, SlashCommand, get_help_text};
pub use composer::ConversationComposer;
pub use manager::{ConversationAction, ConversationManager};
pub use transcript::Transcript;
