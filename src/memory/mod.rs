//! 记忆层：对话历史与持久化

pub mod conversation;
pub mod persistence;

pub use conversation::{ConversationMemory, Message, Role};
pub use persistence::ConversationPersistence;
