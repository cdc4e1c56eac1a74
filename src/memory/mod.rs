//! 记忆层：LLM 对话消息与成果日志持久化

pub mod conversation;
pub mod win_store;

pub use conversation::{Message, Role};
pub use win_store::{WinRecord, WinStore};
