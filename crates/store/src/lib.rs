//! Storage backends for Taskmate.
//!
//! Each backend implements both `ConversationStore` (chat history) and
//! `TaskRepository` (the user's tasks), so one handle serves the agent loop
//! and the task tools.

pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
