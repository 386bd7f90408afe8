//! # Taskmate Core
//!
//! Domain types, traits, and error definitions for the Taskmate
//! conversational task manager. This crate has **no framework dependencies**:
//! it defines the domain model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the agent loop is a trait here: the model gateway,
//! the tools, conversation storage, task storage and identity resolution.
//! Implementations live in their respective crates, so tests can swap in
//! scripted stand-ins and the dependency graph points inward.

pub mod error;
pub mod event;
pub mod gateway;
pub mod identity;
pub mod store;
pub mod task;
pub mod tool;
pub mod turn;

// Re-export key types at crate root for ergonomics
pub use error::{Error, GatewayError, Result, StoreError, ToolError};
pub use event::{DomainEvent, EventBus};
pub use gateway::{ModelGateway, ModelResponse};
pub use identity::{IdentityResolver, StaticTokenResolver, UserIdentity};
pub use store::ConversationStore;
pub use task::{NewTask, Task, TaskFilter, TaskPatch, TaskRepository, TaskStatusFilter};
pub use tool::{Tool, ToolCall, ToolOutcome, ToolRegistry, ToolResult, ToolSpec};
pub use turn::{ConversationContext, ConversationId, Role, Turn};
