//! The conversational tool-calling loop: the heart of Taskmate.
//!
//! For every user message:
//!
//! 1. **Build context**: system instruction + bounded history + the message
//! 2. **Call the model** through the configured gateway
//! 3. **If tool calls**: dispatch each one, append the results, go to step 2
//! 4. **If text**: that is the answer
//!
//! The loop stops after a fixed number of tool rounds even if the model
//! never produces an answer.

pub mod bootstrap;
pub mod chat;
pub mod context;
pub mod dispatcher;
pub mod loop_runner;
pub mod schema;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use bootstrap::{
    Services, build_chat_service, build_services, chat_service_with_gateway, services_with_gateway,
};
pub use chat::{ChatReply, ChatService};
pub use context::ContextBuilder;
pub use dispatcher::ToolDispatcher;
pub use loop_runner::{AgentLoop, AgentOutcome, AgentStatus, FALLBACK_TEXT};
