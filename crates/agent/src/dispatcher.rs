//! Tool dispatch: one model-requested call in, one result out.
//!
//! `execute` never fails: unknown tools, bad arguments, tool errors,
//! timeouts and panics all come back as an error [`ToolResult`] the model
//! can react to.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use serde_json::Value;
use taskmate_core::error::ToolError;
use taskmate_core::event::{DomainEvent, EventBus};
use taskmate_core::identity::UserIdentity;
use taskmate_core::tool::{ToolCall, ToolRegistry, ToolResult};
use tracing::{debug, warn};

use crate::schema;

/// Argument keys that could name a user. The caller's identity is bound
/// server side, so these are removed before a tool sees the arguments.
pub const RESERVED_ARGUMENT_KEYS: &[&str] = &["user_id", "user_identity", "owner"];

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(15);

pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
    event_bus: Option<Arc<EventBus>>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            timeout: DEFAULT_TOOL_TIMEOUT,
            event_bus: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Run one call on behalf of `identity`.
    pub async fn execute(&self, call: &ToolCall, identity: &UserIdentity) -> ToolResult {
        let start = Instant::now();
        let result = match self.run(call, identity).await {
            Ok(payload) => ToolResult::success(call, payload),
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.call_id, error = %e, "Tool call failed");
                ToolResult::error(call, e.to_string())
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(tool = %call.name, success = !result.is_error(), duration_ms, "Tool call finished");
        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::ToolExecuted {
                tool_name: call.name.clone(),
                success: !result.is_error(),
                duration_ms,
                timestamp: Utc::now(),
            });
        }
        result
    }

    async fn run(&self, call: &ToolCall, identity: &UserIdentity) -> Result<Value, ToolError> {
        let tool = self
            .registry
            .resolve(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;

        let arguments = prepare_arguments(call)?;
        schema::validate(&tool.parameters_schema(), &arguments)
            .map_err(ToolError::InvalidArguments)?;

        let execution = AssertUnwindSafe(tool.execute(identity, arguments)).catch_unwind();
        match tokio::time::timeout(self.timeout, execution).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(panic)) => Err(ToolError::ExecutionFailed {
                tool_name: call.name.clone(),
                reason: format!("panicked: {}", panic_message(panic.as_ref())),
            }),
            Err(_) => Err(ToolError::Timeout {
                tool_name: call.name.clone(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

/// Normalize model arguments: null means "no arguments", a raw string means
/// the provider could not decode them, and reserved identity keys go away.
fn prepare_arguments(call: &ToolCall) -> Result<Value, ToolError> {
    let mut arguments = match &call.arguments {
        Value::Null => Value::Object(Default::default()),
        Value::String(raw) => {
            return Err(ToolError::InvalidArguments(format!(
                "arguments are not a JSON object: {raw}"
            )));
        }
        other => other.clone(),
    };

    if let Value::Object(map) = &mut arguments {
        for key in RESERVED_ARGUMENT_KEYS {
            if map.remove(*key).is_some() {
                warn!(tool = %call.name, key, "Ignoring model-supplied identity argument");
            }
        }
    }
    Ok(arguments)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
