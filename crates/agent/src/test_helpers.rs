//! Shared test doubles for the agent tests.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taskmate_core::error::{GatewayError, ToolError};
use taskmate_core::gateway::{ModelGateway, ModelResponse};
use taskmate_core::identity::UserIdentity;
use taskmate_core::tool::{Tool, ToolCall, ToolRegistry, ToolSpec};
use taskmate_core::turn::{ConversationContext, Turn};
use tokio_util::sync::CancellationToken;

/// A gateway that plays back scripted responses in order.
///
/// Once the script is exhausted it keeps returning `repeat` if set, and
/// panics otherwise.
pub struct ScriptedGateway {
    script: Mutex<VecDeque<Result<ModelResponse, GatewayError>>>,
    repeat: Option<ModelResponse>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedGateway {
    pub fn new(script: Vec<Result<ModelResponse, GatewayError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            repeat: None,
            delay: None,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Returns the same response forever.
    pub fn always(response: ModelResponse) -> Self {
        Self {
            repeat: Some(response),
            ..Self::new(vec![])
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The turns the gateway was shown, one entry per call.
    pub fn seen_turns(&self) -> Vec<Vec<Turn>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        context: &ConversationContext,
        _tools: &[ToolSpec],
    ) -> Result<ModelResponse, GatewayError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(context.turns().to_vec());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        match (next, &self.repeat) {
            (Some(response), _) => response,
            (None, Some(repeat)) => Ok(repeat.clone()),
            (None, None) => panic!("ScriptedGateway: no response scripted for call #{call}"),
        }
    }
}

pub fn tool_request(calls: &[(&str, &str, Value)]) -> ModelResponse {
    ModelResponse::ToolRequest {
        calls: calls
            .iter()
            .map(|(id, name, args)| ToolCall::new(*id, *name, args.clone()))
            .collect(),
    }
}

pub fn registry_with(tools: Vec<Box<dyn Tool>>) -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register(tool).unwrap();
    }
    Arc::new(registry)
}

/// Records every invocation and answers `{"ok": true}`.
#[derive(Clone, Default)]
pub struct RecordingTool {
    calls: Arc<Mutex<Vec<(UserIdentity, Value)>>>,
}

impl RecordingTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(UserIdentity, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Tool for RecordingTool {
    fn name(&self) -> &str {
        "record"
    }

    fn description(&self) -> &str {
        "Records its input"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "note": { "type": "string" } }
        })
    }

    async fn execute(&self, identity: &UserIdentity, arguments: Value) -> Result<Value, ToolError> {
        self.calls
            .lock()
            .unwrap()
            .push((identity.clone(), arguments.clone()));
        Ok(json!({ "ok": true, "echo": arguments }))
    }
}

pub struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "always_fails"
    }

    fn description(&self) -> &str {
        "Fails every time"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _identity: &UserIdentity, _arguments: Value) -> Result<Value, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: "always_fails".into(),
            reason: "database on fire".into(),
        })
    }
}

pub struct PanickingTool;

#[async_trait]
impl Tool for PanickingTool {
    fn name(&self) -> &str {
        "panics"
    }

    fn description(&self) -> &str {
        "Panics every time"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _identity: &UserIdentity, _arguments: Value) -> Result<Value, ToolError> {
        panic!("boom");
    }
}

/// Sleeps before answering.
pub struct SlowTool(pub Duration);

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        "slow"
    }

    fn description(&self) -> &str {
        "Takes its time"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _identity: &UserIdentity, _arguments: Value) -> Result<Value, ToolError> {
        tokio::time::sleep(self.0).await;
        Ok(json!({ "slept_ms": self.0.as_millis() as u64 }))
    }
}

/// Cancels the given token when invoked, standing in for a client that
/// disconnects mid-request.
pub struct CancellingTool(pub CancellationToken);

#[async_trait]
impl Tool for CancellingTool {
    fn name(&self) -> &str {
        "hang_up"
    }

    fn description(&self) -> &str {
        "Cancels the request"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _identity: &UserIdentity, _arguments: Value) -> Result<Value, ToolError> {
        self.0.cancel();
        Ok(json!({ "cancelled": true }))
    }
}
