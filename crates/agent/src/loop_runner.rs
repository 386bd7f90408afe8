//! The agent reasoning loop implementation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use taskmate_config::AgentConfig;
use taskmate_core::error::{Error, GatewayError};
use taskmate_core::event::{DomainEvent, EventBus};
use taskmate_core::gateway::{ModelGateway, ModelResponse};
use taskmate_core::identity::UserIdentity;
use taskmate_core::tool::{ToolCall, ToolRegistry, ToolResult, ToolSpec};
use taskmate_core::turn::{ConversationContext, Turn};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatcher::ToolDispatcher;

/// Answer given when the model keeps asking for tools past the cap.
pub const FALLBACK_TEXT: &str = "unable to complete the request after repeated tool invocations";

/// Result text for calls skipped because the request was cancelled.
pub const CANCELLED_RESULT: &str = "cancelled";

const DEFAULT_MAX_ITERATIONS: u32 = 5;
const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(60);
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// How a request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// The model gave a final answer
    Completed,
    /// The model kept requesting tools; the answer is [`FALLBACK_TEXT`]
    IterationCapReached,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentOutcome {
    pub text: String,
    pub status: AgentStatus,
    /// Tool rounds performed
    pub iterations: u32,
    pub model_calls: u32,
    pub tool_calls: usize,
}

/// The orchestrator: model call, tool dispatch, repeat, until a final answer
/// or the iteration cap.
pub struct AgentLoop {
    gateway: Arc<dyn ModelGateway>,
    registry: Arc<ToolRegistry>,
    dispatcher: ToolDispatcher,
    event_bus: Arc<EventBus>,
    max_iterations: u32,
    model_timeout: Duration,
    model_retries: u32,
    parallel_tool_calls: bool,
}

impl AgentLoop {
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        registry: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let dispatcher = ToolDispatcher::new(registry.clone()).with_event_bus(event_bus.clone());
        Self {
            gateway,
            registry,
            dispatcher,
            event_bus,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            model_timeout: DEFAULT_MODEL_TIMEOUT,
            model_retries: 0,
            parallel_tool_calls: false,
        }
    }

    /// Apply the `[agent]` section of the configuration.
    pub fn with_config(self, config: &AgentConfig) -> Self {
        self.with_max_iterations(config.max_iterations)
            .with_model_timeout(config.model_timeout())
            .with_tool_timeout(config.tool_timeout())
            .with_model_retries(config.model_retries)
            .with_parallel_tool_calls(config.parallel_tool_calls)
    }

    /// Set the maximum number of tool rounds per request.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.dispatcher = self.dispatcher.with_timeout(timeout);
        self
    }

    /// Extra attempts for a model call that failed with a retryable error.
    pub fn with_model_retries(mut self, retries: u32) -> Self {
        self.model_retries = retries;
        self
    }

    pub fn with_parallel_tool_calls(mut self, enabled: bool) -> Self {
        self.parallel_tool_calls = enabled;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Run the loop to completion.
    pub async fn run(
        &self,
        context: &mut ConversationContext,
        identity: &UserIdentity,
    ) -> Result<AgentOutcome, Error> {
        self.run_until_cancelled(context, identity, &CancellationToken::new())
            .await
    }

    /// Run the loop, stopping promptly once `cancel` fires.
    ///
    /// Every turn produced is appended to `context`, including on error, so
    /// the caller can persist the partial exchange.
    pub async fn run_until_cancelled(
        &self,
        context: &mut ConversationContext,
        identity: &UserIdentity,
        cancel: &CancellationToken,
    ) -> Result<AgentOutcome, Error> {
        info!(
            user = %identity,
            prior_turns = context.prior_turns().len(),
            gateway = self.gateway.name(),
            "Processing chat request"
        );

        let specs = self.registry.specs();
        let mut iteration: u32 = 0;
        let mut model_calls: u32 = 0;
        let mut tool_calls: usize = 0;

        while iteration < self.max_iterations {
            if cancel.is_cancelled() {
                return Err(self.cancelled(iteration));
            }

            debug!(iteration, turns = context.len(), "Agent loop iteration");
            let started = Instant::now();
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled(iteration)),
                response = self.call_model(context, &specs, &mut model_calls) => response,
            };

            let response = match response {
                Ok(response) => response.normalize(),
                Err(e) => {
                    warn!(iteration, error = %e, "Model call failed");
                    self.event_bus.publish(DomainEvent::ErrorOccurred {
                        context: "model_call".into(),
                        error_message: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    return Err(Error::Gateway(e));
                }
            };

            let requested_tools = match &response {
                ModelResponse::ToolRequest { calls } => calls.len(),
                ModelResponse::FinalAnswer { .. } => 0,
            };
            self.event_bus.publish(DomainEvent::ModelCalled {
                gateway: self.gateway.name().to_string(),
                iteration,
                requested_tools,
                duration_ms: started.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
            });

            match response {
                ModelResponse::FinalAnswer { text } => {
                    context.push(Turn::assistant(text.clone()));
                    self.event_bus.publish(DomainEvent::RequestCompleted {
                        iterations: iteration,
                        model_calls,
                        timestamp: Utc::now(),
                    });
                    info!(iterations = iteration, model_calls, tool_calls, "Chat request completed");
                    return Ok(AgentOutcome {
                        text,
                        status: AgentStatus::Completed,
                        iterations: iteration,
                        model_calls,
                        tool_calls,
                    });
                }
                ModelResponse::ToolRequest { calls } => {
                    debug!(tool_count = calls.len(), "Executing tool calls");
                    let (results, cancelled) = self.dispatch_batch(&calls, identity, cancel).await;

                    tool_calls += calls.len();
                    context.push(Turn::ToolRequest { calls });
                    for result in results {
                        context.push(Turn::ToolResult(result));
                    }

                    if cancelled {
                        return Err(self.cancelled(iteration));
                    }
                    iteration += 1;
                }
            }
        }

        warn!(
            max_iterations = self.max_iterations,
            model_calls, "Max tool iterations reached, returning fallback answer"
        );
        self.event_bus.publish(DomainEvent::IterationCapReached {
            max_iterations: self.max_iterations,
            timestamp: Utc::now(),
        });
        context.push(Turn::assistant(FALLBACK_TEXT));

        Ok(AgentOutcome {
            text: FALLBACK_TEXT.to_string(),
            status: AgentStatus::IterationCapReached,
            iterations: iteration,
            model_calls,
            tool_calls,
        })
    }

    /// One model call under the timeout, re-issued on retryable failures
    /// while retries remain.
    async fn call_model(
        &self,
        context: &ConversationContext,
        specs: &[ToolSpec],
        model_calls: &mut u32,
    ) -> Result<ModelResponse, GatewayError> {
        let mut attempt: u32 = 0;
        loop {
            *model_calls += 1;
            let result =
                match tokio::time::timeout(self.model_timeout, self.gateway.complete(context, specs))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(GatewayError::Timeout {
                        timeout_ms: self.model_timeout.as_millis() as u64,
                    }),
                };

            match result {
                Err(e) if e.is_retryable() && attempt < self.model_retries => {
                    attempt += 1;
                    warn!(attempt, error = %e, "Retrying model call");
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                other => return other,
            }
        }
    }

    /// Dispatch one batch. Results come back in call order, one per call.
    /// The flag reports whether the batch was cut short by cancellation.
    async fn dispatch_batch(
        &self,
        calls: &[ToolCall],
        identity: &UserIdentity,
        cancel: &CancellationToken,
    ) -> (Vec<ToolResult>, bool) {
        if self.parallel_tool_calls {
            let mut pending: FuturesUnordered<_> = calls
                .iter()
                .enumerate()
                .map(|(index, call)| async move {
                    (index, self.dispatcher.execute(call, identity).await)
                })
                .collect();
            let mut finished: Vec<Option<ToolResult>> = vec![None; calls.len()];
            let mut cancelled = false;
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    next = pending.next() => match next {
                        Some((index, result)) => finished[index] = Some(result),
                        None => break,
                    },
                }
            }
            drop(pending);

            // calls that already ran keep their real result
            let results = calls
                .iter()
                .zip(finished)
                .map(|(call, result)| {
                    result.unwrap_or_else(|| ToolResult::error(call, CANCELLED_RESULT))
                })
                .collect();
            return (results, cancelled);
        }

        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            if cancel.is_cancelled() {
                results.push(ToolResult::error(call, CANCELLED_RESULT));
                continue;
            }
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => ToolResult::error(call, CANCELLED_RESULT),
                result = self.dispatcher.execute(call, identity) => result,
            };
            results.push(result);
        }
        (results, cancel.is_cancelled())
    }

    fn cancelled(&self, iteration: u32) -> Error {
        info!(iteration, "Chat request cancelled");
        self.event_bus.publish(DomainEvent::ErrorOccurred {
            context: "agent_loop".into(),
            error_message: "request cancelled".into(),
            timestamp: Utc::now(),
        });
        Error::Cancelled
    }
}
