use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::model::ModelProvider;
use crate::agent::observer::{StepKind, StepObserver, TracingObserver};
use crate::agent::profile::AgentProfile;
use crate::error::{AgentError, ToolError};
use crate::storage::{Role, SessionStatus, SessionStore, SessionUpdate, ToolCall};

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub session_id: String,
    pub output: String,
    pub decide_steps: usize,
    pub tools_used: Vec<String>,
}

/// The Decide/Act state machine driving one session to completion.
///
/// Each iteration feeds the full persisted history to the model, persists
/// the model's reply, then executes any requested tool calls and persists
/// one result message per call. The run ends when the model answers with
/// no tool calls, or fails when the iteration bound is exhausted.
///
/// Every message is persisted before the next transition, so a crash
/// mid-run leaves the session `active` with a replayable prefix, never a
/// message whose causal predecessor is missing.
pub struct AgentLoop {
    store: SessionStore,
    model: Arc<dyn ModelProvider>,
    observer: Arc<dyn StepObserver>,
    max_iterations: usize,
    step_timeout: Duration,
    cancel: CancellationToken,
}

impl AgentLoop {
    pub fn new(
        store: SessionStore,
        model: Arc<dyn ModelProvider>,
        max_iterations: usize,
        step_timeout: Duration,
    ) -> Self {
        Self {
            store,
            model,
            observer: Arc::new(TracingObserver),
            max_iterations,
            step_timeout,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn StepObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the loop over an existing `active` session until the model
    /// produces a final answer, an error occurs, or the bound is hit.
    pub async fn run(
        &self,
        profile: &AgentProfile,
        session_id: &str,
    ) -> Result<RunOutcome, AgentError> {
        let mut tools_used: Vec<String> = Vec::new();

        for iteration in 0..self.max_iterations {
            if self.cancel.is_cancelled() {
                return self.fail(session_id, "run cancelled", AgentError::Cancelled);
            }

            // Decide: the model sees the full ordered history.
            self.observer
                .on_step_start(session_id, StepKind::Decide, iteration);
            let started = Instant::now();
            let history = self.store.get_session_messages(session_id)?;

            let reply = match timeout(self.step_timeout, self.model.invoke(&history)).await {
                Ok(Ok(reply)) => reply,
                Ok(Err(e)) => {
                    let description = format!("model invocation failed: {e}");
                    self.observer.on_step_end(
                        session_id,
                        StepKind::Decide,
                        iteration,
                        started.elapsed(),
                        Some(&description),
                    );
                    return self.fail(session_id, &description, AgentError::Model(e.to_string()));
                }
                Err(_) => {
                    let description =
                        format!("model invocation timed out after {:?}", self.step_timeout);
                    self.observer.on_step_end(
                        session_id,
                        StepKind::Decide,
                        iteration,
                        started.elapsed(),
                        Some(&description),
                    );
                    return self.fail(session_id, &description, AgentError::Model(description.clone()));
                }
            };
            self.observer.on_step_end(
                session_id,
                StepKind::Decide,
                iteration,
                started.elapsed(),
                None,
            );

            debug!(
                "[{session_id}] decide {}/{}: {} tool call(s), {} chars",
                iteration + 1,
                self.max_iterations,
                reply.tool_calls.len(),
                reply.content.len()
            );

            let calls = reply.tool_calls.clone();
            self.store.add_message(
                session_id,
                Role::Assistant,
                &reply.content,
                if calls.is_empty() {
                    None
                } else {
                    Some(calls.clone())
                },
                None,
            )?;

            if reply.is_final() {
                self.store.update_session(
                    session_id,
                    SessionUpdate {
                        status: Some(SessionStatus::Completed),
                        output: Some(serde_json::json!({"content": reply.content.clone()})),
                        ..Default::default()
                    },
                )?;
                info!(
                    "[{session_id}] completed after {} decide step(s)",
                    iteration + 1
                );
                return Ok(RunOutcome {
                    session_id: session_id.to_string(),
                    output: reply.content,
                    decide_steps: iteration + 1,
                    tools_used,
                });
            }

            if self.cancel.is_cancelled() {
                return self.fail(session_id, "run cancelled", AgentError::Cancelled);
            }

            // Act: calls within one step are independent, so they run
            // concurrently; results are appended in originating call order
            // so readers always see a deterministic history.
            self.observer
                .on_step_start(session_id, StepKind::Act, iteration);
            let started = Instant::now();
            let results = join_all(calls.iter().map(|call| self.execute_call(profile, call))).await;

            let mut act_error: Option<ToolError> = None;
            for (call, result) in calls.iter().zip(results) {
                match result {
                    Ok(value) => {
                        let content = match value {
                            serde_json::Value::String(s) => s,
                            v => v.to_string(),
                        };
                        self.store.add_message(
                            session_id,
                            Role::Tool,
                            &content,
                            None,
                            Some(serde_json::json!({
                                "tool_call_id": call.id,
                                "tool": call.name,
                            })),
                        )?;
                        tools_used.push(call.name.clone());
                    }
                    Err(e) => {
                        act_error = Some(e);
                        break;
                    }
                }
            }

            if let Some(e) = act_error {
                let description = e.to_string();
                self.observer.on_step_end(
                    session_id,
                    StepKind::Act,
                    iteration,
                    started.elapsed(),
                    Some(&description),
                );
                return self.fail(session_id, &description, AgentError::Tool(e));
            }
            self.observer
                .on_step_end(session_id, StepKind::Act, iteration, started.elapsed(), None);
        }

        warn!(
            "[{session_id}] no final answer after {} iterations",
            self.max_iterations
        );
        self.fail(
            session_id,
            &format!("loop bound of {} iterations exceeded", self.max_iterations),
            AgentError::LoopBound(self.max_iterations),
        )
    }

    async fn execute_call(
        &self,
        profile: &AgentProfile,
        call: &ToolCall,
    ) -> Result<serde_json::Value, ToolError> {
        debug!("executing tool '{}'", call.name);
        match timeout(
            self.step_timeout,
            profile.tools.execute(&call.name, call.arguments.clone()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ToolError::Failed {
                tool: call.name.clone(),
                message: format!("timed out after {:?}", self.step_timeout),
            }),
        }
    }

    /// Mark the session failed with the error description surfaced
    /// verbatim. Bookkeeping failures are logged, never allowed to mask
    /// the run error itself.
    fn fail(
        &self,
        session_id: &str,
        description: &str,
        err: AgentError,
    ) -> Result<RunOutcome, AgentError> {
        if let Err(e) = self.store.update_session(
            session_id,
            SessionUpdate {
                status: Some(SessionStatus::Failed),
                metadata: Some(serde_json::json!({"error": description})),
                ..Default::default()
            },
        ) {
            warn!("[{session_id}] failed to record run failure: {e}");
        }
        Err(err)
    }
}
